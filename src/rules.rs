//! Rule Engine (C9): the Datalog-shaped intermediate representation that
//! [`crate::reasoner`] evaluates, plus the safety check every rule must
//! pass before it can be registered.

pub mod profiles;

use crate::term::{Term, TermId};
use crate::triple_index::Triple;
use std::collections::{HashMap, HashSet};

/// A rule-level term: either a variable, shared across a rule's body and
/// head, or a constant already resolved to a `TermId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuleTerm {
    Var(String),
    Const(TermId),
}

impl RuleTerm {
    pub fn var(name: impl Into<String>) -> RuleTerm {
        RuleTerm::Var(name.into())
    }
}

/// A triple pattern over [`RuleTerm`]s, used in both rule bodies and heads.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RulePattern {
    pub s: RuleTerm,
    pub p: RuleTerm,
    pub o: RuleTerm,
}

impl RulePattern {
    pub fn new(s: RuleTerm, p: RuleTerm, o: RuleTerm) -> RulePattern {
        RulePattern { s, p, o }
    }

    fn variables_into(&self, out: &mut HashSet<String>) {
        for t in [&self.s, &self.p, &self.o] {
            if let RuleTerm::Var(name) = t {
                out.insert(name.clone());
            }
        }
    }
}

/// A built-in condition over already-bound variables. Every variable a
/// condition mentions must be bound by some positive pattern earlier in the
/// same rule body (checked by [`Rule::is_safe`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Cond {
    NotEqual(RuleTerm, RuleTerm),
    IsIri(RuleTerm),
    IsBlank(RuleTerm),
    IsLiteral(RuleTerm),
    Bound(RuleTerm),
}

impl Cond {
    fn variables_into(&self, out: &mut HashSet<String>) {
        match self {
            Cond::NotEqual(a, b) => {
                if let RuleTerm::Var(n) = a {
                    out.insert(n.clone());
                }
                if let RuleTerm::Var(n) = b {
                    out.insert(n.clone());
                }
            }
            Cond::IsIri(t) | Cond::IsBlank(t) | Cond::IsLiteral(t) | Cond::Bound(t) => {
                if let RuleTerm::Var(n) = t {
                    out.insert(n.clone());
                }
            }
        }
    }
}

/// One atom in a rule body: either a triple pattern matched against the
/// fact base, or a condition over variables bound so far.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BodyAtom {
    Pattern(RulePattern),
    Condition(Cond),
}

impl BodyAtom {
    fn variables_into(&self, out: &mut HashSet<String>) {
        match self {
            BodyAtom::Pattern(p) => p.variables_into(out),
            BodyAtom::Condition(c) => c.variables_into(out),
        }
    }

    fn pattern(&self) -> Option<&RulePattern> {
        match self {
            BodyAtom::Pattern(p) => Some(p),
            BodyAtom::Condition(_) => None,
        }
    }
}

/// A single forward-chaining rule: `head :- body`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rule {
    pub name: String,
    pub body: Vec<BodyAtom>,
    pub head: RulePattern,
}

impl Rule {
    pub fn new(name: impl Into<String>, body: Vec<BodyAtom>, head: RulePattern) -> Rule {
        Rule { name: name.into(), body, head }
    }

    /// All variables appearing in the body's triple patterns (not
    /// conditions).
    pub fn positive_body_variables(&self) -> HashSet<String> {
        let mut out = HashSet::new();
        for atom in &self.body {
            if let Some(p) = atom.pattern() {
                p.variables_into(&mut out);
            }
        }
        out
    }

    pub fn variables(&self) -> HashSet<String> {
        let mut out = HashSet::new();
        for atom in &self.body {
            atom.variables_into(&mut out);
        }
        self.head.variables_into(&mut out);
        out
    }

    /// A rule is safe iff every head variable, and every variable any
    /// condition mentions, appears in some positive body pattern.
    pub fn is_safe(&self) -> bool {
        let positive = self.positive_body_variables();
        let mut head_vars = HashSet::new();
        self.head.variables_into(&mut head_vars);
        if !head_vars.is_subset(&positive) {
            return false;
        }
        for atom in &self.body {
            if let BodyAtom::Condition(c) = atom {
                let mut cond_vars = HashSet::new();
                c.variables_into(&mut cond_vars);
                if !cond_vars.is_subset(&positive) {
                    return false;
                }
            }
        }
        true
    }
}

/// A partial variable binding built up while matching a rule body.
pub type Substitution = HashMap<String, TermId>;

fn resolve(term: &RuleTerm, subst: &Substitution) -> Option<TermId> {
    match term {
        RuleTerm::Const(id) => Some(*id),
        RuleTerm::Var(name) => subst.get(name).copied(),
    }
}

/// Apply `subst` to `pattern`, returning the [`crate::pattern::TriplePattern`]
/// query to run: bound positions become `Some`, unresolved variables stay
/// `None` (treated as "any" by the pattern matcher, then re-checked once
/// the match supplies a binding).
pub fn substitute_pattern(
    pattern: &RulePattern,
    subst: &Substitution,
) -> crate::pattern::TriplePattern {
    crate::pattern::TriplePattern::new(
        resolve(&pattern.s, subst),
        resolve(&pattern.p, subst),
        resolve(&pattern.o, subst),
    )
}

/// Produce the concrete triple for `pattern` under `subst`, or `None` if
/// some variable is still unbound.
pub fn ground_pattern(pattern: &RulePattern, subst: &Substitution) -> Option<Triple> {
    Some(Triple {
        s: resolve(&pattern.s, subst)?,
        p: resolve(&pattern.p, subst)?,
        o: resolve(&pattern.o, subst)?,
    })
}

/// Extend `subst` by unifying `pattern`'s variables against a concrete
/// `triple`. Returns `None` on conflict (a variable already bound to a
/// different value).
pub fn unify(pattern: &RulePattern, triple: &Triple, subst: &Substitution) -> Option<Substitution> {
    let mut next = subst.clone();
    for (term, value) in [(&pattern.s, triple.s), (&pattern.p, triple.p), (&pattern.o, triple.o)] {
        match term {
            RuleTerm::Const(c) => {
                if *c != value {
                    return None;
                }
            }
            RuleTerm::Var(name) => match next.get(name) {
                Some(existing) if *existing != value => return None,
                Some(_) => {}
                None => {
                    next.insert(name.clone(), value);
                }
            },
        }
    }
    Some(next)
}

/// Evaluate a built-in condition against a fully-resolved substitution and
/// a term resolver for classifying bound terms.
pub fn evaluate_condition(
    cond: &Cond,
    subst: &Substitution,
    resolve_term: impl Fn(TermId) -> Option<Term>,
) -> bool {
    match cond {
        Cond::NotEqual(a, b) => match (resolve(a, subst), resolve(b, subst)) {
            (Some(x), Some(y)) => x != y,
            _ => false,
        },
        Cond::Bound(t) => resolve(t, subst).is_some(),
        Cond::IsIri(t) => resolve(t, subst)
            .and_then(&resolve_term)
            .is_some_and(|term| matches!(term, Term::Iri(_))),
        Cond::IsBlank(t) => resolve(t, subst)
            .and_then(&resolve_term)
            .is_some_and(|term| matches!(term, Term::BlankNode(_))),
        Cond::IsLiteral(t) => resolve(t, subst)
            .and_then(&resolve_term)
            .is_some_and(|term| matches!(term, Term::Literal(_))),
    }
}
