//! Static RDFS and OWL 2 RL rule sets, expressed against the well-known
//! vocabulary IRIs. Building a profile requires a resolver that maps those
//! IRIs to `TermId`s (interning them into the dictionary if necessary), since
//! rule patterns carry `TermId` constants, not strings.

use crate::error::CoreResult;
use crate::rules::{BodyAtom, Cond, Rule, RulePattern, RuleTerm};
use crate::term::TermId;

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const RDFS_SUBCLASS_OF: &str = "http://www.w3.org/2000/01/rdf-schema#subClassOf";
pub const RDFS_SUBPROPERTY_OF: &str = "http://www.w3.org/2000/01/rdf-schema#subPropertyOf";
pub const RDFS_DOMAIN: &str = "http://www.w3.org/2000/01/rdf-schema#domain";
pub const RDFS_RANGE: &str = "http://www.w3.org/2000/01/rdf-schema#range";
pub const OWL_SAME_AS: &str = "http://www.w3.org/2002/07/owl#sameAs";
pub const OWL_EQUIVALENT_CLASS: &str = "http://www.w3.org/2002/07/owl#equivalentClass";
pub const OWL_EQUIVALENT_PROPERTY: &str = "http://www.w3.org/2002/07/owl#equivalentProperty";
pub const OWL_INVERSE_OF: &str = "http://www.w3.org/2002/07/owl#inverseOf";
pub const OWL_TRANSITIVE_PROPERTY: &str = "http://www.w3.org/2002/07/owl#TransitiveProperty";
pub const OWL_SYMMETRIC_PROPERTY: &str = "http://www.w3.org/2002/07/owl#SymmetricProperty";
pub const OWL_FUNCTIONAL_PROPERTY: &str = "http://www.w3.org/2002/07/owl#FunctionalProperty";
pub const OWL_INVERSE_FUNCTIONAL_PROPERTY: &str =
    "http://www.w3.org/2002/07/owl#InverseFunctionalProperty";

/// Which closure rules to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Rdfs,
    Owl2Rl,
    All,
}

/// Interns (or looks up) the vocabulary IRIs a profile needs and returns
/// their `TermId`s. Implemented by the dictionary in normal use; tests can
/// supply a stub.
pub trait VocabularyResolver {
    fn resolve(&mut self, iri: &str) -> CoreResult<TermId>;
}

struct V<'a, R: VocabularyResolver> {
    r: &'a mut R,
}

impl<'a, R: VocabularyResolver> V<'a, R> {
    fn c(&mut self, iri: &str) -> CoreResult<RuleTerm> {
        Ok(RuleTerm::Const(self.r.resolve(iri)?))
    }
}

fn pat(s: RuleTerm, p: RuleTerm, o: RuleTerm) -> RulePattern {
    RulePattern::new(s, p, o)
}

/// RDFS entailment rules: subclass/subproperty transitivity, domain/range
/// propagation, and membership propagation along the subclass/subproperty
/// hierarchies.
pub fn rdfs_rules(r: &mut impl VocabularyResolver) -> CoreResult<Vec<Rule>> {
    let mut v = V { r };
    let type_ = v.c(RDF_TYPE)?;
    let subclass = v.c(RDFS_SUBCLASS_OF)?;
    let subprop = v.c(RDFS_SUBPROPERTY_OF)?;
    let domain = v.c(RDFS_DOMAIN)?;
    let range = v.c(RDFS_RANGE)?;

    Ok(vec![
        Rule::new(
            "rdfs:subClassOf transitivity",
            vec![
                BodyAtom::Pattern(pat(RuleTerm::var("a"), subclass.clone(), RuleTerm::var("b"))),
                BodyAtom::Pattern(pat(RuleTerm::var("b"), subclass.clone(), RuleTerm::var("c"))),
            ],
            pat(RuleTerm::var("a"), subclass.clone(), RuleTerm::var("c")),
        ),
        Rule::new(
            "rdfs:subPropertyOf transitivity",
            vec![
                BodyAtom::Pattern(pat(RuleTerm::var("a"), subprop.clone(), RuleTerm::var("b"))),
                BodyAtom::Pattern(pat(RuleTerm::var("b"), subprop.clone(), RuleTerm::var("c"))),
            ],
            pat(RuleTerm::var("a"), subprop.clone(), RuleTerm::var("c")),
        ),
        Rule::new(
            "rdfs:subClassOf membership propagation",
            vec![
                BodyAtom::Pattern(pat(RuleTerm::var("x"), type_.clone(), RuleTerm::var("c1"))),
                BodyAtom::Pattern(pat(RuleTerm::var("c1"), subclass.clone(), RuleTerm::var("c2"))),
            ],
            pat(RuleTerm::var("x"), type_.clone(), RuleTerm::var("c2")),
        ),
        Rule::new(
            "rdfs:subPropertyOf statement propagation",
            vec![
                BodyAtom::Pattern(pat(RuleTerm::var("x"), RuleTerm::var("p1"), RuleTerm::var("y"))),
                BodyAtom::Pattern(pat(RuleTerm::var("p1"), subprop.clone(), RuleTerm::var("p2"))),
            ],
            pat(RuleTerm::var("x"), RuleTerm::var("p2"), RuleTerm::var("y")),
        ),
        Rule::new(
            "rdfs:domain",
            vec![
                BodyAtom::Pattern(pat(RuleTerm::var("x"), RuleTerm::var("p"), RuleTerm::var("y"))),
                BodyAtom::Pattern(pat(RuleTerm::var("p"), domain.clone(), RuleTerm::var("c"))),
            ],
            pat(RuleTerm::var("x"), type_.clone(), RuleTerm::var("c")),
        ),
        Rule::new(
            "rdfs:range",
            vec![
                BodyAtom::Pattern(pat(RuleTerm::var("x"), RuleTerm::var("p"), RuleTerm::var("y"))),
                BodyAtom::Pattern(pat(RuleTerm::var("p"), range.clone(), RuleTerm::var("c"))),
            ],
            pat(RuleTerm::var("y"), type_.clone(), RuleTerm::var("c")),
        ),
    ])
}

/// A representative subset of the OWL 2 RL rules named in the profile's
/// property- and class-axiom tables: property characteristics (symmetric,
/// transitive, functional, inverse-functional), equivalence axioms, and
/// `sameAs` replacement.
pub fn owl2rl_rules(r: &mut impl VocabularyResolver) -> CoreResult<Vec<Rule>> {
    let mut v = V { r };
    let same_as = v.c(OWL_SAME_AS)?;
    let eq_class = v.c(OWL_EQUIVALENT_CLASS)?;
    let eq_prop = v.c(OWL_EQUIVALENT_PROPERTY)?;
    let inverse_of = v.c(OWL_INVERSE_OF)?;
    let transitive = v.c(OWL_TRANSITIVE_PROPERTY)?;
    let symmetric = v.c(OWL_SYMMETRIC_PROPERTY)?;
    let functional = v.c(OWL_FUNCTIONAL_PROPERTY)?;
    let inverse_functional = v.c(OWL_INVERSE_FUNCTIONAL_PROPERTY)?;
    let type_ = v.c(RDF_TYPE)?;

    Ok(vec![
        Rule::new(
            "eq-sym",
            vec![BodyAtom::Pattern(pat(RuleTerm::var("x"), same_as.clone(), RuleTerm::var("y")))],
            pat(RuleTerm::var("y"), same_as.clone(), RuleTerm::var("x")),
        ),
        Rule::new(
            "eq-trans",
            vec![
                BodyAtom::Pattern(pat(RuleTerm::var("x"), same_as.clone(), RuleTerm::var("y"))),
                BodyAtom::Pattern(pat(RuleTerm::var("y"), same_as.clone(), RuleTerm::var("z"))),
                BodyAtom::Condition(Cond::NotEqual(RuleTerm::var("x"), RuleTerm::var("z"))),
            ],
            pat(RuleTerm::var("x"), same_as.clone(), RuleTerm::var("z")),
        ),
        Rule::new(
            "eq-rep-o (sameAs object replacement)",
            vec![
                BodyAtom::Pattern(pat(RuleTerm::var("s"), RuleTerm::var("p"), RuleTerm::var("o1"))),
                BodyAtom::Pattern(pat(RuleTerm::var("o1"), same_as.clone(), RuleTerm::var("o2"))),
            ],
            pat(RuleTerm::var("s"), RuleTerm::var("p"), RuleTerm::var("o2")),
        ),
        Rule::new(
            "eq-rep-s (sameAs subject replacement)",
            vec![
                BodyAtom::Pattern(pat(RuleTerm::var("s1"), RuleTerm::var("p"), RuleTerm::var("o"))),
                BodyAtom::Pattern(pat(RuleTerm::var("s1"), same_as.clone(), RuleTerm::var("s2"))),
            ],
            pat(RuleTerm::var("s2"), RuleTerm::var("p"), RuleTerm::var("o")),
        ),
        Rule::new(
            "cax-eqc1 (equivalentClass forward)",
            vec![
                BodyAtom::Pattern(pat(RuleTerm::var("x"), type_.clone(), RuleTerm::var("c1"))),
                BodyAtom::Pattern(pat(RuleTerm::var("c1"), eq_class.clone(), RuleTerm::var("c2"))),
            ],
            pat(RuleTerm::var("x"), type_.clone(), RuleTerm::var("c2")),
        ),
        Rule::new(
            "cax-eqc2 (equivalentClass backward)",
            vec![
                BodyAtom::Pattern(pat(RuleTerm::var("x"), type_.clone(), RuleTerm::var("c2"))),
                BodyAtom::Pattern(pat(RuleTerm::var("c1"), eq_class.clone(), RuleTerm::var("c2"))),
            ],
            pat(RuleTerm::var("x"), type_.clone(), RuleTerm::var("c1")),
        ),
        Rule::new(
            "prp-eqp1 (equivalentProperty forward)",
            vec![
                BodyAtom::Pattern(pat(RuleTerm::var("x"), RuleTerm::var("p1"), RuleTerm::var("y"))),
                BodyAtom::Pattern(pat(RuleTerm::var("p1"), eq_prop.clone(), RuleTerm::var("p2"))),
            ],
            pat(RuleTerm::var("x"), RuleTerm::var("p2"), RuleTerm::var("y")),
        ),
        Rule::new(
            "prp-symp (symmetric property)",
            vec![
                BodyAtom::Pattern(pat(RuleTerm::var("p"), type_.clone(), symmetric.clone())),
                BodyAtom::Pattern(pat(RuleTerm::var("x"), RuleTerm::var("p"), RuleTerm::var("y"))),
            ],
            pat(RuleTerm::var("y"), RuleTerm::var("p"), RuleTerm::var("x")),
        ),
        Rule::new(
            "prp-trp (transitive property)",
            vec![
                BodyAtom::Pattern(pat(RuleTerm::var("p"), type_.clone(), transitive.clone())),
                BodyAtom::Pattern(pat(RuleTerm::var("x"), RuleTerm::var("p"), RuleTerm::var("y"))),
                BodyAtom::Pattern(pat(RuleTerm::var("y"), RuleTerm::var("p"), RuleTerm::var("z"))),
            ],
            pat(RuleTerm::var("x"), RuleTerm::var("p"), RuleTerm::var("z")),
        ),
        Rule::new(
            "prp-inv1 (inverseOf forward)",
            vec![
                BodyAtom::Pattern(pat(RuleTerm::var("p1"), inverse_of.clone(), RuleTerm::var("p2"))),
                BodyAtom::Pattern(pat(RuleTerm::var("x"), RuleTerm::var("p1"), RuleTerm::var("y"))),
            ],
            pat(RuleTerm::var("y"), RuleTerm::var("p2"), RuleTerm::var("x")),
        ),
        Rule::new(
            "prp-fp (functional property)",
            vec![
                BodyAtom::Pattern(pat(RuleTerm::var("p"), type_.clone(), functional.clone())),
                BodyAtom::Pattern(pat(RuleTerm::var("x"), RuleTerm::var("p"), RuleTerm::var("y1"))),
                BodyAtom::Pattern(pat(RuleTerm::var("x"), RuleTerm::var("p"), RuleTerm::var("y2"))),
                BodyAtom::Condition(Cond::NotEqual(RuleTerm::var("y1"), RuleTerm::var("y2"))),
            ],
            pat(RuleTerm::var("y1"), same_as.clone(), RuleTerm::var("y2")),
        ),
        Rule::new(
            "prp-ifp (inverse-functional property)",
            vec![
                BodyAtom::Pattern(pat(RuleTerm::var("p"), type_.clone(), inverse_functional.clone())),
                BodyAtom::Pattern(pat(RuleTerm::var("x1"), RuleTerm::var("p"), RuleTerm::var("y"))),
                BodyAtom::Pattern(pat(RuleTerm::var("x2"), RuleTerm::var("p"), RuleTerm::var("y"))),
                BodyAtom::Condition(Cond::NotEqual(RuleTerm::var("x1"), RuleTerm::var("x2"))),
            ],
            pat(RuleTerm::var("x1"), same_as.clone(), RuleTerm::var("x2")),
        ),
    ])
}

/// Load the rule set for `profile`, verifying every rule is safe before
/// returning it.
pub fn load(profile: Profile, r: &mut impl VocabularyResolver) -> CoreResult<Vec<Rule>> {
    let rules = match profile {
        Profile::Rdfs => rdfs_rules(r)?,
        Profile::Owl2Rl => owl2rl_rules(r)?,
        Profile::All => {
            let mut all = rdfs_rules(r)?;
            all.extend(owl2rl_rules(r)?);
            all
        }
    };
    debug_assert!(rules.iter().all(Rule::is_safe), "every built-in rule must be safe");
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::TermKind;
    use std::collections::HashMap;

    struct StubResolver {
        next: u64,
        known: HashMap<String, TermId>,
    }

    impl StubResolver {
        fn new() -> StubResolver {
            StubResolver { next: 0, known: HashMap::new() }
        }
    }

    impl VocabularyResolver for StubResolver {
        fn resolve(&mut self, iri: &str) -> CoreResult<TermId> {
            if let Some(id) = self.known.get(iri) {
                return Ok(*id);
            }
            let id = TermId::from_parts(TermKind::Uri, self.next);
            self.next += 1;
            self.known.insert(iri.to_string(), id);
            Ok(id)
        }
    }

    #[test]
    fn rdfs_rules_are_all_safe() {
        let mut r = StubResolver::new();
        let rules = rdfs_rules(&mut r).unwrap();
        assert!(rules.iter().all(Rule::is_safe));
        assert!(!rules.is_empty());
    }

    #[test]
    fn owl2rl_rules_are_all_safe() {
        let mut r = StubResolver::new();
        let rules = owl2rl_rules(&mut r).unwrap();
        assert!(rules.iter().all(Rule::is_safe));
    }

    #[test]
    fn all_profile_combines_both_sets() {
        let mut r = StubResolver::new();
        let rdfs = rdfs_rules(&mut r).unwrap().len();
        let owl = owl2rl_rules(&mut r).unwrap().len();
        let all = load(Profile::All, &mut r).unwrap();
        assert_eq!(all.len(), rdfs + owl);
    }
}
