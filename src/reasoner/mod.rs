//! Semi-naive Evaluator (C10): delta-driven forward-chaining fixpoint over
//! a registered rule set.

pub mod incremental;
pub mod status;

use crate::error::{CoreError, CoreResult};
use crate::kv::{Cf, KvStore, WriteOp};
use crate::pattern::PatternMatcher;
use crate::rules::{self, BodyAtom, Rule, Substitution};
use crate::triple_index::{Triple, TripleIndexer};
use rayon::prelude::*;
use std::collections::HashSet;
use std::time::Instant;

/// Forward-chaining stops after this many rounds even if the fact base has
/// not reached a fixpoint, to bound runaway rule sets.
pub const MAX_ITER: usize = 50;
/// Forward-chaining stops once the derived fact count would exceed this.
pub const MAX_FACTS: usize = 5_000_000;

/// Per-round and aggregate statistics from one [`Reasoner::materialize`] run.
#[derive(Debug, Clone, Default)]
pub struct ReasoningStats {
    pub iterations: usize,
    pub total_derived: usize,
    pub derivations_per_iteration: Vec<usize>,
    pub duration_ms: u64,
    pub rules_applied: usize,
}

/// Drives semi-naive forward-chaining evaluation of a fixed rule set over
/// the store's explicit and derived facts.
pub struct Reasoner {
    kv: KvStore,
    indexer: TripleIndexer,
    rules: Vec<Rule>,
    parallel: bool,
}

impl Reasoner {
    pub fn new(kv: KvStore, rules: Vec<Rule>, parallel: bool) -> CoreResult<Reasoner> {
        for rule in &rules {
            if !rule.is_safe() {
                return Err(CoreError::Validation(format!("unsafe rule: {}", rule.name)));
            }
        }
        Ok(Reasoner { indexer: TripleIndexer::new(kv.clone()), kv, rules, parallel })
    }

    /// Evaluate one rule against `known` (the full in-memory fact set for
    /// this round, persisted or not), requiring that at least one of its
    /// body patterns matches a triple in `delta` (the semi-naive
    /// restriction): this is what keeps each round doing work proportional
    /// to what changed, not to the whole fact base. Non-delta body atoms
    /// join against `known` directly rather than `self.kv`, so a dry-run
    /// (`persist = false`) round sees derivations from earlier rounds that
    /// were never written back to the backend.
    fn evaluate_rule(
        &self,
        rule: &Rule,
        delta: &HashSet<Triple>,
        known: &HashSet<Triple>,
    ) -> CoreResult<HashSet<Triple>> {
        let pattern_atoms: Vec<&BodyAtom> = rule.body.iter().filter(|a| a.pattern().is_some()).collect();
        let mut derived = HashSet::new();

        for delta_atom_idx in 0..pattern_atoms.len() {
            let mut frontier: Vec<Substitution> = Vec::new();
            let delta_pattern = pattern_atoms[delta_atom_idx].pattern().unwrap();
            for triple in delta {
                if let Some(subst) = rules::unify(delta_pattern, triple, &Substitution::new()) {
                    frontier.push(subst);
                }
            }

            for (i, atom) in rule.body.iter().enumerate() {
                let is_delta_atom = pattern_atoms
                    .get(delta_atom_idx)
                    .map(|a| std::ptr::eq(*a, atom))
                    .unwrap_or(false);
                if is_delta_atom {
                    continue;
                }
                let _ = i;
                match atom {
                    BodyAtom::Pattern(p) => {
                        let mut next_frontier = Vec::new();
                        for subst in &frontier {
                            for triple in known {
                                if let Some(extended) = rules::unify(p, triple, subst) {
                                    next_frontier.push(extended);
                                }
                            }
                        }
                        frontier = next_frontier;
                    }
                    BodyAtom::Condition(cond) => {
                        frontier.retain(|subst| {
                            rules::evaluate_condition(cond, subst, |_| None)
                        });
                    }
                }
                if frontier.is_empty() {
                    break;
                }
            }

            for subst in frontier {
                if let Some(triple) = rules::ground_pattern(&rule.head, &subst) {
                    derived.insert(triple);
                }
            }
        }

        Ok(derived)
    }

    /// Run the semi-naive fixpoint loop to completion (or until `MAX_ITER`
    /// / `MAX_FACTS` is hit), persisting every newly derived triple into the
    /// triple indexes and the `derived` column family.
    pub fn materialize(&self) -> CoreResult<ReasoningStats> {
        let known: HashSet<Triple> = self.all_facts()?.into_iter().collect();
        let (stats, _final_known) = self.run_from_delta(known.clone(), known, true)?;
        tracing::info!(
            iterations = stats.iterations,
            total_derived = stats.total_derived,
            duration_ms = stats.duration_ms,
            "reasoning_materialized"
        );
        Ok(stats)
    }

    /// Run the fixpoint loop starting from a caller-supplied `initial_delta`
    /// against a caller-supplied `known` base, rather than the whole store.
    /// Used by [`incremental`] to chase only the consequences of a small
    /// set of newly asserted (or candidate) facts. When `persist` is
    /// `false` this is a dry run: no writes reach the backend, and the
    /// returned fact set is the caller's to use as it sees fit.
    pub(crate) fn run_from_delta(
        &self,
        mut delta: HashSet<Triple>,
        mut known: HashSet<Triple>,
        persist: bool,
    ) -> CoreResult<(ReasoningStats, HashSet<Triple>)> {
        let start = Instant::now();
        let mut stats = ReasoningStats::default();

        loop {
            if stats.iterations >= MAX_ITER {
                return Err(CoreError::MaxIterationsExceeded(MAX_ITER));
            }

            let per_rule: Vec<CoreResult<HashSet<Triple>>> = if self.parallel {
                self.rules.par_iter().map(|rule| self.evaluate_rule(rule, &delta, &known)).collect()
            } else {
                self.rules.iter().map(|rule| self.evaluate_rule(rule, &delta, &known)).collect()
            };

            let mut round_new: HashSet<Triple> = HashSet::new();
            for result in per_rule {
                for triple in result? {
                    if !known.contains(&triple) {
                        round_new.insert(triple);
                    }
                }
            }

            stats.iterations += 1;
            stats.rules_applied += self.rules.len();
            stats.derivations_per_iteration.push(round_new.len());

            if round_new.is_empty() {
                break;
            }

            if known.len() + round_new.len() > MAX_FACTS {
                return Err(CoreError::MaxFactsExceeded(MAX_FACTS));
            }

            if persist {
                self.persist_derived(&round_new)?;
            }
            for t in &round_new {
                known.insert(*t);
            }
            stats.total_derived += round_new.len();
            delta = round_new;
        }

        stats.duration_ms = start.elapsed().as_millis() as u64;
        Ok((stats, known))
    }

    pub(crate) fn all_facts(&self) -> CoreResult<Vec<Triple>> {
        let matcher = PatternMatcher::new(&self.kv);
        matcher.scan(crate::pattern::TriplePattern::default())
    }

    pub(crate) fn kv(&self) -> &KvStore {
        &self.kv
    }

    pub(crate) fn indexer(&self) -> &TripleIndexer {
        &self.indexer
    }

    fn persist_derived(&self, triples: &HashSet<Triple>) -> CoreResult<()> {
        let as_vec: Vec<Triple> = triples.iter().copied().collect();
        self.indexer.insert_many(&as_vec)?;
        let mut ops = Vec::with_capacity(as_vec.len());
        for t in &as_vec {
            let mut key = Vec::with_capacity(24);
            key.extend_from_slice(&t.s.to_be_bytes());
            key.extend_from_slice(&t.p.to_be_bytes());
            key.extend_from_slice(&t.o.to_be_bytes());
            ops.push(WriteOp::Put(Cf::Derived, key, Vec::new()));
        }
        self.kv.write_batch(ops, false)?;
        Ok(())
    }

    /// True iff `triple` was produced by reasoning rather than asserted
    /// directly.
    pub fn is_derived(&self, triple: &Triple) -> CoreResult<bool> {
        let mut key = Vec::with_capacity(24);
        key.extend_from_slice(&triple.s.to_be_bytes());
        key.extend_from_slice(&triple.p.to_be_bytes());
        key.extend_from_slice(&triple.o.to_be_bytes());
        self.kv.exists(Cf::Derived, &key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::tuning::LsmPreset;
    use crate::rules::profiles::{self, Profile, VocabularyResolver};
    use crate::term::TermKind;
    use std::collections::HashMap;

    struct StubResolver {
        next: u64,
        known: HashMap<String, crate::term::TermId>,
    }

    impl StubResolver {
        fn new() -> StubResolver {
            StubResolver { next: 1000, known: HashMap::new() }
        }
    }

    impl VocabularyResolver for StubResolver {
        fn resolve(&mut self, iri: &str) -> CoreResult<crate::term::TermId> {
            if let Some(id) = self.known.get(iri) {
                return Ok(*id);
            }
            let id = crate::term::TermId::from_parts(TermKind::Uri, self.next);
            self.next += 1;
            self.known.insert(iri.to_string(), id);
            Ok(id)
        }
    }

    fn tid(v: u64) -> crate::term::TermId {
        crate::term::TermId::from_parts(TermKind::Uri, v)
    }

    #[test]
    fn subclass_transitivity_materializes() {
        let dir = tempfile::tempdir().unwrap();
        let kv = KvStore::open(dir.path(), &LsmPreset::Default.config()).unwrap();
        let mut resolver = StubResolver::new();
        let rules = profiles::rdfs_rules(&mut resolver).unwrap();

        let type_ = resolver.resolve(profiles::RDF_TYPE).unwrap();
        let subclass = resolver.resolve(profiles::RDFS_SUBCLASS_OF).unwrap();

        let indexer = TripleIndexer::new(kv.clone());
        indexer
            .insert_many(&[
                Triple::new(tid(1), subclass, tid(2)),
                Triple::new(tid(2), subclass, tid(3)),
                Triple::new(tid(10), type_, tid(1)),
            ])
            .unwrap();

        let reasoner = Reasoner::new(kv.clone(), rules, false).unwrap();
        let stats = reasoner.materialize().unwrap();
        assert!(stats.total_derived > 0);

        let matcher = PatternMatcher::new(&kv);
        let types_of_10 = matcher
            .scan(crate::pattern::TriplePattern::new(Some(tid(10)), Some(type_), None))
            .unwrap();
        let objects: HashSet<_> = types_of_10.iter().map(|t| t.o).collect();
        assert!(objects.contains(&tid(2)));
        assert!(objects.contains(&tid(3)));

        assert!(reasoner
            .is_derived(&Triple::new(tid(1), subclass, tid(3)))
            .unwrap());
    }

    #[test]
    fn parallel_and_sequential_produce_identical_fixpoints() {
        let dir = tempfile::tempdir().unwrap();
        let kv = KvStore::open(dir.path(), &LsmPreset::Default.config()).unwrap();
        let mut resolver = StubResolver::new();
        let rules = profiles::rdfs_rules(&mut resolver).unwrap();
        let subclass = resolver.resolve(profiles::RDFS_SUBCLASS_OF).unwrap();

        let indexer = TripleIndexer::new(kv.clone());
        indexer
            .insert_many(&[
                Triple::new(tid(1), subclass, tid(2)),
                Triple::new(tid(2), subclass, tid(3)),
                Triple::new(tid(3), subclass, tid(4)),
            ])
            .unwrap();

        let seq = Reasoner::new(kv.clone(), rules.clone(), false).unwrap();
        let seq_stats = seq.materialize().unwrap();

        let dir2 = tempfile::tempdir().unwrap();
        let kv2 = KvStore::open(dir2.path(), &LsmPreset::Default.config()).unwrap();
        let indexer2 = TripleIndexer::new(kv2.clone());
        indexer2
            .insert_many(&[
                Triple::new(tid(1), subclass, tid(2)),
                Triple::new(tid(2), subclass, tid(3)),
                Triple::new(tid(3), subclass, tid(4)),
            ])
            .unwrap();
        let par = Reasoner::new(kv2.clone(), rules, true).unwrap();
        let par_stats = par.materialize().unwrap();

        assert_eq!(seq_stats.total_derived, par_stats.total_derived);

        let matcher1 = PatternMatcher::new(&kv);
        let matcher2 = PatternMatcher::new(&kv2);
        let all1: HashSet<_> = matcher1.scan(crate::pattern::TriplePattern::default()).unwrap().into_iter().collect();
        let all2: HashSet<_> = matcher2.scan(crate::pattern::TriplePattern::default()).unwrap().into_iter().collect();
        assert_eq!(all1, all2);
    }
}
