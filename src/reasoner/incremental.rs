//! Incremental Maintainer (C11): keeps the derived closure in step with
//! explicit-fact additions and deletions without a full re-materialization.

use crate::error::CoreResult;
use crate::kv::{Cf, WriteOp};
use crate::reasoner::{Reasoner, ReasoningStats};
use crate::triple_index::Triple;
use std::collections::HashSet;

pub struct IncrementalMaintainer<'a> {
    reasoner: &'a Reasoner,
}

impl<'a> IncrementalMaintainer<'a> {
    pub fn new(reasoner: &'a Reasoner) -> IncrementalMaintainer<'a> {
        IncrementalMaintainer { reasoner }
    }

    /// Assert `new_facts` and chase only their consequences (a semi-naive
    /// round seeded with just the delta, joined against the full existing
    /// fact base), persisting anything new.
    pub fn add(&self, new_facts: &[Triple]) -> CoreResult<ReasoningStats> {
        self.reasoner.indexer().insert_many(new_facts)?;

        let known: HashSet<Triple> = self.reasoner.all_facts()?.into_iter().collect();
        let delta: HashSet<Triple> = new_facts.iter().copied().collect();
        let (stats, _) = self.reasoner.run_from_delta(delta, known, true)?;
        tracing::info!(asserted = new_facts.len(), derived = stats.total_derived, "incremental_add_completed");
        Ok(stats)
    }

    /// Compute, without persisting anything, what `add` would derive from
    /// `new_facts` if applied now.
    pub fn preview(&self, new_facts: &[Triple]) -> CoreResult<HashSet<Triple>> {
        let mut known: HashSet<Triple> = self.reasoner.all_facts()?.into_iter().collect();
        for t in new_facts {
            known.insert(*t);
        }
        let delta: HashSet<Triple> = new_facts.iter().copied().collect();
        let (_, final_known) = self.reasoner.run_from_delta(delta, known.clone(), false)?;
        Ok(final_known.difference(&known).copied().collect())
    }

    /// Remove `explicit_deleted` and repair the derived closure: every
    /// derived fact that could have depended on what was removed is
    /// withdrawn, the closure is re-derived from what remains, and any of
    /// those withdrawn facts still re-derivable through another path are
    /// restored. Victims are tracked in a `HashSet` so repeated deletes of
    /// the same fact are idempotent rather than compounding.
    pub fn delete_with_reasoning(&self, explicit_deleted: &[Triple]) -> CoreResult<ReasoningStats> {
        let deleted_set: HashSet<Triple> = explicit_deleted.iter().copied().collect();
        self.reasoner.indexer().delete_many(explicit_deleted)?;
        self.remove_from_derived_cf(explicit_deleted)?;

        let mut potentially_invalid: HashSet<Triple> = deleted_set.clone();
        let remaining: HashSet<Triple> = self
            .reasoner
            .all_facts()?
            .into_iter()
            .filter(|t| !deleted_set.contains(t))
            .collect();

        // Anything currently marked derived is a candidate for invalidation:
        // without provenance tracking per-derivation we conservatively treat
        // every derived fact as potentially dependent on the deletion and
        // let re-derivation from the surviving explicit facts restore it.
        for t in &remaining {
            if self.reasoner.is_derived(t)? {
                potentially_invalid.insert(*t);
            }
        }

        let candidate_remaining: HashSet<Triple> =
            remaining.difference(&potentially_invalid).copied().collect();

        self.retract_many(&potentially_invalid.intersection(&remaining).copied().collect::<Vec<_>>())?;

        let (stats, final_facts) =
            self.reasoner
                .run_from_delta(candidate_remaining.clone(), candidate_remaining, true)?;

        let restored: Vec<Triple> = potentially_invalid
            .intersection(&remaining)
            .filter(|t| final_facts.contains(t))
            .copied()
            .collect();
        if !restored.is_empty() {
            self.reasoner.indexer().insert_many(&restored)?;
        }

        tracing::info!(
            explicit_deleted = explicit_deleted.len(),
            candidates_invalidated = potentially_invalid.len(),
            restored = restored.len(),
            "incremental_delete_completed"
        );
        Ok(stats)
    }

    fn retract_many(&self, triples: &[Triple]) -> CoreResult<()> {
        if triples.is_empty() {
            return Ok(());
        }
        self.reasoner.indexer().delete_many(triples)
    }

    fn remove_from_derived_cf(&self, triples: &[Triple]) -> CoreResult<()> {
        let mut ops = Vec::with_capacity(triples.len());
        for t in triples {
            let mut key = Vec::with_capacity(24);
            key.extend_from_slice(&t.s.to_be_bytes());
            key.extend_from_slice(&t.p.to_be_bytes());
            key.extend_from_slice(&t.o.to_be_bytes());
            ops.push(WriteOp::Delete(Cf::Derived, key));
        }
        self.reasoner.kv().write_batch(ops, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::tuning::LsmPreset;
    use crate::kv::KvStore;
    use crate::pattern::{PatternMatcher, TriplePattern};
    use crate::rules::profiles::{self, VocabularyResolver};
    use crate::term::{TermId, TermKind};
    use crate::triple_index::TripleIndexer;
    use std::collections::HashMap;

    struct StubResolver {
        next: u64,
        known: HashMap<String, TermId>,
    }

    impl StubResolver {
        fn new() -> StubResolver {
            StubResolver { next: 1000, known: HashMap::new() }
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

    fn tid(v: u64) -> TermId {
        TermId::from_parts(TermKind::Uri, v)
    }

    #[test]
    fn add_derives_only_from_the_new_delta() {
        let dir = tempfile::tempdir().unwrap();
        let kv = KvStore::open(dir.path(), &LsmPreset::Default.config()).unwrap();
        let mut resolver = StubResolver::new();
        let rules = profiles::rdfs_rules(&mut resolver).unwrap();
        let subclass = resolver.resolve(profiles::RDFS_SUBCLASS_OF).unwrap();

        let reasoner = Reasoner::new(kv.clone(), rules, false).unwrap();
        let maint = IncrementalMaintainer::new(&reasoner);

        maint.add(&[Triple::new(tid(1), subclass, tid(2))]).unwrap();
        maint.add(&[Triple::new(tid(2), subclass, tid(3))]).unwrap();

        let matcher = PatternMatcher::new(&kv);
        let result = matcher
            .scan(TriplePattern::new(Some(tid(1)), Some(subclass), None))
            .unwrap();
        let objects: HashSet<_> = result.iter().map(|t| t.o).collect();
        assert!(objects.contains(&tid(3)));
    }

    #[test]
    fn delete_preserves_facts_with_alternative_derivation() {
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
                Triple::new(tid(1), subclass, tid(3)),
            ])
            .unwrap();

        let reasoner = Reasoner::new(kv.clone(), rules, false).unwrap();
        reasoner.materialize().unwrap();

        let maint = IncrementalMaintainer::new(&reasoner);
        maint
            .delete_with_reasoning(&[Triple::new(tid(2), subclass, tid(3))])
            .unwrap();

        assert!(reasoner.indexer().exists(&Triple::new(tid(1), subclass, tid(3))).unwrap());
    }

    #[test]
    fn preview_does_not_persist_anything() {
        let dir = tempfile::tempdir().unwrap();
        let kv = KvStore::open(dir.path(), &LsmPreset::Default.config()).unwrap();
        let mut resolver = StubResolver::new();
        let rules = profiles::rdfs_rules(&mut resolver).unwrap();
        let subclass = resolver.resolve(profiles::RDFS_SUBCLASS_OF).unwrap();

        let indexer = TripleIndexer::new(kv.clone());
        indexer.insert(&Triple::new(tid(1), subclass, tid(2))).unwrap();

        let reasoner = Reasoner::new(kv.clone(), rules, false).unwrap();
        let maint = IncrementalMaintainer::new(&reasoner);

        let would_derive = maint.preview(&[Triple::new(tid(2), subclass, tid(3))]).unwrap();
        assert!(would_derive.contains(&Triple::new(tid(1), subclass, tid(3))));
        assert!(!reasoner.indexer().exists(&Triple::new(tid(1), subclass, tid(3))).unwrap());
        assert!(!reasoner.indexer().exists(&Triple::new(tid(2), subclass, tid(3))).unwrap());
    }
}
