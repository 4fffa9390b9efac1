//! Sharded Dictionary (C6): fans the dictionary out across N independent
//! [`DictionaryManager`]s, routed by a consistent hash of the term's
//! canonical encoding, with parallel batch resolution over `rayon`.

use crate::codec;
use crate::dictionary::DictionaryManager;
use crate::error::{CoreError, CoreResult};
use crate::kv::tuning::LsmConfig;
use crate::kv::KvStore;
use crate::sequence::SequenceAllocator;
use crate::term::{Term, TermId};
use rayon::prelude::*;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A batch request larger than this is rejected rather than silently
/// chunked, so callers size their own batches deliberately.
pub const MAX_BATCH: usize = 100_000;

/// A cooperative cancellation signal a long-running batch can poll.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> CancellationToken {
        CancellationToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

fn shard_hash(term: &Term) -> u64 {
    let key = codec::encode(term);
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

/// Routes terms to one of `N` independent dictionary shards and resolves
/// batches in parallel.
pub struct ShardedDictionary {
    shards: Vec<DictionaryManager>,
}

impl ShardedDictionary {
    /// Open `shard_count` shards (each its own `KvStore` directory under
    /// `base_dir/shard-<n>`, each its own `SequenceAllocator`). Defaults to
    /// `num_cpus::get()` shards when `shard_count` is `None`.
    pub fn open(
        base_dir: impl AsRef<Path>,
        tuning: &LsmConfig,
        shard_count: Option<usize>,
    ) -> CoreResult<ShardedDictionary> {
        let shard_count = shard_count.unwrap_or_else(num_cpus::get).max(1);
        let base_dir = base_dir.as_ref();
        let mut shards = Vec::with_capacity(shard_count);
        for i in 0..shard_count {
            let dir = base_dir.join(format!("shard-{i}"));
            let kv = KvStore::open(dir.join("db"), tuning)?;
            let seq = Arc::new(SequenceAllocator::open(dir.join("counters.bin"))?);
            shards.push(DictionaryManager::new(kv, seq));
        }
        tracing::info!(shard_count, "sharded_dictionary_opened");
        Ok(ShardedDictionary { shards })
    }

    /// Construct directly from already-open shards, e.g. in tests.
    pub fn from_shards(shards: Vec<DictionaryManager>) -> ShardedDictionary {
        assert!(!shards.is_empty(), "a sharded dictionary needs at least one shard");
        ShardedDictionary { shards }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn shard_for(&self, term: &Term) -> &DictionaryManager {
        let idx = (shard_hash(term) as usize) % self.shards.len();
        &self.shards[idx]
    }

    pub fn lookup_id(&self, term: &Term) -> CoreResult<Option<TermId>> {
        self.shard_for(term).lookup_id(term)
    }

    pub fn lookup_term(&self, id: TermId, shard_hint: usize) -> CoreResult<Option<Term>> {
        self.shards[shard_hint % self.shards.len()].lookup_term(id)
    }

    pub fn get_or_create_id(&self, term: &Term) -> CoreResult<TermId> {
        self.shard_for(term).get_or_create_id(term)
    }

    /// Resolve a batch of terms in parallel, one `rayon` task per shard
    /// group. Rejects batches over [`MAX_BATCH`] outright.
    pub fn get_or_create_ids(
        &self,
        terms: &[Term],
        cancel: Option<&CancellationToken>,
    ) -> CoreResult<Vec<TermId>> {
        if terms.len() > MAX_BATCH {
            return Err(CoreError::BatchTooLarge(terms.len(), MAX_BATCH));
        }
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let shard_count = self.shards.len();
        let mut groups: Vec<Vec<usize>> = vec![Vec::new(); shard_count];
        for (i, term) in terms.iter().enumerate() {
            groups[(shard_hash(term) as usize) % shard_count].push(i);
        }

        let mut results: Vec<Option<TermId>> = vec![None; terms.len()];
        let per_shard: Vec<CoreResult<Vec<(usize, TermId)>>> = self
            .shards
            .par_iter()
            .zip(groups.par_iter())
            .map(|(shard, indices)| {
                if let Some(c) = cancel {
                    if c.is_cancelled() {
                        return Err(CoreError::Timeout);
                    }
                }
                if indices.is_empty() {
                    return Ok(Vec::new());
                }
                let shard_terms: Vec<Term> = indices.iter().map(|&i| terms[i].clone()).collect();
                let ids = shard.get_or_create_ids(&shard_terms)?;
                Ok(indices.iter().copied().zip(ids).collect())
            })
            .collect();

        for group in per_shard {
            for (idx, id) in group? {
                results[idx] = Some(id);
            }
        }

        Ok(results.into_iter().map(|r| r.expect("every index assigned by its shard")).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::tuning::LsmPreset;

    fn setup(shard_count: usize) -> (tempfile::TempDir, ShardedDictionary) {
        let dir = tempfile::tempdir().unwrap();
        let sharded =
            ShardedDictionary::open(dir.path(), &LsmPreset::Default.config(), Some(shard_count))
                .unwrap();
        (dir, sharded)
    }

    #[test]
    fn routes_same_term_to_same_shard_consistently() {
        let (_dir, sharded) = setup(4);
        let t = Term::iri("http://example.org/x");
        let id1 = sharded.get_or_create_id(&t).unwrap();
        let id2 = sharded.get_or_create_id(&t).unwrap();
        assert_eq!(id1, id2);
    }

    #[test]
    fn batch_resolves_all_terms_across_shards() {
        let (_dir, sharded) = setup(3);
        let terms: Vec<Term> = (0..50).map(|i| Term::iri(format!("http://example.org/{i}"))).collect();
        let ids = sharded.get_or_create_ids(&terms, None).unwrap();
        assert_eq!(ids.len(), 50);
        let unique: std::collections::HashSet<_> = ids.iter().map(|id| id.to_raw()).collect();
        assert_eq!(unique.len(), 50);
    }

    #[test]
    fn oversized_batch_is_rejected() {
        let (_dir, sharded) = setup(1);
        let terms: Vec<Term> = Vec::new();
        assert!(sharded.get_or_create_ids(&terms, None).is_ok());
        let oversized = vec![Term::iri("x"); MAX_BATCH + 1];
        assert!(matches!(
            sharded.get_or_create_ids(&oversized, None),
            Err(CoreError::BatchTooLarge(_, _))
        ));
    }

    #[test]
    fn cancelled_token_stops_batch() {
        let (_dir, sharded) = setup(2);
        let token = CancellationToken::new();
        token.cancel();
        let terms = vec![Term::iri("http://example.org/a")];
        assert!(matches!(sharded.get_or_create_ids(&terms, Some(&token)), Err(CoreError::Timeout)));
    }
}
