//! Dictionary Manager (C5): one shard's worth of `Term <-> TermId` mapping
//! over `str2id`/`id2str`, with a lock-free read cache and intra-batch
//! deduplication.

use crate::codec;
use crate::error::CoreResult;
use crate::kv::{Cf, KvStore, WriteOp};
use crate::sequence::SharedSequenceAllocator;
use crate::term::{Term, TermId};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

/// Manages one shard of the dictionary: allocates `TermId`s for terms that
/// are new to this shard, and answers lookups in both directions.
pub struct DictionaryManager {
    kv: KvStore,
    sequence: SharedSequenceAllocator,
    cache: DashMap<Vec<u8>, TermId>,
    write_lock: Mutex<()>,
}

impl DictionaryManager {
    pub fn new(kv: KvStore, sequence: SharedSequenceAllocator) -> DictionaryManager {
        DictionaryManager { kv, sequence, cache: DashMap::new(), write_lock: Mutex::new(()) }
    }

    /// Look up the `TermId` for `term` without allocating one if absent.
    pub fn lookup_id(&self, term: &Term) -> CoreResult<Option<TermId>> {
        if let Some(id) = codec::try_inline_encode(term) {
            return Ok(Some(id));
        }
        let key = codec::encode(term);
        if let Some(id) = self.cache.get(&key) {
            return Ok(Some(*id));
        }
        let found = match self.kv.get(Cf::Str2Id, &key)? {
            Some(bytes) => {
                let raw = u64::from_be_bytes(bytes.as_slice().try_into().map_err(|_| {
                    crate::error::CoreError::InvalidEncoding("str2id value not 8 bytes".into())
                })?);
                TermId::from_raw(raw)
            }
            None => None,
        };
        if let Some(id) = found {
            self.cache.insert(key, id);
        }
        Ok(found)
    }

    /// Resolve `id` back to its `Term`. Only valid for dictionary-allocated
    /// ids; inline-encoded ids are decoded directly by [`crate::codec`]
    /// instead and never reach `id2str`.
    pub fn lookup_term(&self, id: TermId) -> CoreResult<Option<Term>> {
        match self.kv.get(Cf::Id2Str, &id.to_be_bytes())? {
            Some(bytes) => Ok(Some(codec::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Look up `term`'s id, allocating a fresh one under the write lock if
    /// it is not yet known to this shard.
    pub fn get_or_create_id(&self, term: &Term) -> CoreResult<TermId> {
        Ok(self.get_or_create_ids(std::slice::from_ref(term))?[0])
    }

    /// Batch form of [`Self::get_or_create_id`]: terms repeated within
    /// `terms` are deduplicated before any allocation, so each distinct
    /// term is allocated at most once even within the same call.
    pub fn get_or_create_ids(&self, terms: &[Term]) -> CoreResult<Vec<TermId>> {
        let keys: Vec<Vec<u8>> = terms.iter().map(codec::encode).collect();
        let mut results: Vec<Option<TermId>> = vec![None; terms.len()];

        for (i, term) in terms.iter().enumerate() {
            if let Some(id) = codec::try_inline_encode(term) {
                results[i] = Some(id);
            }
        }

        for (i, key) in keys.iter().enumerate() {
            if results[i].is_some() {
                continue;
            }
            if let Some(id) = self.cache.get(key) {
                results[i] = Some(*id);
            }
        }

        let _guard = self.write_lock.lock();

        // Preserve input order among distinct missing terms, deduplicating
        // with a side `HashSet` rather than keying a `HashMap` directly on
        // the term, whose iteration order is unspecified.
        let mut missing_order: Vec<(Vec<u8>, usize)> = Vec::new();
        let mut seen_missing: HashSet<Vec<u8>> = HashSet::new();
        for (i, key) in keys.iter().enumerate() {
            if results[i].is_some() {
                continue;
            }
            if let Some(id) = self.cache.get(key) {
                results[i] = Some(*id);
                continue;
            }
            if let Some(bytes) = self.kv.get(Cf::Str2Id, key)? {
                let raw = u64::from_be_bytes(bytes.as_slice().try_into().map_err(|_| {
                    crate::error::CoreError::InvalidEncoding("str2id value not 8 bytes".into())
                })?);
                if let Some(id) = TermId::from_raw(raw) {
                    self.cache.insert(key.clone(), id);
                    results[i] = Some(id);
                    continue;
                }
            }
            if seen_missing.insert(key.clone()) {
                missing_order.push((key.clone(), i));
            }
        }

        if !missing_order.is_empty() {
            // Group missing terms by dictionary kind, preserving each
            // kind's relative input order, so one `allocate_range` call per
            // kind hands out ascending, input-order-stable ids.
            let mut by_kind: HashMap<crate::term::TermKind, Vec<usize>> = HashMap::new();
            for (missing_idx, (_, first_idx)) in missing_order.iter().enumerate() {
                let kind = terms[*first_idx].dictionary_kind();
                by_kind.entry(kind).or_default().push(missing_idx);
            }

            let mut assigned: Vec<Option<TermId>> = vec![None; missing_order.len()];
            for (kind, missing_indices) in &by_kind {
                let range = self.sequence.allocate_range(*kind, missing_indices.len() as u64)?;
                for (seq, &missing_idx) in range.zip(missing_indices.iter()) {
                    assigned[missing_idx] = Some(TermId::from_parts(*kind, seq));
                }
            }

            let mut ops = Vec::with_capacity(missing_order.len() * 2);
            for (missing_idx, (key, _)) in missing_order.iter().enumerate() {
                let id = assigned[missing_idx].expect("every missing term assigned an id by its kind's range");
                ops.push(WriteOp::Put(Cf::Str2Id, key.clone(), id.to_raw().to_be_bytes().to_vec()));
                ops.push(WriteOp::Put(Cf::Id2Str, id.to_be_bytes().to_vec(), key.clone()));
                self.cache.insert(key.clone(), id);
            }
            self.kv.write_batch(ops, false)?;

            for (i, key) in keys.iter().enumerate() {
                if results[i].is_none() {
                    if let Some(id) = self.cache.get(key) {
                        results[i] = Some(*id);
                    }
                }
            }
            tracing::debug!(allocated = missing_order.len(), batch_size = terms.len(), "dictionary_batch_allocated");
        }

        Ok(results.into_iter().map(|r| r.expect("every term resolved")).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::tuning::LsmPreset;
    use crate::sequence::SequenceAllocator;
    use std::sync::Arc;

    fn setup() -> (tempfile::TempDir, DictionaryManager) {
        let dir = tempfile::tempdir().unwrap();
        let kv = KvStore::open(dir.path().join("db"), &LsmPreset::Default.config()).unwrap();
        let seq = Arc::new(SequenceAllocator::open(dir.path().join("counters.bin")).unwrap());
        (dir, DictionaryManager::new(kv, seq))
    }

    #[test]
    fn allocates_fresh_id_and_resolves_both_ways() {
        let (_dir, dict) = setup();
        let t = Term::iri("http://example.org/a");
        let id = dict.get_or_create_id(&t).unwrap();
        assert_eq!(dict.lookup_id(&t).unwrap(), Some(id));
        assert_eq!(dict.lookup_term(id).unwrap(), Some(t));
    }

    #[test]
    fn repeated_lookup_returns_same_id() {
        let (_dir, dict) = setup();
        let t = Term::iri("http://example.org/a");
        let id1 = dict.get_or_create_id(&t).unwrap();
        let id2 = dict.get_or_create_id(&t).unwrap();
        assert_eq!(id1, id2);
    }

    #[test]
    fn batch_with_internal_duplicates_allocates_once() {
        let (_dir, dict) = setup();
        let t = Term::iri("http://example.org/dup");
        let ids = dict
            .get_or_create_ids(&[t.clone(), t.clone(), t.clone()])
            .unwrap();
        assert_eq!(ids[0], ids[1]);
        assert_eq!(ids[1], ids[2]);
    }

    #[test]
    fn unknown_term_lookup_is_none() {
        let (_dir, dict) = setup();
        let t = Term::iri("http://example.org/missing");
        assert_eq!(dict.lookup_id(&t).unwrap(), None);
    }

    #[test]
    fn inline_encodable_literal_never_touches_str2id() {
        let (_dir, dict) = setup();
        let t = Term::Literal(crate::term::Literal::typed("7", crate::codec::XSD_INTEGER));
        let id = dict.get_or_create_id(&t).unwrap();
        assert!(id.is_inline_encoded());
        assert!(dict.kv.get(Cf::Str2Id, &codec::encode(&t)).unwrap().is_none());
    }
}
