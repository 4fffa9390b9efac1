//! Triple Indexer (C7): maintains the three permutation indexes (SPO, POS,
//! OSP) as a single atomic unit per triple.

use crate::error::CoreResult;
use crate::kv::{Cf, KvStore, WriteOp};
use crate::term::TermId;

/// A triple of `TermId`s: subject, predicate, object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Triple {
    pub s: TermId,
    pub p: TermId,
    pub o: TermId,
}

impl Triple {
    pub fn new(s: TermId, p: TermId, o: TermId) -> Triple {
        Triple { s, p, o }
    }

    fn key_24(a: TermId, b: TermId, c: TermId) -> Vec<u8> {
        let mut key = Vec::with_capacity(24);
        key.extend_from_slice(&a.to_be_bytes());
        key.extend_from_slice(&b.to_be_bytes());
        key.extend_from_slice(&c.to_be_bytes());
        key
    }

    fn spo_key(&self) -> Vec<u8> {
        Self::key_24(self.s, self.p, self.o)
    }

    fn pos_key(&self) -> Vec<u8> {
        Self::key_24(self.p, self.o, self.s)
    }

    fn osp_key(&self) -> Vec<u8> {
        Self::key_24(self.o, self.s, self.p)
    }

    /// Decode a 24-byte SPO-ordered key back into a `Triple`.
    pub fn from_spo_key(bytes: &[u8]) -> Option<Triple> {
        if bytes.len() != 24 {
            return None;
        }
        let s = TermId::from_be_bytes(bytes[0..8].try_into().ok()?)?;
        let p = TermId::from_be_bytes(bytes[8..16].try_into().ok()?)?;
        let o = TermId::from_be_bytes(bytes[16..24].try_into().ok()?)?;
        Some(Triple { s, p, o })
    }
}

/// Maintains SPO/POS/OSP as one consistent unit.
pub struct TripleIndexer {
    kv: KvStore,
}

impl TripleIndexer {
    pub fn new(kv: KvStore) -> TripleIndexer {
        TripleIndexer { kv }
    }

    pub fn exists(&self, t: &Triple) -> CoreResult<bool> {
        self.kv.exists(Cf::Spo, &t.spo_key())
    }

    /// Insert one triple into all three indexes atomically. A no-op (but
    /// still successful) if the triple is already present.
    pub fn insert(&self, t: &Triple) -> CoreResult<()> {
        self.insert_many(std::slice::from_ref(t))
    }

    pub fn delete(&self, t: &Triple) -> CoreResult<()> {
        self.delete_many(std::slice::from_ref(t))
    }

    /// Insert every triple in `triples` in a single atomic batch across all
    /// three indexes.
    pub fn insert_many(&self, triples: &[Triple]) -> CoreResult<()> {
        let mut ops = Vec::with_capacity(triples.len() * 3);
        for t in triples {
            ops.push(WriteOp::Put(Cf::Spo, t.spo_key(), Vec::new()));
            ops.push(WriteOp::Put(Cf::Pos, t.pos_key(), Vec::new()));
            ops.push(WriteOp::Put(Cf::Osp, t.osp_key(), Vec::new()));
        }
        self.kv.write_batch(ops, false)?;
        tracing::debug!(count = triples.len(), "triples_inserted");
        Ok(())
    }

    pub fn delete_many(&self, triples: &[Triple]) -> CoreResult<()> {
        let mut ops = Vec::with_capacity(triples.len() * 3);
        for t in triples {
            ops.push(WriteOp::Delete(Cf::Spo, t.spo_key()));
            ops.push(WriteOp::Delete(Cf::Pos, t.pos_key()));
            ops.push(WriteOp::Delete(Cf::Osp, t.osp_key()));
        }
        self.kv.write_batch(ops, false)?;
        tracing::debug!(count = triples.len(), "triples_deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::tuning::LsmPreset;
    use crate::term::TermKind;

    fn setup() -> (tempfile::TempDir, TripleIndexer) {
        let dir = tempfile::tempdir().unwrap();
        let kv = KvStore::open(dir.path(), &LsmPreset::Default.config()).unwrap();
        (dir, TripleIndexer::new(kv))
    }

    fn tid(kind: TermKind, v: u64) -> TermId {
        TermId::from_parts(kind, v)
    }

    #[test]
    fn insert_then_exists_then_delete() {
        let (_dir, idx) = setup();
        let t = Triple::new(tid(TermKind::Uri, 1), tid(TermKind::Uri, 2), tid(TermKind::Uri, 3));
        assert!(!idx.exists(&t).unwrap());
        idx.insert(&t).unwrap();
        assert!(idx.exists(&t).unwrap());
        idx.delete(&t).unwrap();
        assert!(!idx.exists(&t).unwrap());
    }

    #[test]
    fn insert_is_reflected_in_all_three_permutations() {
        let (_dir, idx) = setup();
        let t = Triple::new(tid(TermKind::Uri, 10), tid(TermKind::Uri, 20), tid(TermKind::Uri, 30));
        idx.insert(&t).unwrap();
        assert!(idx.kv.exists(Cf::Spo, &t.spo_key()).unwrap());
        assert!(idx.kv.exists(Cf::Pos, &t.pos_key()).unwrap());
        assert!(idx.kv.exists(Cf::Osp, &t.osp_key()).unwrap());
    }

    #[test]
    fn from_spo_key_round_trips() {
        let t = Triple::new(tid(TermKind::Uri, 1), tid(TermKind::BlankNode, 2), tid(TermKind::Literal, 3));
        let decoded = Triple::from_spo_key(&t.spo_key()).unwrap();
        assert_eq!(t, decoded);
    }

    #[test]
    fn insert_many_is_atomic_and_idempotent() {
        let (_dir, idx) = setup();
        let triples = vec![
            Triple::new(tid(TermKind::Uri, 1), tid(TermKind::Uri, 2), tid(TermKind::Uri, 3)),
            Triple::new(tid(TermKind::Uri, 4), tid(TermKind::Uri, 5), tid(TermKind::Uri, 6)),
        ];
        idx.insert_many(&triples).unwrap();
        idx.insert_many(&triples).unwrap();
        assert!(idx.exists(&triples[0]).unwrap());
        assert!(idx.exists(&triples[1]).unwrap());
    }
}
