//! Pattern Matcher (C8): selects the cheapest of the three permutation
//! indexes for a triple pattern and streams matches out of it.

use crate::error::CoreResult;
use crate::kv::{Cf, KvStore};
use crate::triple_index::Triple;
use crate::term::TermId;

/// A triple pattern: `None` means "any value" in that position.
#[derive(Debug, Clone, Copy, Default)]
pub struct TriplePattern {
    pub s: Option<TermId>,
    pub p: Option<TermId>,
    pub o: Option<TermId>,
}

impl TriplePattern {
    pub fn new(s: Option<TermId>, p: Option<TermId>, o: Option<TermId>) -> TriplePattern {
        TriplePattern { s, p, o }
    }

    fn bound_mask(&self) -> (bool, bool, bool) {
        (self.s.is_some(), self.p.is_some(), self.o.is_some())
    }
}

/// Which index a pattern should scan, and how many leading bytes of its
/// key are a fixed prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexChoice {
    pub cf: Cf,
    pub prefix_len: usize,
}

/// Choose the index with the longest fixed prefix for `pattern`, breaking
/// ties SPO > POS > OSP.
pub fn select_index(pattern: &TriplePattern) -> IndexChoice {
    match pattern.bound_mask() {
        (true, true, true) => IndexChoice { cf: Cf::Spo, prefix_len: 24 },
        (true, true, false) => IndexChoice { cf: Cf::Spo, prefix_len: 16 },
        (false, true, true) => IndexChoice { cf: Cf::Pos, prefix_len: 16 },
        (true, false, true) => IndexChoice { cf: Cf::Osp, prefix_len: 16 },
        (true, false, false) => IndexChoice { cf: Cf::Spo, prefix_len: 8 },
        (false, true, false) => IndexChoice { cf: Cf::Pos, prefix_len: 8 },
        (false, false, true) => IndexChoice { cf: Cf::Osp, prefix_len: 8 },
        (false, false, false) => IndexChoice { cf: Cf::Spo, prefix_len: 0 },
    }
}

fn prefix_bytes(choice: IndexChoice, pattern: &TriplePattern) -> Vec<u8> {
    let ordered: [Option<TermId>; 3] = match choice.cf {
        Cf::Spo => [pattern.s, pattern.p, pattern.o],
        Cf::Pos => [pattern.p, pattern.o, pattern.s],
        Cf::Osp => [pattern.o, pattern.s, pattern.p],
        _ => unreachable!("pattern matching only selects among SPO/POS/OSP"),
    };
    let mut bytes = Vec::with_capacity(choice.prefix_len);
    for term in ordered.iter().flatten() {
        if bytes.len() >= choice.prefix_len {
            break;
        }
        bytes.extend_from_slice(&term.to_be_bytes());
    }
    bytes.truncate(choice.prefix_len);
    bytes
}

fn key_to_spo(cf: Cf, bytes: &[u8]) -> Option<Triple> {
    if bytes.len() != 24 {
        return None;
    }
    let a = TermId::from_be_bytes(bytes[0..8].try_into().ok()?)?;
    let b = TermId::from_be_bytes(bytes[8..16].try_into().ok()?)?;
    let c = TermId::from_be_bytes(bytes[16..24].try_into().ok()?)?;
    Some(match cf {
        Cf::Spo => Triple { s: a, p: b, o: c },
        Cf::Pos => Triple { p: a, o: b, s: c },
        Cf::Osp => Triple { o: a, s: b, p: c },
        _ => return None,
    })
}

/// Stream every triple matching `pattern`.
pub struct PatternMatcher<'a> {
    kv: &'a KvStore,
}

impl<'a> PatternMatcher<'a> {
    pub fn new(kv: &'a KvStore) -> PatternMatcher<'a> {
        PatternMatcher { kv }
    }

    /// Run `pattern` against the chosen index, applying any remaining
    /// (non-prefix) bound positions as a residual filter over the decoded
    /// triple.
    pub fn scan(&self, pattern: TriplePattern) -> CoreResult<Vec<Triple>> {
        let choice = select_index(&pattern);
        let prefix = prefix_bytes(choice, &pattern);
        let iter = self.kv.prefix_iterator(choice.cf, prefix)?;
        let mut out = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if let Some(t) = key_to_spo(choice.cf, &key) {
                if matches(&t, &pattern) {
                    out.push(t);
                }
            }
        }
        tracing::debug!(cf = ?choice.cf, matched = out.len(), "pattern_scan_completed");
        Ok(out)
    }
}

fn matches(t: &Triple, pattern: &TriplePattern) -> bool {
    pattern.s.map_or(true, |s| s == t.s)
        && pattern.p.map_or(true, |p| p == t.p)
        && pattern.o.map_or(true, |o| o == t.o)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::tuning::LsmPreset;
    use crate::triple_index::TripleIndexer;
    use crate::term::TermKind;

    fn tid(v: u64) -> TermId {
        TermId::from_parts(TermKind::Uri, v)
    }

    #[test]
    fn selects_spo_when_subject_and_predicate_bound() {
        let pattern = TriplePattern::new(Some(tid(1)), Some(tid(2)), None);
        assert_eq!(select_index(&pattern), IndexChoice { cf: Cf::Spo, prefix_len: 16 });
    }

    #[test]
    fn selects_pos_when_only_predicate_bound() {
        let pattern = TriplePattern::new(None, Some(tid(2)), None);
        assert_eq!(select_index(&pattern), IndexChoice { cf: Cf::Pos, prefix_len: 8 });
    }

    #[test]
    fn selects_osp_when_object_and_subject_bound() {
        let pattern = TriplePattern::new(Some(tid(1)), None, Some(tid(3)));
        assert_eq!(select_index(&pattern), IndexChoice { cf: Cf::Osp, prefix_len: 16 });
    }

    #[test]
    fn unbound_pattern_ties_break_to_spo() {
        let pattern = TriplePattern::default();
        assert_eq!(select_index(&pattern), IndexChoice { cf: Cf::Spo, prefix_len: 0 });
    }

    #[test]
    fn scan_returns_matching_triples_only() {
        let dir = tempfile::tempdir().unwrap();
        let kv = KvStore::open(dir.path(), &LsmPreset::Default.config()).unwrap();
        let indexer = TripleIndexer::new(kv.clone());
        indexer.insert(&Triple::new(tid(1), tid(2), tid(3))).unwrap();
        indexer.insert(&Triple::new(tid(1), tid(2), tid(4))).unwrap();
        indexer.insert(&Triple::new(tid(1), tid(9), tid(4))).unwrap();

        let matcher = PatternMatcher::new(&kv);
        let results = matcher
            .scan(TriplePattern::new(Some(tid(1)), Some(tid(2)), None))
            .unwrap();
        assert_eq!(results.len(), 2);
    }
}
