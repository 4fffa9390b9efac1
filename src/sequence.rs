//! Sequence Allocator (C4): per-type monotonically increasing counters for
//! dictionary-allocated `TermId`s, with periodic durable checkpoints and
//! crash-safe recovery.

use crate::error::{CoreError, CoreResult};
use crate::term::{TermKind, MAX_SEQ, SAFETY_MARGIN};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Persist a checkpoint every this many allocations, per counter.
const FLUSH_INTERVAL: u64 = 1000;

/// On-disk envelope for a counter checkpoint. `version` allows the format
/// to evolve without breaking recovery of older stores.
#[derive(Debug, Serialize, Deserialize)]
struct CounterCheckpoint {
    version: u32,
    uri: u64,
    blank_node: u64,
    literal: u64,
    written_at: String,
}

struct Counter {
    value: AtomicU64,
    since_flush: AtomicU64,
}

impl Counter {
    fn new(start: u64) -> Counter {
        Counter { value: AtomicU64::new(start), since_flush: AtomicU64::new(0) }
    }
}

/// Allocates fresh per-type sequence numbers for the dictionary. One
/// `SequenceAllocator` backs all three dictionary-allocated `TermKind`s.
pub struct SequenceAllocator {
    uri: Counter,
    blank_node: Counter,
    literal: Counter,
    checkpoint_path: PathBuf,
    persist_lock: Mutex<()>,
}

impl SequenceAllocator {
    /// Recover counters from `checkpoint_path` if present (applying
    /// [`SAFETY_MARGIN`] to guard against a crash between persisting and the
    /// writes it covered becoming durable), otherwise start all counters at
    /// zero.
    pub fn open(checkpoint_path: impl Into<PathBuf>) -> CoreResult<SequenceAllocator> {
        let checkpoint_path = checkpoint_path.into();
        let (uri, blank_node, literal) = match std::fs::read(&checkpoint_path) {
            Ok(bytes) => {
                let cp: CounterCheckpoint = bincode::deserialize(&bytes)
                    .map_err(|e| CoreError::InvalidEncoding(e.to_string()))?;
                (
                    cp.uri.saturating_add(SAFETY_MARGIN),
                    cp.blank_node.saturating_add(SAFETY_MARGIN),
                    cp.literal.saturating_add(SAFETY_MARGIN),
                )
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (0, 0, 0),
            Err(e) => return Err(CoreError::Io(e.to_string())),
        };

        tracing::info!(uri, blank_node, literal, "sequence_allocator_recovered");

        Ok(SequenceAllocator {
            uri: Counter::new(uri),
            blank_node: Counter::new(blank_node),
            literal: Counter::new(literal),
            checkpoint_path,
            persist_lock: Mutex::new(()),
        })
    }

    fn counter(&self, kind: TermKind) -> &Counter {
        match kind {
            TermKind::Uri => &self.uri,
            TermKind::BlankNode => &self.blank_node,
            TermKind::Literal => &self.literal,
            _ => panic!("sequence allocator only serves dictionary-allocated term kinds"),
        }
    }

    /// Allocate the next sequence number for `kind`.
    pub fn next_id(&self, kind: TermKind) -> CoreResult<u64> {
        let ids = self.allocate_range(kind, 1)?;
        Ok(ids.start)
    }

    /// Allocate a contiguous range of `count` sequence numbers for `kind`,
    /// returning `start..start+count` where `start` is 1 for the very first
    /// id ever allocated (id 0 is never issued). Flushes a checkpoint
    /// whenever cumulative allocations since the last flush reach
    /// [`FLUSH_INTERVAL`].
    pub fn allocate_range(
        &self,
        kind: TermKind,
        count: u64,
    ) -> CoreResult<std::ops::Range<u64>> {
        if count == 0 {
            let current = self.counter(kind).value.load(Ordering::Relaxed);
            return Ok(current + 1..current + 1);
        }
        let counter = self.counter(kind);
        let start = counter.value.fetch_add(count, Ordering::Relaxed);
        let end = start + count;
        if end > MAX_SEQ {
            counter.value.fetch_sub(count, Ordering::Relaxed);
            return Err(CoreError::SequenceOverflow(kind));
        }

        let since = counter.since_flush.fetch_add(count, Ordering::Relaxed) + count;
        if since >= FLUSH_INTERVAL {
            counter.since_flush.store(0, Ordering::Relaxed);
            self.flush()?;
        }

        Ok(start + 1..end + 1)
    }

    /// The next value that would be returned by `next_id`, without
    /// allocating it.
    pub fn current(&self, kind: TermKind) -> u64 {
        self.counter(kind).value.load(Ordering::Relaxed)
    }

    /// Persist all three counters to `checkpoint_path`. Safe to call
    /// concurrently with allocation; serialised internally.
    pub fn flush(&self) -> CoreResult<()> {
        let _guard = self.persist_lock.lock();
        let cp = CounterCheckpoint {
            version: 1,
            uri: self.uri.value.load(Ordering::Relaxed),
            blank_node: self.blank_node.value.load(Ordering::Relaxed),
            literal: self.literal.value.load(Ordering::Relaxed),
            written_at: Utc::now().to_rfc3339(),
        };
        let bytes = bincode::serialize(&cp).map_err(|e| CoreError::Io(e.to_string()))?;
        let tmp_path = self.checkpoint_path.with_extension("tmp");
        std::fs::write(&tmp_path, &bytes).map_err(|e| CoreError::Io(e.to_string()))?;
        std::fs::rename(&tmp_path, &self.checkpoint_path)
            .map_err(|e| CoreError::Io(e.to_string()))?;
        tracing::debug!(
            uri = cp.uri,
            blank_node = cp.blank_node,
            literal = cp.literal,
            "sequence_checkpoint_flushed"
        );
        Ok(())
    }

    /// Export the three raw counter values, e.g. for a backup tool.
    pub fn export(&self) -> (u64, u64, u64) {
        (
            self.uri.value.load(Ordering::Relaxed),
            self.blank_node.value.load(Ordering::Relaxed),
            self.literal.value.load(Ordering::Relaxed),
        )
    }

    /// Overwrite all three counters, e.g. when restoring a backup. Callers
    /// are responsible for ensuring no concurrent allocation is in flight.
    pub fn import(&self, uri: u64, blank_node: u64, literal: u64) {
        self.uri.value.store(uri, Ordering::Relaxed);
        self.blank_node.value.store(blank_node, Ordering::Relaxed);
        self.literal.value.store(literal, Ordering::Relaxed);
    }
}

/// A shareable handle, since dictionary shards and the sequence allocator
/// are both accessed from many threads.
pub type SharedSequenceAllocator = Arc<SequenceAllocator>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_allocator_starts_at_one() {
        let dir = tempfile::tempdir().unwrap();
        let alloc = SequenceAllocator::open(dir.path().join("counters.bin")).unwrap();
        assert_eq!(alloc.next_id(TermKind::Uri).unwrap(), 1);
        assert_eq!(alloc.next_id(TermKind::Uri).unwrap(), 2);
    }

    #[test]
    fn counters_are_independent_per_kind() {
        let dir = tempfile::tempdir().unwrap();
        let alloc = SequenceAllocator::open(dir.path().join("counters.bin")).unwrap();
        alloc.next_id(TermKind::Uri).unwrap();
        alloc.next_id(TermKind::Uri).unwrap();
        assert_eq!(alloc.next_id(TermKind::BlankNode).unwrap(), 1);
    }

    #[test]
    fn allocate_range_is_contiguous() {
        let dir = tempfile::tempdir().unwrap();
        let alloc = SequenceAllocator::open(dir.path().join("counters.bin")).unwrap();
        let r = alloc.allocate_range(TermKind::Literal, 10).unwrap();
        assert_eq!(r, 1..11);
        let r2 = alloc.allocate_range(TermKind::Literal, 5).unwrap();
        assert_eq!(r2, 11..16);
    }

    #[test]
    fn recovery_applies_safety_margin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counters.bin");
        {
            let alloc = SequenceAllocator::open(&path).unwrap();
            alloc.allocate_range(TermKind::Uri, 42).unwrap();
            alloc.flush().unwrap();
        }
        let alloc2 = SequenceAllocator::open(&path).unwrap();
        assert_eq!(alloc2.current(TermKind::Uri), 42 + SAFETY_MARGIN);
    }

    #[test]
    fn overflow_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let alloc = SequenceAllocator::open(dir.path().join("counters.bin")).unwrap();
        alloc.import(MAX_SEQ - 1, 0, 0);
        assert!(matches!(
            alloc.allocate_range(TermKind::Uri, 5),
            Err(CoreError::SequenceOverflow(TermKind::Uri))
        ));
        assert_eq!(alloc.current(TermKind::Uri), MAX_SEQ - 1, "a rejected allocation must not burn sequence values");
    }

    #[test]
    fn periodic_flush_persists_without_explicit_call() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counters.bin");
        {
            let alloc = SequenceAllocator::open(&path).unwrap();
            alloc.allocate_range(TermKind::Uri, FLUSH_INTERVAL).unwrap();
        }
        assert!(path.exists());
    }
}
