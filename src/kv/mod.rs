//! KV Backend Adapter (C1): a typed, column-family-aware view over a
//! RocksDB-backed LSM store.
//!
//! This module is the only place `rocksdb` types are allowed to leak into;
//! everything above it (dictionary, triple indexer, pattern matcher) talks
//! in terms of [`Cf`], `&[u8]` keys/values, and the request/response types
//! defined here.

pub mod tuning;

use crate::error::{CoreError, CoreResult};
use rocksdb::{
    BlockBasedOptions, ColumnFamilyDescriptor, DBCompressionType, Options, WriteBatch as RdbBatch,
    DB,
};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tuning::{Compression, LsmConfig};

/// The store's seven logical column families. Opening a directory
/// missing any of these creates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cf {
    Default,
    Id2Str,
    Str2Id,
    Spo,
    Pos,
    Osp,
    Derived,
}

impl Cf {
    pub const ALL: [Cf; 7] = [
        Cf::Default,
        Cf::Id2Str,
        Cf::Str2Id,
        Cf::Spo,
        Cf::Pos,
        Cf::Osp,
        Cf::Derived,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Cf::Default => "default",
            Cf::Id2Str => "id2str",
            Cf::Str2Id => "str2id",
            Cf::Spo => "spo",
            Cf::Pos => "pos",
            Cf::Osp => "osp",
            Cf::Derived => "derived",
        }
    }
}

/// A single write within an atomic [`KvStore::write_batch`].
pub enum WriteOp {
    Put(Cf, Vec<u8>, Vec<u8>),
    Delete(Cf, Vec<u8>),
}

/// Runtime-mutable LSM option keys. Any other key is rejected by
/// [`KvStore::set_options`].
const RUNTIME_MUTABLE_KEYS: &[&str] = &[
    "level0_file_num_compaction_trigger",
    "level0_slowdown_writes_trigger",
    "level0_stop_writes_trigger",
    "target_file_size_base",
    "max_bytes_for_level_base",
    "write_buffer_size",
    "max_write_buffer_number",
    "disable_auto_compactions",
];

fn to_rocksdb_compression(c: Compression) -> DBCompressionType {
    match c {
        Compression::None => DBCompressionType::None,
        Compression::Snappy => DBCompressionType::Snappy,
        Compression::Lz4 => DBCompressionType::Lz4,
        Compression::Lz4hc => DBCompressionType::Lz4hc,
        Compression::Zstd => DBCompressionType::Zstd,
    }
}

fn cf_options(tuning: &LsmConfig) -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(to_rocksdb_compression(tuning.compression.per_cf));
    if tuning.compression.per_cf == Compression::Zstd {
        opts.set_compression_options(-1, tuning.compression.per_cf_level, 0, 0);
    }

    let mut block_opts = BlockBasedOptions::default();
    block_opts.set_block_size(tuning.column_family.block_size_bytes as usize);
    block_opts.set_bloom_filter(f64::from(tuning.column_family.bloom_bits_per_key), false);
    block_opts.set_whole_key_filtering(tuning.column_family.whole_key_filtering);
    block_opts.set_pin_l0_filter_and_index_blocks_in_cache(
        tuning.column_family.pin_l0_index_and_filter,
    );
    block_opts.set_optimize_filters_for_hits(tuning.column_family.optimize_filters_for_hits);
    block_opts.set_format_version(tuning.column_family.format_version as i32);
    opts.set_block_based_table_factory(&block_opts);

    if let Some(len) = tuning.column_family.prefix_extractor_len {
        opts.set_prefix_extractor(rocksdb::SliceTransform::create_fixed_prefix(len as usize));
    }

    opts.set_level_zero_file_num_compaction_trigger(tuning.compaction.l0_compaction_trigger as i32);
    opts.set_level_zero_slowdown_writes_trigger(tuning.compaction.l0_slowdown_trigger as i32);
    opts.set_level_zero_stop_writes_trigger(tuning.compaction.l0_stop_trigger as i32);
    opts.set_target_file_size_base(tuning.compaction.target_file_size_base);
    opts.set_target_file_size_multiplier(tuning.compaction.target_file_size_multiplier as i32);
    opts.set_max_bytes_for_level_base(tuning.compaction.l1_base_bytes);
    opts.set_max_bytes_for_level_multiplier(f64::from(tuning.compaction.level_multiplier));
    opts.set_num_levels(tuning.compaction.level_count as i32);
    opts.set_max_background_jobs(
        (tuning.compaction.max_background_compactions + tuning.compaction.max_background_flushes)
            as i32,
    );
    if tuning.compaction.rate_limit_bytes_per_sec > 0 {
        opts.set_ratelimiter(
            tuning.compaction.rate_limit_bytes_per_sec as i64,
            100_000,
            tuning.compaction.fairness as i32,
        );
    }

    opts
}

/// A handle to the LSM store. Cheaply clonable (the underlying `DB` is
/// reference-counted by `rocksdb` itself); reads are lock-free and
/// concurrent, writes are serialised by the backend.
#[derive(Clone)]
pub struct KvStore {
    inner: Arc<Inner>,
}

struct Inner {
    db: DB,
    closed: AtomicBool,
}

impl KvStore {
    /// Open (creating if necessary) the store at `path`, with every CF
    /// tuned by `tuning`.
    pub fn open(path: impl AsRef<Path>, tuning: &LsmConfig) -> CoreResult<KvStore> {
        tuning::validate(tuning).map_err(CoreError::Validation)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let descriptors: Vec<ColumnFamilyDescriptor> = Cf::ALL
            .iter()
            .map(|cf| ColumnFamilyDescriptor::new(cf.name(), cf_options(tuning)))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), descriptors)?;
        tracing::info!(path = %path.as_ref().display(), "kv_store_opened");

        Ok(KvStore {
            inner: Arc::new(Inner { db, closed: AtomicBool::new(false) }),
        })
    }

    fn check_open(&self) -> CoreResult<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(CoreError::AlreadyClosed);
        }
        Ok(())
    }

    fn cf_handle(&self, cf: Cf) -> CoreResult<&rocksdb::ColumnFamily> {
        self.inner
            .db
            .cf_handle(cf.name())
            .ok_or_else(|| CoreError::InvalidColumnFamily(cf.name().to_string()))
    }

    /// Close the handle. Further operations return `already_closed`.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        tracing::info!("kv_store_closed");
    }

    pub fn get(&self, cf: Cf, key: &[u8]) -> CoreResult<Option<Vec<u8>>> {
        self.check_open()?;
        let handle = self.cf_handle(cf)?;
        Ok(self.inner.db.get_cf(handle, key)?)
    }

    pub fn exists(&self, cf: Cf, key: &[u8]) -> CoreResult<bool> {
        Ok(self.get(cf, key)?.is_some())
    }

    pub fn put(&self, cf: Cf, key: &[u8], value: &[u8]) -> CoreResult<()> {
        self.check_open()?;
        let handle = self.cf_handle(cf)?;
        self.inner.db.put_cf(handle, key, value)?;
        Ok(())
    }

    pub fn delete(&self, cf: Cf, key: &[u8]) -> CoreResult<()> {
        self.check_open()?;
        let handle = self.cf_handle(cf)?;
        self.inner.db.delete_cf(handle, key)?;
        Ok(())
    }

    /// Apply every op in `ops` atomically: either all are observable, or
    /// none are.
    pub fn write_batch(&self, ops: Vec<WriteOp>, sync: bool) -> CoreResult<()> {
        self.check_open()?;
        let mut batch = RdbBatch::default();
        for op in &ops {
            match op {
                WriteOp::Put(cf, k, v) => batch.put_cf(self.cf_handle(*cf)?, k, v),
                WriteOp::Delete(cf, k) => batch.delete_cf(self.cf_handle(*cf)?, k),
            }
        }
        let mut write_opts = rocksdb::WriteOptions::default();
        write_opts.set_sync(sync);
        self.inner.db.write_opt(batch, &write_opts)?;
        tracing::debug!(ops = ops.len(), sync, "kv_write_batch_committed");
        Ok(())
    }

    /// Iterate every `(key, value)` pair whose key starts with `prefix`, in
    /// ascending byte order, stopping at the first non-matching key. The
    /// underlying rocksdb iterator is released when this iterator is
    /// dropped (normal completion, early break, or error).
    pub fn prefix_iterator(&self, cf: Cf, prefix: Vec<u8>) -> CoreResult<PrefixIter<'_>> {
        self.check_open()?;
        let handle = self.cf_handle(cf)?;
        let mode = rocksdb::IteratorMode::From(&prefix, rocksdb::Direction::Forward);
        let iter = self.inner.db.iterator_cf(handle, mode);
        Ok(PrefixIter { iter, prefix, done: false })
    }

    /// Take a point-in-time read snapshot. Writes after this call never
    /// appear through the returned handle.
    pub fn snapshot(&self) -> KvSnapshot<'_> {
        KvSnapshot { snap: self.inner.db.snapshot(), store: self, released: false }
    }

    /// Force the WAL to disk. `sync` additionally calls `fsync`.
    pub fn flush_wal(&self, sync: bool) -> CoreResult<()> {
        self.check_open()?;
        self.inner.db.flush_wal(sync)?;
        tracing::info!(sync, "wal_flushed");
        Ok(())
    }

    /// Mutate runtime-tunable options. Rejects any key outside the
    /// allow list without applying any of the batch.
    pub fn set_options(&self, kv_pairs: &[(&str, &str)]) -> CoreResult<()> {
        self.check_open()?;
        for (k, _) in kv_pairs {
            if !RUNTIME_MUTABLE_KEYS.contains(k) {
                return Err(CoreError::RejectedOptionKey((*k).to_string()));
            }
        }
        for cf in Cf::ALL {
            let handle = self.cf_handle(cf)?;
            self.inner.db.set_options_cf(handle, kv_pairs)?;
        }
        tracing::info!(keys = kv_pairs.len(), "kv_runtime_options_set");
        Ok(())
    }

    /// Run a blocking backend call on a dedicated thread so it never blocks
    /// an async host's reactor. Used by callers that hold a `KvStore` from
    /// within a `tokio` task.
    pub async fn spawn_blocking<F, T>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&KvStore) -> CoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| CoreError::Io(format!("blocking task panicked: {e}")))?
    }
}

/// A prefix-bounded iterator over one column family. Released (native
/// resources dropped) automatically when this value goes out of scope.
pub struct PrefixIter<'a> {
    iter: rocksdb::DBIteratorWithThreadMode<'a, DB>,
    prefix: Vec<u8>,
    done: bool,
}

impl<'a> Iterator for PrefixIter<'a> {
    type Item = CoreResult<(Box<[u8]>, Box<[u8]>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.iter.next() {
            Some(Ok((k, v))) => {
                if k.starts_with(self.prefix.as_slice()) {
                    Some(Ok((k, v)))
                } else {
                    self.done = true;
                    None
                }
            }
            Some(Err(e)) => {
                self.done = true;
                Some(Err(CoreError::from(e)))
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}

/// A point-in-time read view. Reads through a released snapshot return
/// `already_released`.
pub struct KvSnapshot<'a> {
    snap: rocksdb::SnapshotWithThreadMode<'a, DB>,
    store: &'a KvStore,
    released: bool,
}

impl<'a> KvSnapshot<'a> {
    pub fn get(&self, cf: Cf, key: &[u8]) -> CoreResult<Option<Vec<u8>>> {
        if self.released {
            return Err(CoreError::AlreadyReleased);
        }
        let handle = self.store.cf_handle(cf)?;
        Ok(self.snap.get_cf(handle, key)?)
    }

    pub fn prefix_iterator(&self, cf: Cf, prefix: Vec<u8>) -> CoreResult<PrefixIter<'_>> {
        if self.released {
            return Err(CoreError::AlreadyReleased);
        }
        let handle = self.store.cf_handle(cf)?;
        let mode = rocksdb::IteratorMode::From(&prefix, rocksdb::Direction::Forward);
        let iter = self.snap.iterator_cf(handle, mode);
        Ok(PrefixIter { iter, prefix, done: false })
    }

    /// Explicitly release the snapshot early. Dropping it has the same
    /// effect; this exists for callers that want the release to be
    /// observable before the handle's lexical scope ends.
    pub fn release(mut self) {
        self.released = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tuning::LsmPreset;

    fn open_tmp() -> (tempfile::TempDir, KvStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::open(dir.path(), &LsmPreset::Default.config()).unwrap();
        (dir, store)
    }

    #[test]
    fn put_get_delete_round_trip() {
        let (_dir, store) = open_tmp();
        store.put(Cf::Str2Id, b"k1", b"v1").unwrap();
        assert_eq!(store.get(Cf::Str2Id, b"k1").unwrap(), Some(b"v1".to_vec()));
        store.delete(Cf::Str2Id, b"k1").unwrap();
        assert_eq!(store.get(Cf::Str2Id, b"k1").unwrap(), None);
    }

    #[test]
    fn write_batch_is_atomic() {
        let (_dir, store) = open_tmp();
        store
            .write_batch(
                vec![
                    WriteOp::Put(Cf::Spo, b"a".to_vec(), vec![]),
                    WriteOp::Put(Cf::Pos, b"b".to_vec(), vec![]),
                ],
                true,
            )
            .unwrap();
        assert!(store.exists(Cf::Spo, b"a").unwrap());
        assert!(store.exists(Cf::Pos, b"b").unwrap());
    }

    #[test]
    fn prefix_iterator_stops_at_boundary() {
        let (_dir, store) = open_tmp();
        store.put(Cf::Spo, b"ab1", b"").unwrap();
        store.put(Cf::Spo, b"ab2", b"").unwrap();
        store.put(Cf::Spo, b"ac1", b"").unwrap();
        let keys: Vec<_> = store
            .prefix_iterator(Cf::Spo, b"ab".to_vec())
            .unwrap()
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn snapshot_is_point_in_time() {
        let (_dir, store) = open_tmp();
        store.put(Cf::Spo, b"x", b"").unwrap();
        let snap = store.snapshot();
        store.put(Cf::Spo, b"y", b"").unwrap();
        assert!(snap.get(Cf::Spo, b"x").unwrap().is_some());
        assert!(snap.get(Cf::Spo, b"y").unwrap().is_none());
        assert!(store.get(Cf::Spo, b"y").unwrap().is_some());
    }

    #[test]
    fn set_options_rejects_unknown_keys() {
        let (_dir, store) = open_tmp();
        let err = store.set_options(&[("not_a_real_option", "1")]).unwrap_err();
        assert!(matches!(err, CoreError::RejectedOptionKey(_)));
    }

    #[test]
    fn set_options_accepts_allow_listed_keys() {
        let (_dir, store) = open_tmp();
        store
            .set_options(&[("write_buffer_size", "33554432")])
            .unwrap();
    }

    #[test]
    fn closed_store_rejects_operations() {
        let (_dir, store) = open_tmp();
        store.close();
        assert!(matches!(store.get(Cf::Spo, b"x"), Err(CoreError::AlreadyClosed)));
    }
}
