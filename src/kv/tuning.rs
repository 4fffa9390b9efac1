//! LSM tuning configuration (C2): pure data describing how the backend's
//! column families should be compacted, filtered, and compressed. Nothing in
//! this module touches a live backend; [`crate::kv`] is what turns a
//! [`LsmConfig`] into `rocksdb::Options`.

use serde::{Deserialize, Serialize};

/// Compaction style, mirroring RocksDB's own three styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompactionStyle {
    Level,
    Universal,
    Fifo,
}

/// Block compression algorithm for one column family or LSM level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    None,
    Snappy,
    Lz4,
    Lz4hc,
    Zstd,
}

/// Compaction-wide knobs: triggers, rate limiting, parallelism, level sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactionProfile {
    pub style: CompactionStyle,
    pub l1_base_bytes: u64,
    pub level_multiplier: u32,
    pub level_count: u32,
    pub l0_compaction_trigger: u32,
    pub l0_slowdown_trigger: u32,
    pub l0_stop_trigger: u32,
    /// Bytes/sec; `0` means unlimited.
    pub rate_limit_bytes_per_sec: u64,
    pub fairness: u32,
    pub max_background_compactions: u32,
    pub max_background_flushes: u32,
    pub target_file_size_base: u64,
    pub target_file_size_multiplier: u32,
}

/// Per-column-family knobs: bloom filter, prefix extractor, block layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnFamilyProfile {
    /// Bloom filter bits per key, in `[1, 24]`.
    pub bloom_bits_per_key: u32,
    /// Fixed prefix length in bytes, in `[1, 64]`; `None` disables the
    /// prefix extractor for this CF.
    pub prefix_extractor_len: Option<u32>,
    /// Block size in bytes, in `[1 KiB, 1 MiB]`.
    pub block_size_bytes: u32,
    pub whole_key_filtering: bool,
    pub pin_l0_index_and_filter: bool,
    pub optimize_filters_for_hits: bool,
    pub format_version: u32,
}

/// Per-level compression map: `levels[n]` is the algorithm for level `n`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionPlan {
    pub per_cf: Compression,
    pub per_cf_level: i32,
    pub levels: Vec<Compression>,
}

/// A fully populated LSM configuration for one store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LsmConfig {
    pub compaction: CompactionProfile,
    pub column_family: ColumnFamilyProfile,
    pub compression: CompressionPlan,
}

/// Named presets, each a complete, pre-validated [`LsmConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LsmPreset {
    Default,
    WriteHeavy,
    ReadHeavy,
    Balanced,
    LowLatency,
    BulkLoad,
}

impl LsmPreset {
    pub fn config(self) -> LsmConfig {
        match self {
            LsmPreset::Default => default_config(),
            LsmPreset::WriteHeavy => write_heavy_config(),
            LsmPreset::ReadHeavy => read_heavy_config(),
            LsmPreset::Balanced => balanced_config(),
            LsmPreset::LowLatency => low_latency_config(),
            LsmPreset::BulkLoad => bulk_load_config(),
        }
    }
}

fn default_config() -> LsmConfig {
    LsmConfig {
        compaction: CompactionProfile {
            style: CompactionStyle::Level,
            l1_base_bytes: 256 * 1024 * 1024,
            level_multiplier: 10,
            level_count: 7,
            l0_compaction_trigger: 4,
            l0_slowdown_trigger: 20,
            l0_stop_trigger: 36,
            rate_limit_bytes_per_sec: 0,
            fairness: 10,
            max_background_compactions: 4,
            max_background_flushes: 2,
            target_file_size_base: 64 * 1024 * 1024,
            target_file_size_multiplier: 1,
        },
        column_family: ColumnFamilyProfile {
            bloom_bits_per_key: 10,
            prefix_extractor_len: None,
            block_size_bytes: 4 * 1024,
            whole_key_filtering: true,
            pin_l0_index_and_filter: false,
            optimize_filters_for_hits: false,
            format_version: 5,
        },
        compression: CompressionPlan {
            per_cf: Compression::Lz4,
            per_cf_level: 0,
            levels: vec![
                Compression::None,
                Compression::Lz4,
                Compression::Lz4,
                Compression::Zstd,
                Compression::Zstd,
                Compression::Zstd,
                Compression::Zstd,
            ],
        },
    }
}

fn write_heavy_config() -> LsmConfig {
    let mut c = default_config();
    c.compaction.l0_compaction_trigger = 8;
    c.compaction.l0_slowdown_trigger = 32;
    c.compaction.l0_stop_trigger = 48;
    c.compaction.max_background_compactions = 8;
    c.compaction.max_background_flushes = 4;
    c.compaction.target_file_size_base = 128 * 1024 * 1024;
    c.column_family.block_size_bytes = 16 * 1024;
    c.compression.per_cf = Compression::Lz4;
    c
}

fn read_heavy_config() -> LsmConfig {
    let mut c = default_config();
    c.column_family.bloom_bits_per_key = 16;
    c.column_family.pin_l0_index_and_filter = true;
    c.column_family.optimize_filters_for_hits = true;
    c.column_family.block_size_bytes = 2 * 1024;
    c.compaction.l0_compaction_trigger = 2;
    c.compaction.l0_slowdown_trigger = 12;
    c.compaction.l0_stop_trigger = 20;
    c
}

fn balanced_config() -> LsmConfig {
    default_config()
}

fn low_latency_config() -> LsmConfig {
    let mut c = default_config();
    c.compaction.rate_limit_bytes_per_sec = 64 * 1024 * 1024;
    c.compaction.max_background_compactions = 2;
    c.compaction.l0_compaction_trigger = 2;
    c.compaction.l0_slowdown_trigger = 8;
    c.compaction.l0_stop_trigger = 16;
    c.column_family.block_size_bytes = 4 * 1024;
    c
}

fn bulk_load_config() -> LsmConfig {
    let mut c = default_config();
    c.compaction.style = CompactionStyle::Universal;
    c.compaction.l0_compaction_trigger = 100;
    c.compaction.l0_slowdown_trigger = 500;
    c.compaction.l0_stop_trigger = 1000;
    c.compaction.max_background_compactions = 1;
    c.compaction.max_background_flushes = 1;
    c.column_family.bloom_bits_per_key = 1;
    c.compression.per_cf = Compression::None;
    c.compression.levels = vec![Compression::None; c.compaction.level_count as usize];
    c
}

/// Per-level storage size, in bytes. `level_sizes()[0]` is `None` because L0
/// has no fixed target (it is bounded by file count, not bytes).
pub fn level_sizes(c: &CompactionProfile) -> Vec<Option<u64>> {
    let mut sizes = vec![None];
    for n in 1..c.level_count {
        let size = c.l1_base_bytes * u64::from(c.level_multiplier).pow(n - 1);
        sizes.push(Some(size));
    }
    sizes
}

/// Sum of every level's fixed capacity (L0 excluded, since it is unbounded
/// by bytes).
pub fn total_capacity(c: &CompactionProfile) -> u64 {
    level_sizes(c).into_iter().flatten().sum()
}

/// `(min, typical, max)` estimated write amplification for a level-style
/// compaction profile.
pub fn estimated_write_amplification(c: &CompactionProfile) -> (f64, f64, f64) {
    let levels = f64::from(c.level_count);
    let mult = f64::from(c.level_multiplier);
    let min = levels;
    let typical = (levels - 1.0) * mult / 2.0;
    let max = (levels - 1.0) * mult;
    (min, typical, max)
}

/// Validate an [`LsmConfig`]; on failure, return a human-readable reason.
pub fn validate(c: &LsmConfig) -> Result<(), String> {
    let comp = &c.compaction;
    if comp.l1_base_bytes == 0 {
        return Err("l1_base_bytes must be positive".into());
    }
    if comp.level_multiplier == 0 {
        return Err("level_multiplier must be positive".into());
    }
    if comp.level_count == 0 {
        return Err("level_count must be positive".into());
    }
    if comp.target_file_size_base == 0 || comp.target_file_size_multiplier == 0 {
        return Err("target_file_size_base/multiplier must be positive".into());
    }
    if comp.max_background_compactions == 0 || comp.max_background_flushes == 0 {
        return Err("max_background_compactions/flushes must be positive".into());
    }
    if !(comp.l0_compaction_trigger < comp.l0_slowdown_trigger
        && comp.l0_slowdown_trigger < comp.l0_stop_trigger)
    {
        return Err(format!(
            "L0 triggers must satisfy compaction({}) < slowdown({}) < stop({})",
            comp.l0_compaction_trigger, comp.l0_slowdown_trigger, comp.l0_stop_trigger
        ));
    }

    let cf = &c.column_family;
    if !(1..=24).contains(&cf.bloom_bits_per_key) {
        return Err(format!(
            "bloom_bits_per_key {} out of range [1,24]",
            cf.bloom_bits_per_key
        ));
    }
    if let Some(len) = cf.prefix_extractor_len {
        if !(1..=64).contains(&len) {
            return Err(format!("prefix_extractor_len {len} out of range [1,64]"));
        }
    }
    if !(1024..=1024 * 1024).contains(&cf.block_size_bytes) {
        return Err(format!(
            "block_size_bytes {} out of range [1KiB,1MiB]",
            cf.block_size_bytes
        ));
    }

    if let Compression::Zstd = c.compression.per_cf {
        if !(0..=22).contains(&c.compression.per_cf_level) {
            return Err(format!(
                "zstd level {} out of range [0,22]",
                c.compression.per_cf_level
            ));
        }
    }

    Ok(())
}

/// A human-readable multi-line summary, suitable for logs or `--explain`
/// style diagnostics.
pub fn summarize(c: &LsmConfig) -> String {
    let (wa_min, wa_typ, wa_max) = estimated_write_amplification(&c.compaction);
    format!(
        "compaction: {:?} style, L0 triggers {}/{}/{}, rate_limit={} B/s\n\
         column family: bloom={} bits/key, block={} B, prefix={:?}\n\
         compression: per-cf={:?}, total_capacity={} B, write_amp~{:.1}-{:.1}-{:.1}x",
        c.compaction.style,
        c.compaction.l0_compaction_trigger,
        c.compaction.l0_slowdown_trigger,
        c.compaction.l0_stop_trigger,
        c.compaction.rate_limit_bytes_per_sec,
        c.column_family.bloom_bits_per_key,
        c.column_family.block_size_bytes,
        c.column_family.prefix_extractor_len,
        c.compression.per_cf,
        total_capacity(&c.compaction),
        wa_min,
        wa_typ,
        wa_max,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_preset_validates() {
        for preset in [
            LsmPreset::Default,
            LsmPreset::WriteHeavy,
            LsmPreset::ReadHeavy,
            LsmPreset::Balanced,
            LsmPreset::LowLatency,
            LsmPreset::BulkLoad,
        ] {
            let cfg = preset.config();
            assert!(validate(&cfg).is_ok(), "{preset:?} failed validation");
        }
    }

    #[test]
    fn trigger_ordering_violation_fails_validation() {
        let mut cfg = default_config();
        cfg.compaction.l0_slowdown_trigger = cfg.compaction.l0_compaction_trigger;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn level_sizes_grow_geometrically() {
        let c = default_config().compaction;
        let sizes = level_sizes(&c);
        assert!(sizes[0].is_none());
        assert_eq!(sizes[1], Some(c.l1_base_bytes));
        assert_eq!(sizes[2], Some(c.l1_base_bytes * u64::from(c.level_multiplier)));
    }

    #[test]
    fn write_amplification_bounds() {
        let c = default_config().compaction;
        let (min, typical, max) = estimated_write_amplification(&c);
        assert!(min <= typical && typical <= max);
    }

    #[test]
    fn bloom_bits_out_of_range_rejected() {
        let mut cfg = default_config();
        cfg.column_family.bloom_bits_per_key = 25;
        assert!(validate(&cfg).is_err());
    }
}
