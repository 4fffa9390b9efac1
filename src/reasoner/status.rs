//! Reasoning Status (C12): tracks whether a store's derived closure is
//! up to date with its explicit facts.

use crate::error::{CoreError, CoreResult};
use crate::kv::{Cf, KvStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2_placeholder::short_hash;

/// Where a store stands with respect to its last materialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningState {
    /// No materialization has run yet.
    Initialized,
    /// The derived closure reflects the current explicit facts.
    Materialized,
    /// Explicit facts changed since the last materialization without
    /// incremental maintenance catching up (e.g. a bulk load).
    Stale,
    /// The last materialization attempt failed.
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StatusRecord {
    state: ReasoningState,
    profile: String,
    last_materialized_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    explicit_fact_count_at_materialization: u64,
}

impl Default for StatusRecord {
    fn default() -> StatusRecord {
        StatusRecord {
            state: ReasoningState::Initialized,
            profile: String::new(),
            last_materialized_at: None,
            last_error: None,
            explicit_fact_count_at_materialization: 0,
        }
    }
}

/// Persists reasoning status metadata in the `default` column family, keyed
/// by a hash of the store's path so multiple stores can share a process
/// without colliding.
pub struct ReasoningStatus {
    kv: KvStore,
    key: Vec<u8>,
}

impl ReasoningStatus {
    pub fn new(kv: KvStore, store_path: &str) -> ReasoningStatus {
        let mut key = b"reasoning_status:".to_vec();
        key.extend_from_slice(short_hash(store_path).as_bytes());
        ReasoningStatus { kv, key }
    }

    fn load(&self) -> CoreResult<StatusRecord> {
        match self.kv.get(Cf::Default, &self.key)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| CoreError::InvalidEncoding(e.to_string())),
            None => Ok(StatusRecord::default()),
        }
    }

    fn save(&self, record: &StatusRecord) -> CoreResult<()> {
        let bytes = serde_json::to_vec(record).map_err(|e| CoreError::Io(e.to_string()))?;
        self.kv.put(Cf::Default, &self.key, &bytes)
    }

    pub fn state(&self) -> CoreResult<ReasoningState> {
        Ok(self.load()?.state)
    }

    pub fn mark_materialized(&self, profile: &str, explicit_fact_count: u64) -> CoreResult<()> {
        let record = StatusRecord {
            state: ReasoningState::Materialized,
            profile: profile.to_string(),
            last_materialized_at: Some(Utc::now()),
            last_error: None,
            explicit_fact_count_at_materialization: explicit_fact_count,
        };
        self.save(&record)
    }

    pub fn mark_stale(&self) -> CoreResult<()> {
        let mut record = self.load()?;
        record.state = ReasoningState::Stale;
        self.save(&record)
    }

    pub fn mark_error(&self, message: impl Into<String>) -> CoreResult<()> {
        let mut record = self.load()?;
        record.state = ReasoningState::Error;
        record.last_error = Some(message.into());
        self.save(&record)
    }

    /// True when the explicit fact count has moved since the last
    /// materialization, or no materialization has happened at all.
    pub fn needs_rematerialization(&self, current_explicit_fact_count: u64) -> CoreResult<bool> {
        let record = self.load()?;
        Ok(match record.state {
            ReasoningState::Initialized | ReasoningState::Error => true,
            ReasoningState::Stale => true,
            ReasoningState::Materialized => {
                record.explicit_fact_count_at_materialization != current_explicit_fact_count
            }
        })
    }
}

/// A tiny dependency-free stand-in for a cryptographic digest: this status
/// key only needs to disambiguate store paths sharing a process, not resist
/// collision attacks.
mod sha2_placeholder {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    pub fn short_hash(s: &str) -> String {
        let mut hasher = DefaultHasher::new();
        s.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::tuning::LsmPreset;

    fn setup() -> (tempfile::TempDir, KvStore) {
        let dir = tempfile::tempdir().unwrap();
        let kv = KvStore::open(dir.path(), &LsmPreset::Default.config()).unwrap();
        (dir, kv)
    }

    #[test]
    fn fresh_status_is_initialized() {
        let (_dir, kv) = setup();
        let status = ReasoningStatus::new(kv, "/tmp/store");
        assert_eq!(status.state().unwrap(), ReasoningState::Initialized);
        assert!(status.needs_rematerialization(0).unwrap());
    }

    #[test]
    fn materialized_state_tracks_fact_count() {
        let (_dir, kv) = setup();
        let status = ReasoningStatus::new(kv, "/tmp/store");
        status.mark_materialized("rdfs", 10).unwrap();
        assert_eq!(status.state().unwrap(), ReasoningState::Materialized);
        assert!(!status.needs_rematerialization(10).unwrap());
        assert!(status.needs_rematerialization(11).unwrap());
    }

    #[test]
    fn error_state_requires_rematerialization() {
        let (_dir, kv) = setup();
        let status = ReasoningStatus::new(kv, "/tmp/store");
        status.mark_materialized("rdfs", 5).unwrap();
        status.mark_error("boom").unwrap();
        assert_eq!(status.state().unwrap(), ReasoningState::Error);
        assert!(status.needs_rematerialization(5).unwrap());
    }

    #[test]
    fn different_store_paths_do_not_collide() {
        let (_dir, kv) = setup();
        let a = ReasoningStatus::new(kv.clone(), "/tmp/a");
        let b = ReasoningStatus::new(kv, "/tmp/b");
        a.mark_materialized("rdfs", 1).unwrap();
        assert_eq!(b.state().unwrap(), ReasoningState::Initialized);
    }
}
