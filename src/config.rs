//! Configuration (C13): a layered config loaded from built-in defaults,
//! an optional TOML file, and `TRIPLESTORE_`-prefixed environment
//! variables, in that order of increasing precedence.

use crate::error::CoreResult;
use crate::kv::tuning::LsmPreset;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_block_cache_bytes() -> u64 {
    64 * 1024 * 1024
}

fn default_lsm_preset() -> LsmPreset {
    LsmPreset::Default
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_lsm_preset")]
    pub lsm_preset: LsmPreset,
    #[serde(default = "default_block_cache_bytes")]
    pub block_cache_bytes: u64,
    /// Number of dictionary shards. `None` defaults to `num_cpus::get()`.
    #[serde(default)]
    pub shard_count: Option<usize>,
}

impl Default for StorageConfig {
    fn default() -> StorageConfig {
        StorageConfig {
            data_dir: default_data_dir(),
            lsm_preset: default_lsm_preset(),
            block_cache_bytes: default_block_cache_bytes(),
            shard_count: None,
        }
    }
}

fn default_profile() -> String {
    "rdfs".to_string()
}

fn default_max_iterations() -> usize {
    crate::reasoner::MAX_ITER
}

fn default_max_facts() -> usize {
    crate::reasoner::MAX_FACTS
}

fn default_max_trace_depth() -> usize {
    64
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    #[serde(default = "default_profile")]
    pub default_profile: String,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_max_facts")]
    pub max_facts: usize,
    #[serde(default = "default_true")]
    pub enable_parallel_rules: bool,
    #[serde(default = "default_max_trace_depth")]
    pub max_trace_depth: usize,
}

impl Default for ReasoningConfig {
    fn default() -> ReasoningConfig {
        ReasoningConfig {
            default_profile: default_profile(),
            max_iterations: default_max_iterations(),
            max_facts: default_max_facts(),
            enable_parallel_rules: true,
            max_trace_depth: default_max_trace_depth(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> LoggingConfig {
        LoggingConfig { level: default_log_level(), json: false, file: None }
    }
}

/// The complete, layered configuration for one store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub reasoning: ReasoningConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load defaults, merge `config.toml` and `config.local.toml` from the
    /// current directory if present, then merge `TRIPLESTORE_`-prefixed
    /// environment variables (`__` separates nested keys, e.g.
    /// `TRIPLESTORE_STORAGE__SHARD_COUNT`).
    pub fn load() -> CoreResult<Config> {
        let figment = Figment::from(figment::providers::Serialized::defaults(Config::default()))
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("TRIPLESTORE_").split("__"));
        Ok(figment.extract()?)
    }

    pub fn from_file(path: impl Into<PathBuf>) -> CoreResult<Config> {
        let path = path.into();
        let figment = Figment::from(figment::providers::Serialized::defaults(Config::default()))
            .merge(Toml::file(&path))
            .merge(Env::prefixed("TRIPLESTORE_").split("__"));
        Ok(figment.extract()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = Config::default();
        assert_eq!(config.reasoning.default_profile, "rdfs");
        assert!(config.reasoning.enable_parallel_rules);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.storage.block_cache_bytes, config.storage.block_cache_bytes);
    }

    #[test]
    fn env_override_takes_precedence_over_default() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("TRIPLESTORE_REASONING__DEFAULT_PROFILE", "owl2rl");
            let config = Config::load().unwrap();
            assert_eq!(config.reasoning.default_profile, "owl2rl");
            Ok(())
        });
    }
}
