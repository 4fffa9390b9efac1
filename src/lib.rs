//! A persistent RDF triple store: dictionary-encoded terms, an LSM-backed
//! triple index in three permutations, and OWL 2 RL / RDFS forward-chaining
//! reasoning with incremental maintenance.
//!
//! ## Pipeline
//!
//! ```text
//! Term  --codec-->  TermId  --dictionary-->  str2id / id2str
//!                       |
//!                       v
//! Triple (TermId, TermId, TermId)  --triple_index-->  spo / pos / osp
//!                       |
//!                       v
//! pattern::scan  <--   rules + reasoner (semi-naive fixpoint)  --> derived
//! ```
//!
//! [`Store`] ties the pieces together into the API most callers use
//! directly; the individual modules are public for callers who want to
//! compose the pieces themselves (e.g. a custom sharding strategy).

pub mod codec;
pub mod config;
pub mod dictionary;
pub mod error;
pub mod kv;
pub mod pattern;
pub mod reasoner;
pub mod rules;
pub mod sequence;
pub mod sharded_dictionary;
pub mod term;
pub mod triple_index;

pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use kv::{Cf, KvStore};
pub use pattern::{PatternMatcher, TriplePattern};
pub use reasoner::incremental::IncrementalMaintainer;
pub use reasoner::status::{ReasoningState, ReasoningStatus};
pub use reasoner::{Reasoner, ReasoningStats};
pub use rules::profiles::Profile;
pub use rules::Rule;
pub use sharded_dictionary::ShardedDictionary;
pub use term::{Literal, LiteralForm, Term, TermId, TermKind};
pub use triple_index::{Triple, TripleIndexer};

use rules::profiles::VocabularyResolver;
use std::path::Path;

/// Resolves vocabulary IRIs through the store's own sharded dictionary, so
/// built-in rule constants are allocated the same way any other IRI would
/// be.
struct DictionaryVocabularyResolver<'a> {
    dict: &'a ShardedDictionary,
}

impl<'a> VocabularyResolver for DictionaryVocabularyResolver<'a> {
    fn resolve(&mut self, iri: &str) -> CoreResult<TermId> {
        self.dict.get_or_create_id(&Term::iri(iri))
    }
}

/// A single RDF triple store: dictionary, triple indexes, and reasoner
/// bound to one on-disk directory.
pub struct Store {
    dictionary: ShardedDictionary,
    kv: KvStore,
    indexer: TripleIndexer,
    status: ReasoningStatus,
    config: Config,
}

impl Store {
    /// Open (creating if necessary) a store rooted at `data_dir`, per
    /// `config`.
    pub fn open(data_dir: impl AsRef<Path>, config: Config) -> CoreResult<Store> {
        let data_dir = data_dir.as_ref();
        let lsm = config.storage.lsm_preset.config();
        let kv = KvStore::open(data_dir.join("primary"), &lsm)?;
        let dictionary =
            ShardedDictionary::open(data_dir.join("dictionary"), &lsm, config.storage.shard_count)?;
        let indexer = TripleIndexer::new(kv.clone());
        let status = ReasoningStatus::new(kv.clone(), &data_dir.display().to_string());
        tracing::info!(path = %data_dir.display(), "store_opened");
        Ok(Store { dictionary, kv, indexer, status, config })
    }

    pub fn dictionary(&self) -> &ShardedDictionary {
        &self.dictionary
    }

    pub fn kv(&self) -> &KvStore {
        &self.kv
    }

    /// Resolve `(s, p, o)` term triples to `TermId` triples (allocating
    /// dictionary entries as needed) and assert them.
    pub fn assert_triples(&self, triples: &[(Term, Term, Term)]) -> CoreResult<()> {
        let flattened: Vec<Term> = triples
            .iter()
            .flat_map(|(s, p, o)| [s.clone(), p.clone(), o.clone()])
            .collect();
        let ids = self.dictionary.get_or_create_ids(&flattened, None)?;
        let resolved: Vec<Triple> = ids
            .chunks_exact(3)
            .map(|c| Triple::new(c[0], c[1], c[2]))
            .collect();
        self.indexer.insert_many(&resolved)
    }

    pub fn query(&self, pattern: TriplePattern) -> CoreResult<Vec<Triple>> {
        PatternMatcher::new(&self.kv).scan(pattern)
    }

    /// Build a [`Reasoner`] for the configured default profile, resolving
    /// its vocabulary IRIs through this store's dictionary.
    pub fn reasoner(&self) -> CoreResult<Reasoner> {
        let profile = match self.config.reasoning.default_profile.as_str() {
            "owl2rl" => Profile::Owl2Rl,
            "all" => Profile::All,
            _ => Profile::Rdfs,
        };
        let mut resolver = DictionaryVocabularyResolver { dict: &self.dictionary };
        let rules = rules::profiles::load(profile, &mut resolver)?;
        Reasoner::new(self.kv.clone(), rules, self.config.reasoning.enable_parallel_rules)
    }

    /// Run the configured reasoner to a fixpoint and mark the store
    /// materialized.
    pub fn materialize(&self) -> CoreResult<ReasoningStats> {
        let reasoner = self.reasoner()?;
        match reasoner.materialize() {
            Ok(stats) => {
                let fact_count = PatternMatcher::new(&self.kv)
                    .scan(TriplePattern::default())?
                    .len() as u64;
                self.status.mark_materialized(&self.config.reasoning.default_profile, fact_count)?;
                Ok(stats)
            }
            Err(e) => {
                self.status.mark_error(e.to_string())?;
                Err(e)
            }
        }
    }

    pub fn reasoning_state(&self) -> CoreResult<ReasoningState> {
        self.status.state()
    }
}

/// Initialise the crate's `tracing` subscriber per [`config::LoggingConfig`].
/// Call once at process startup; a second call is a no-op.
pub fn init_logging(logging: &config::LoggingConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter);

    let result = if logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already initialised");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_round_trips_a_triple() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), Config::default()).unwrap();
        store
            .assert_triples(&[(Term::iri("http://ex/a"), Term::iri("http://ex/p"), Term::iri("http://ex/b"))])
            .unwrap();
        let results = store.query(TriplePattern::default()).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn store_materializes_with_default_rdfs_profile() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), Config::default()).unwrap();
        let subclass_of = Term::iri(rules::profiles::RDFS_SUBCLASS_OF);
        store
            .assert_triples(&[
                (Term::iri("http://ex/A"), subclass_of.clone(), Term::iri("http://ex/B")),
                (Term::iri("http://ex/B"), subclass_of, Term::iri("http://ex/C")),
            ])
            .unwrap();
        let stats = store.materialize().unwrap();
        assert!(stats.total_derived > 0);
        assert_eq!(store.reasoning_state().unwrap(), ReasoningState::Materialized);
    }
}
