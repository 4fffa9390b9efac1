//! Crate-wide error taxonomy.
//!
//! Every public operation in this core returns `Result<T, CoreError>`. There
//! is no panicking across API boundaries; `debug_assert!` is used internally
//! to check invariants that a caller cannot violate without a prior bug.

use thiserror::Error;

/// Errors produced by any component of the triple store core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Input malformed: a bad IRI, an out-of-range LSM knob, a trigger
    /// ordering violation, and similar.
    #[error("validation error: {0}")]
    Validation(String),

    /// A `Term` shape the codec does not know how to encode.
    #[error("unsupported term: {0}")]
    UnsupportedTerm(String),

    /// A per-type 60-bit sequence has been exhausted.
    #[error("sequence overflow for type {0:?}")]
    SequenceOverflow(crate::term::TermKind),

    /// Encoded term-key bytes could not be parsed back into a `Term`.
    #[error("invalid term encoding: {0}")]
    InvalidEncoding(String),

    /// The underlying LSM backend failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// A handle was used after it was closed.
    #[error("handle already closed")]
    AlreadyClosed,

    /// A snapshot was used after it was released.
    #[error("snapshot already released")]
    AlreadyReleased,

    /// A batch or parallel task exceeded its caller-provided deadline.
    #[error("operation timed out")]
    Timeout,

    /// Semi-naive evaluation exceeded `MAX_ITER`.
    #[error("max iterations exceeded ({0})")]
    MaxIterationsExceeded(usize),

    /// Semi-naive evaluation exceeded `MAX_FACTS`.
    #[error("max facts exceeded ({0})")]
    MaxFactsExceeded(usize),

    /// A dictionary batch exceeded `MAX_BATCH`.
    #[error("batch too large: {0} terms (max {1})")]
    BatchTooLarge(usize, usize),

    /// A column family name was not one of the store's known families.
    #[error("invalid column family: {0}")]
    InvalidColumnFamily(String),

    /// A `set_options` key was not in the runtime-mutable allow list.
    #[error("rejected runtime option key: {0}")]
    RejectedOptionKey(String),

    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<rocksdb::Error> for CoreError {
    fn from(e: rocksdb::Error) -> Self {
        CoreError::Io(e.to_string())
    }
}

impl From<figment::Error> for CoreError {
    fn from(e: figment::Error) -> Self {
        CoreError::Config(e.to_string())
    }
}

/// Result alias used throughout the core.
pub type CoreResult<T> = Result<T, CoreError>;
