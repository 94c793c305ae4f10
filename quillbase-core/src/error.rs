// quillbase-core/src/error.rs
// Crate-wide error type and Result alias

use thiserror::Error;

/// All errors surfaced by the quillbase core.
///
/// Every failure propagates to the caller; multi-document mutations roll the
/// in-memory state back before the error leaves the collection.
#[derive(Debug, Error)]
pub enum QuillError {
    /// A unique index would hold two documents under the same key.
    #[error("unique constraint violated on field '{field}' (key: {key})")]
    UniqueViolated { field: String, key: String },

    /// A document key starts with '$' or contains '.'.
    #[error("invalid field name: {0}")]
    InvalidFieldName(String),

    /// Unknown query operator or malformed query shape.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Mixed operator/plain update document, unknown modifier, or bad
    /// modifier argument.
    #[error("invalid update: {0}")]
    InvalidModifier(String),

    /// Projection mixes picks and omissions outside `_id`.
    #[error("invalid projection: {0}")]
    InvalidProjection(String),

    /// Too many unreadable lines in the datafile during replay.
    #[error("datafile corruption: {corrupt} of {total} lines unreadable, above the alert threshold")]
    CorruptionThreshold { corrupt: usize, total: usize },

    /// Only one of the serialization hooks was supplied, or the pair is not
    /// an inverse on random inputs.
    #[error("serialization hooks misconfigured: {0}")]
    HookMisconfigured(String),

    /// Underlying storage I/O failure, propagated verbatim.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode failure outside the replay path.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The collection failed to load; all API calls fail until a successful
    /// `load_database`.
    #[error("collection failed to load: {0}")]
    LoadFailed(String),

    /// Datafile names ending in '~' collide with the in-flight temp file.
    #[error("invalid datafile name: {0}")]
    InvalidDatafileName(String),
}

pub type Result<T> = std::result::Result<T, QuillError>;

impl From<serde_json::Error> for QuillError {
    fn from(err: serde_json::Error) -> Self {
        QuillError::Serialization(err.to_string())
    }
}
