use bincode::error::{DecodeError, EncodeError};
use thiserror::Error;

/// Errors surfaced by the store and its backends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("store lock poisoned")]
    Poisoned,
    #[error("serialization encode error: {0}")]
    Encode(String),
    #[error("serialization decode error: {0}")]
    Decode(String),
    #[error("artifact {0} does not exist")]
    ArtifactMissing(String),
    /// The non-blocking refresh mode was refused for this artifact.
    #[error("non-blocking refresh of {artifact} rejected: {reason}")]
    RefreshConflict { artifact: String, reason: String },
    #[error("artifact {artifact} violates its unique index on key {key}")]
    UniqueViolation { artifact: String, key: String },
}

impl From<EncodeError> for StoreError {
    fn from(e: EncodeError) -> Self {
        StoreError::Encode(e.to_string())
    }
}

impl From<DecodeError> for StoreError {
    fn from(e: DecodeError) -> Self {
        StoreError::Decode(e.to_string())
    }
}

impl StoreError {
    pub fn backend<E: std::fmt::Display>(err: E) -> Self {
        Self::Backend(err.to_string())
    }
}
