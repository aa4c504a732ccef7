use thiserror::Error;

/// Errors that can occur while configuring the normalizers.
///
/// Normalizing a value never fails: unusable input maps to an absent value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CanonicalError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid postal code: {0:?}")]
    InvalidCep(String),
}
