use canonical::Cep;
use store::StoreError;
use thiserror::Error;

/// Errors surfaced by postal-code lookups.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// The directory confirmed the code does not exist.
    #[error("postal code {0} not found")]
    NotFound(Cep),
    /// Network failure, unexpected status or undecodable body.
    #[error("transient lookup failure: {0}")]
    Transient(String),
    /// No rate-limit token became available within the configured wait.
    #[error("rate limit wait exceeded for provider {0}")]
    RateLimited(String),
    #[error("invalid lookup config: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LookupError {
    /// Whether another attempt might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LookupError::Transient(_) | LookupError::RateLimited(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_failures_retry() {
        let cep = Cep::parse("01001000").unwrap();
        assert!(LookupError::Transient("HTTP error 503".into()).is_retryable());
        assert!(LookupError::RateLimited("viacep".into()).is_retryable());
        assert!(!LookupError::NotFound(cep).is_retryable());
        assert!(!LookupError::InvalidConfig("x".into()).is_retryable());
        assert!(!LookupError::Store(StoreError::Poisoned).is_retryable());
    }

    #[test]
    fn not_found_names_the_code() {
        let err = LookupError::NotFound(Cep::parse("99999-999").unwrap());
        assert_eq!(err.to_string(), "postal code 99999999 not found");
    }
}
