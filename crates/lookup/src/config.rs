use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::rate_limit::RateLimitConfig;
use crate::retry::RetryConfig;
use crate::LookupError;

/// Runtime configuration of the postal-directory client.
///
/// # Example
/// ```
/// use lookup::LookupConfig;
/// use std::time::Duration;
///
/// let cfg = LookupConfig {
///     base_url: "https://viacep.com.br/ws".into(),
///     timeout: Duration::from_secs(5),
///     cache_not_found: true,
///     ..Default::default()
/// };
/// cfg.validate().unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LookupConfig {
    /// Directory root; requests go to `{base_url}/{cep}/json/`.
    pub base_url: String,
    /// Whole-request timeout.
    #[serde(with = "crate::serde_millis")]
    pub timeout: Duration,
    #[serde(with = "crate::serde_millis")]
    pub connect_timeout: Duration,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    /// Remember "not found" answers permanently instead of asking again on
    /// the next run.
    pub cache_not_found: bool,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            base_url: "https://viacep.com.br/ws".into(),
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            cache_not_found: false,
        }
    }
}

impl LookupConfig {
    pub fn validate(&self) -> Result<(), LookupError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(LookupError::InvalidConfig(format!(
                "base_url must be an http(s) URL, got {:?}",
                self.base_url
            )));
        }
        if self.timeout.is_zero() {
            return Err(LookupError::InvalidConfig("timeout must be > 0".into()));
        }
        if self.rate_limit.burst_size == 0 {
            return Err(LookupError::InvalidConfig(
                "rate_limit.burst_size must be >= 1".into(),
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(LookupError::InvalidConfig(
                "retry.backoff_multiplier must be >= 1.0".into(),
            ));
        }
        Ok(())
    }
}
