use std::sync::Arc;

use canonical::Cep;
use chrono::Utc;
use serde::Serialize;
use store::{CachedLookup, CepCacheEntry, TerritoryStore};
use tracing::{debug, warn};

use crate::rate_limit::{RateLimitStats, TokenBucket};
use crate::retry::{execute_with_retry_async, RetryConfig};
use crate::{LookupConfig, LookupError, PostalDirectory};

/// Where a resolution was answered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupOrigin {
    Cache,
    Network,
}

/// A definitive answer for one postal code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub cep: Cep,
    pub origin: LookupOrigin,
    pub result: CachedLookup,
}

/// Cache-first, rate-limited access to a [`PostalDirectory`].
///
/// Calls are meant to be made one at a time; the limiter spaces them by the
/// configured interval and every retry takes a fresh token.
pub struct LookupClient {
    directory: Arc<dyn PostalDirectory>,
    store: TerritoryStore,
    limiter: TokenBucket,
    retry: RetryConfig,
    cache_not_found: bool,
}

impl LookupClient {
    pub fn new(
        directory: Arc<dyn PostalDirectory>,
        store: TerritoryStore,
        config: &LookupConfig,
    ) -> Result<Self, LookupError> {
        config.validate()?;
        Ok(Self {
            directory,
            store,
            limiter: TokenBucket::new(config.rate_limit),
            retry: config.retry,
            cache_not_found: config.cache_not_found,
        })
    }

    pub fn rate_limit_stats(&self) -> RateLimitStats {
        self.limiter.stats()
    }

    /// Answer from the cache when possible, otherwise ask the directory.
    ///
    /// Found answers are cached; "not found" is cached only when negative
    /// caching is on. Transient failures come back as errors and leave the
    /// cache untouched.
    pub async fn resolve(&self, cep: &Cep) -> Result<Resolution, LookupError> {
        if let Some(entry) = self.store.cep_cache().get(cep)? {
            debug!(cep = %cep, "lookup_cache_hit");
            return Ok(Resolution {
                cep: cep.clone(),
                origin: LookupOrigin::Cache,
                result: entry.result,
            });
        }

        let directory = self.directory.as_ref();
        let limiter = &self.limiter;
        let outcome =
            execute_with_retry_async(&self.retry, LookupError::is_retryable, |_| async move {
                if !limiter.acquire().await {
                    return Err(LookupError::RateLimited(directory.name().to_string()));
                }
                directory.fetch(cep).await
            })
            .await;

        let attempts = outcome.attempts;
        let result = match outcome.result {
            Ok(address) => CachedLookup::Found(address),
            Err(LookupError::NotFound(_)) => CachedLookup::NotFound,
            Err(err) => {
                warn!(cep = %cep, attempts, error = %err, "lookup_network_failure");
                return Err(err);
            }
        };

        if matches!(result, CachedLookup::Found(_)) || self.cache_not_found {
            self.store.cep_cache().put(&CepCacheEntry {
                cep: cep.clone(),
                result: result.clone(),
                cached_at: Utc::now(),
            })?;
        }
        debug!(
            cep = %cep,
            attempts,
            found = matches!(result, CachedLookup::Found(_)),
            provider = directory.name(),
            "lookup_network_answer"
        );

        Ok(Resolution {
            cep: cep.clone(),
            origin: LookupOrigin::Network,
            result,
        })
    }
}
