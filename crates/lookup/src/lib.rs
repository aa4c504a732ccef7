//! # Territory Lookup
//!
//! Client for a street-level postal directory (ViaCEP by default), used to
//! grow the gazetteer with postal codes the registry references but the
//! gazetteer lacks.
//!
//! ## Behaviour
//!
//! - **Cache first**: a code already in the store's `cep_cache/` table never
//!   reaches the network.
//! - **Rate limited**: a [`TokenBucket`] spaces calls by a minimum interval
//!   (1.1 s by default) so the public directory's limits are honoured.
//! - **Retries**: transient failures (network errors, 5xx, undecodable
//!   bodies) retry with exponential backoff; each retry waits for a fresh
//!   token. "Not found" is definitive and never retried within a call.
//! - **Pluggable**: [`PostalDirectory`] abstracts the provider. [`ViaCepClient`]
//!   speaks HTTP; [`StaticLookup`] answers from a fixture map.
//!
//! ## Example Usage
//!
//! ```
//! use std::sync::Arc;
//! use canonical::Cep;
//! use lookup::{LookupClient, LookupConfig, LookupOrigin, StaticLookup};
//! use store::{PostalAddress, TerritoryStore};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let directory = Arc::new(StaticLookup::new().with_address(
//!     "01001-000",
//!     PostalAddress { street: Some("Praça da Sé".into()), ..Default::default() },
//! ));
//! let store = TerritoryStore::in_memory();
//! let client = LookupClient::new(directory, store, &LookupConfig::default()).unwrap();
//!
//! let cep = Cep::parse("01001000").unwrap();
//! assert_eq!(client.resolve(&cep).await.unwrap().origin, LookupOrigin::Network);
//! assert_eq!(client.resolve(&cep).await.unwrap().origin, LookupOrigin::Cache);
//! # }
//! ```

mod client;
mod config;
mod error;
mod provider;
mod rate_limit;
mod retry;
pub mod serde_millis;
mod stub;

pub use client::{LookupClient, LookupOrigin, Resolution};
pub use config::LookupConfig;
pub use error::LookupError;
pub use provider::{PostalDirectory, ViaCepClient};
pub use rate_limit::{RateLimitConfig, RateLimitStats, TokenBucket};
pub use retry::{execute_with_retry_async, RetryConfig, RetryResult};
pub use stub::StaticLookup;
