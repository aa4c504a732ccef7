use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use canonical::Cep;
use store::PostalAddress;

use crate::{LookupError, PostalDirectory};

/// Deterministic in-process directory used for tests and offline runs.
///
/// Known codes answer with their address, codes marked as failing answer
/// with a transient error, and everything else is "not found". Every call is
/// recorded so callers can assert on network traffic.
#[derive(Debug, Default)]
pub struct StaticLookup {
    entries: BTreeMap<Cep, PostalAddress>,
    failing: BTreeSet<Cep>,
    requested: Mutex<Vec<Cep>>,
}

impl StaticLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a code -> address map, skipping malformed codes.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, PostalAddress)>,
        S: AsRef<str>,
    {
        entries
            .into_iter()
            .fold(Self::default(), |stub, (cep, address)| {
                stub.with_address(cep.as_ref(), address)
            })
    }

    pub fn with_address(mut self, cep: &str, address: PostalAddress) -> Self {
        if let Some(cep) = Cep::parse(cep) {
            self.entries.insert(cep, address);
        }
        self
    }

    /// Make `cep` fail with a transient error on every call.
    pub fn with_failure(mut self, cep: &str) -> Self {
        if let Some(cep) = Cep::parse(cep) {
            self.failing.insert(cep);
        }
        self
    }

    /// Number of fetches served so far.
    pub fn calls(&self) -> usize {
        self.requested().len()
    }

    /// Codes fetched so far, in call order.
    pub fn requested(&self) -> Vec<Cep> {
        self.requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl PostalDirectory for StaticLookup {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self, cep: &Cep) -> Result<PostalAddress, LookupError> {
        self.requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(cep.clone());

        if self.failing.contains(cep) {
            return Err(LookupError::Transient(format!(
                "HTTP error 503 Service Unavailable: {cep}"
            )));
        }
        self.entries
            .get(cep)
            .cloned()
            .ok_or_else(|| LookupError::NotFound(cep.clone()))
    }
}
