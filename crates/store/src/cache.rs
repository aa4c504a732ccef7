use canonical::Cep;

use crate::records::{CepCacheEntry, StagedEntry};
use crate::{encode, StoreError, TerritoryStore, WriteOp};

const CEP_CACHE_PREFIX: &str = "cep_cache/";
const STAGING_PREFIX: &str = "cep_staging/";

/// Postal-code lookup cache. Entries never expire.
pub struct CepCache<'a> {
    store: &'a TerritoryStore,
}

impl<'a> CepCache<'a> {
    pub(crate) fn new(store: &'a TerritoryStore) -> Self {
        Self { store }
    }

    pub fn get(&self, cep: &Cep) -> Result<Option<CepCacheEntry>, StoreError> {
        self.store.get_value(&format!("{CEP_CACHE_PREFIX}{cep}"))
    }

    pub fn put(&self, entry: &CepCacheEntry) -> Result<(), StoreError> {
        self.store
            .backend()
            .put(&format!("{CEP_CACHE_PREFIX}{}", entry.cep), &encode(entry)?)
    }

    pub fn all(&self) -> Result<Vec<CepCacheEntry>, StoreError> {
        self.store.scan_values(CEP_CACHE_PREFIX)
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.store.scan_keys(CEP_CACHE_PREFIX)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

/// Holding area for lookup results before they are merged into the gazetteer.
pub struct StagingArea<'a> {
    store: &'a TerritoryStore,
}

impl<'a> StagingArea<'a> {
    pub(crate) fn new(store: &'a TerritoryStore) -> Self {
        Self { store }
    }

    /// Stage an entry; restaging the same code overwrites it.
    pub fn stage(&self, entry: &StagedEntry) -> Result<(), StoreError> {
        self.store
            .backend()
            .put(&format!("{STAGING_PREFIX}{}", entry.cep), &encode(entry)?)
    }

    /// Staged entries ordered by postal code.
    pub fn all(&self) -> Result<Vec<StagedEntry>, StoreError> {
        self.store.scan_values(STAGING_PREFIX)
    }

    pub fn remove(&self, ceps: &[Cep]) -> Result<(), StoreError> {
        let ops = ceps
            .iter()
            .map(|cep| WriteOp::delete(format!("{STAGING_PREFIX}{cep}")))
            .collect();
        self.store.backend().apply(ops)
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.store.scan_keys(STAGING_PREFIX)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}
