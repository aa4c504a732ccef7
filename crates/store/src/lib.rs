//! # Territory Store
//!
//! Ordered key-value persistence for the territorial matching engine. One
//! backend holds every logical table as a key prefix:
//!
//! | Prefix          | Contents                                        |
//! |-----------------|-------------------------------------------------|
//! | `family/`       | registry snapshot ([`FamilyAddressRecord`])     |
//! | `geo/`          | gazetteer rows ([`GazetteerEntry`])             |
//! | `geo_cep/`      | postal-code presence index over the gazetteer   |
//! | `geo_key/`      | normalized address key per gazetteer row        |
//! | `cep_cache/`    | postal lookup cache ([`CepCacheEntry`])         |
//! | `cep_staging/`  | lookup results awaiting merge ([`StagedEntry`]) |
//! | `artifact_meta/`| artifact metadata ([`ArtifactMeta`])            |
//! | `artifact/`     | artifact rows, one sub-prefix per generation    |
//!
//! ## Backends
//!
//! - An in-memory `BTreeMap` backend for tests and dry runs.
//! - A redb backend for on-disk storage (`backend-redb` feature, on by default).
//!
//! Values are encoded with bincode's standard configuration. Batched writes go
//! through [`StoreBackend::apply`], which is atomic on both backends.
//!
//! ## Example Usage
//!
//! ```
//! use store::{FamilyAddressRecord, TerritoryStore};
//!
//! let store = TerritoryStore::in_memory();
//! let record = FamilyAddressRecord {
//!     family_code: Some("42".into()),
//!     cep: Some("01001-000".into()),
//!     ..Default::default()
//! };
//! store.families().replace(&[record]).unwrap();
//! assert_eq!(store.families().len().unwrap(), 1);
//! ```

mod artifact;
mod backend;
mod cache;
mod error;
mod family;
mod gazetteer;
mod records;

use std::sync::Arc;

use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub use artifact::{ArtifactMeta, ArtifactRow, ArtifactStore, RefreshMode, WriterLease};
#[cfg(feature = "backend-redb")]
pub use backend::RedbBackend;
pub use backend::{BackendConfig, InMemoryBackend, StoreBackend, WriteOp};
pub use cache::{CepCache, StagingArea};
pub use error::StoreError;
pub use family::FamilyTable;
pub use gazetteer::GazetteerTable;
pub use records::{
    CachedLookup, CepCacheEntry, CleanFamily, FamilyAddressRecord, FamilyKey, GazetteerEntry,
    NewGazetteerEntry, PostalAddress, StagedEntry,
};

use artifact::WriterLeases;

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    Ok(encode_to_vec(value, standard())?)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    let (value, _) = decode_from_slice(bytes, standard())?;
    Ok(value)
}

/// Handle to the store. Cheap to clone; clones share the backend and the
/// artifact writer leases.
#[derive(Clone)]
pub struct TerritoryStore {
    backend: Arc<dyn StoreBackend>,
    leases: Arc<WriterLeases>,
}

impl std::fmt::Debug for TerritoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerritoryStore").finish_non_exhaustive()
    }
}

impl TerritoryStore {
    pub fn open(config: &BackendConfig) -> Result<Self, StoreError> {
        Ok(Self::with_backend(config.build()?))
    }

    pub fn with_backend(backend: Arc<dyn StoreBackend>) -> Self {
        Self {
            backend,
            leases: Arc::new(WriterLeases::default()),
        }
    }

    pub fn in_memory() -> Self {
        Self::with_backend(Arc::new(InMemoryBackend::new()))
    }

    pub fn backend(&self) -> &dyn StoreBackend {
        self.backend.as_ref()
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.backend.flush()
    }

    pub fn families(&self) -> FamilyTable<'_> {
        FamilyTable::new(self)
    }

    pub fn gazetteer(&self) -> GazetteerTable<'_> {
        GazetteerTable::new(self)
    }

    pub fn cep_cache(&self) -> CepCache<'_> {
        CepCache::new(self)
    }

    pub fn staging(&self) -> StagingArea<'_> {
        StagingArea::new(self)
    }

    pub fn artifacts(&self) -> ArtifactStore<'_> {
        ArtifactStore::new(self)
    }

    pub(crate) fn leases(&self) -> &Arc<WriterLeases> {
        &self.leases
    }

    pub(crate) fn get_value<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        match self.backend.get(key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn scan_values<T: DeserializeOwned>(
        &self,
        prefix: &str,
    ) -> Result<Vec<T>, StoreError> {
        let mut values = Vec::new();
        self.backend.scan_prefix(prefix, &mut |_, bytes| {
            values.push(decode(bytes)?);
            Ok(())
        })?;
        Ok(values)
    }

    pub(crate) fn scan_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        self.backend.scan_prefix(prefix, &mut |key, _| {
            keys.push(key.to_string());
            Ok(())
        })?;
        Ok(keys)
    }
}
