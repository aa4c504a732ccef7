use crate::StoreError;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// A single mutation inside an atomic [`StoreBackend::apply`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
    /// Remove every key starting with `prefix`.
    DeletePrefix { prefix: String },
}

impl WriteOp {
    pub fn put(key: impl Into<String>, value: Vec<u8>) -> Self {
        WriteOp::Put {
            key: key.into(),
            value,
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        WriteOp::Delete { key: key.into() }
    }

    pub fn delete_prefix(prefix: impl Into<String>) -> Self {
        WriteOp::DeletePrefix {
            prefix: prefix.into(),
        }
    }
}

/// Trait for an ordered key-value storage backend.
///
/// Logical tables are key prefixes. Keys are visited in lexicographic order,
/// which the tables rely on for deterministic iteration.
pub trait StoreBackend: Send + Sync {
    /// Insert or update a key-value pair.
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;
    /// Retrieve a value by key.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    /// Delete a key-value pair.
    fn delete(&self, key: &str) -> Result<(), StoreError>;
    /// Apply every operation atomically, in order.
    fn apply(&self, ops: Vec<WriteOp>) -> Result<(), StoreError>;
    /// Visit every entry whose key starts with `prefix`, in key order.
    ///
    /// The visitor must not write to the same backend.
    fn scan_prefix(
        &self,
        prefix: &str,
        visitor: &mut dyn FnMut(&str, &[u8]) -> Result<(), StoreError>,
    ) -> Result<(), StoreError>;
    /// Flush any buffered writes to the backend.
    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Configuration for selecting and building a backend.
///
/// ```
/// use store::BackendConfig;
///
/// let config = BackendConfig::in_memory();
/// let config = BackendConfig::redb("/var/lib/territory/territory.redb");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum BackendConfig {
    /// Persistent redb file at `path`.
    Redb { path: String },
    /// Ephemeral ordered map; used by tests and dry runs.
    #[default]
    InMemory,
}

impl BackendConfig {
    pub fn in_memory() -> Self {
        BackendConfig::InMemory
    }

    pub fn redb<P: Into<String>>(path: P) -> Self {
        BackendConfig::Redb { path: path.into() }
    }

    /// Build the backend based on the configuration.
    pub fn build(&self) -> Result<Arc<dyn StoreBackend>, StoreError> {
        match self {
            BackendConfig::InMemory => Ok(Arc::new(InMemoryBackend::new())),
            BackendConfig::Redb { path } => {
                #[cfg(feature = "backend-redb")]
                {
                    Ok(Arc::new(RedbBackend::open(path)?))
                }
                #[cfg(not(feature = "backend-redb"))]
                {
                    let _ = path;
                    Err(StoreError::backend("redb backend disabled at compile time"))
                }
            }
        }
    }
}

/// An in-memory backend using a `RwLock` around a `BTreeMap`.
pub struct InMemoryBackend {
    records: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn keys_with_prefix(map: &BTreeMap<String, Vec<u8>>, prefix: &str) -> Vec<String> {
    map.range(prefix.to_string()..)
        .take_while(|(key, _)| key.starts_with(prefix))
        .map(|(key, _)| key.clone())
        .collect()
}

impl StoreBackend for InMemoryBackend {
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.records
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let guard = self
            .records
            .read()
            .map_err(|_| StoreError::Poisoned)?;
        Ok(guard.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.records
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .remove(key);
        Ok(())
    }

    fn apply(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        // One write lock for the whole batch keeps it atomic for readers.
        let mut guard = self
            .records
            .write()
            .map_err(|_| StoreError::Poisoned)?;
        for op in ops {
            match op {
                WriteOp::Put { key, value } => {
                    guard.insert(key, value);
                }
                WriteOp::Delete { key } => {
                    guard.remove(&key);
                }
                WriteOp::DeletePrefix { prefix } => {
                    for key in keys_with_prefix(&guard, &prefix) {
                        guard.remove(&key);
                    }
                }
            }
        }
        Ok(())
    }

    fn scan_prefix(
        &self,
        prefix: &str,
        visitor: &mut dyn FnMut(&str, &[u8]) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let guard = self
            .records
            .read()
            .map_err(|_| StoreError::Poisoned)?;
        for (key, value) in guard
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
        {
            visitor(key, value)?;
        }
        Ok(())
    }
}

#[cfg(feature = "backend-redb")]
pub mod redb;

#[cfg(feature = "backend-redb")]
pub use self::redb::RedbBackend;
