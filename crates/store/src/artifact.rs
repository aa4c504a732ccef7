//! Persisted, generation-versioned result sets ("artifacts").
//!
//! An artifact is a named list of rows plus a metadata record. Rows live under
//! `artifact/<name>/<generation>/`; the metadata names the current generation,
//! so a swap to a new generation is a single atomic write.
//!
//! Two refresh modes exist:
//!
//! - [`RefreshMode::Concurrent`] never waits. It needs a unique index on the
//!   artifact and is refused while another writer holds the artifact.
//! - [`RefreshMode::Blocking`] waits for the writer lease and has no
//!   index requirement.

use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::records::CleanFamily;
use crate::{encode, StoreError, TerritoryStore, WriteOp};

const META_PREFIX: &str = "artifact_meta/";
const ROWS_PREFIX: &str = "artifact/";

/// A row that can be stored in an artifact.
pub trait ArtifactRow: Serialize + DeserializeOwned {
    /// Key covered by the artifact's unique index.
    fn row_key(&self) -> String;
}

impl ArtifactRow for CleanFamily {
    fn row_key(&self) -> String {
        self.key.storage_key()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshMode {
    Concurrent,
    Blocking,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub name: String,
    /// Rows are unique per [`ArtifactRow::row_key`].
    pub unique_index: bool,
    pub generation: u64,
    pub row_count: u64,
    pub built_at: DateTime<Utc>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// Per-artifact writer leases shared by every handle of one store.
#[derive(Debug, Default)]
pub(crate) struct WriterLeases {
    busy: Mutex<HashSet<String>>,
    released: Condvar,
}

/// Exclusive right to write one artifact; released on drop.
#[derive(Debug)]
pub struct WriterLease {
    leases: Arc<WriterLeases>,
    name: String,
}

impl Drop for WriterLease {
    fn drop(&mut self) {
        let mut busy = self
            .leases
            .busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        busy.remove(&self.name);
        self.leases.released.notify_all();
    }
}

fn try_lease(leases: &Arc<WriterLeases>, name: &str) -> Option<WriterLease> {
    let mut busy = leases.busy.lock().unwrap_or_else(PoisonError::into_inner);
    if !busy.insert(name.to_string()) {
        return None;
    }
    Some(WriterLease {
        leases: Arc::clone(leases),
        name: name.to_string(),
    })
}

fn wait_lease(leases: &Arc<WriterLeases>, name: &str) -> WriterLease {
    let mut busy = leases.busy.lock().unwrap_or_else(PoisonError::into_inner);
    while busy.contains(name) {
        busy = leases
            .released
            .wait(busy)
            .unwrap_or_else(PoisonError::into_inner);
    }
    busy.insert(name.to_string());
    WriterLease {
        leases: Arc::clone(leases),
        name: name.to_string(),
    }
}

fn meta_key(name: &str) -> String {
    format!("{META_PREFIX}{name}")
}

fn generation_prefix(name: &str, generation: u64) -> String {
    format!("{ROWS_PREFIX}{name}/{generation:012}/")
}

pub struct ArtifactStore<'a> {
    store: &'a TerritoryStore,
}

impl<'a> ArtifactStore<'a> {
    pub(crate) fn new(store: &'a TerritoryStore) -> Self {
        Self { store }
    }

    pub fn meta(&self, name: &str) -> Result<Option<ArtifactMeta>, StoreError> {
        self.store.get_value(&meta_key(name))
    }

    pub fn exists(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.meta(name)?.is_some())
    }

    /// Metadata of every artifact, ordered by name.
    pub fn list(&self) -> Result<Vec<ArtifactMeta>, StoreError> {
        self.store.scan_values(META_PREFIX)
    }

    /// Take the writer lease without waiting, if nobody holds it.
    pub fn try_lease(&self, name: &str) -> Option<WriterLease> {
        try_lease(self.store.leases(), name)
    }

    /// Drop any previous incarnation and store `rows` as a fresh artifact.
    pub fn create<R: ArtifactRow>(
        &self,
        name: &str,
        rows: &[R],
        unique_index: bool,
    ) -> Result<ArtifactMeta, StoreError> {
        let _lease = wait_lease(self.store.leases(), name);
        let previous = self.meta(name)?;
        let meta = ArtifactMeta {
            name: name.to_string(),
            unique_index,
            generation: previous.map_or(1, |m| m.generation + 1),
            row_count: rows.len() as u64,
            built_at: Utc::now(),
            refreshed_at: None,
        };

        let mut ops = vec![WriteOp::delete_prefix(format!("{ROWS_PREFIX}{name}/"))];
        self.push_rows(&mut ops, &meta, rows)?;
        ops.push(WriteOp::put(meta_key(name), encode(&meta)?));
        self.store.backend().apply(ops)?;
        debug!(artifact = name, rows = meta.row_count, "artifact_stored");
        Ok(meta)
    }

    /// Remove the artifact and its rows. Returns whether it existed.
    pub fn drop(&self, name: &str) -> Result<bool, StoreError> {
        let _lease = wait_lease(self.store.leases(), name);
        let existed = self.exists(name)?;
        self.store.backend().apply(vec![
            WriteOp::delete_prefix(format!("{ROWS_PREFIX}{name}/")),
            WriteOp::delete(meta_key(name)),
        ])?;
        Ok(existed)
    }

    /// Rows of the current generation, or `None` if the artifact does not exist.
    pub fn rows<R: ArtifactRow>(&self, name: &str) -> Result<Option<Vec<R>>, StoreError> {
        match self.meta(name)? {
            Some(meta) => Ok(Some(
                self.store
                    .scan_values(&generation_prefix(name, meta.generation))?,
            )),
            None => Ok(None),
        }
    }

    /// Replace the rows of an existing artifact with `rows`.
    pub fn refresh<R: ArtifactRow>(
        &self,
        name: &str,
        rows: &[R],
        mode: RefreshMode,
    ) -> Result<ArtifactMeta, StoreError> {
        let _lease = match mode {
            RefreshMode::Concurrent => {
                let lease = try_lease(self.store.leases(), name).ok_or_else(|| {
                    StoreError::RefreshConflict {
                        artifact: name.to_string(),
                        reason: "another writer holds the artifact".into(),
                    }
                })?;
                if let Some(meta) = self.meta(name)? {
                    if !meta.unique_index {
                        return Err(StoreError::RefreshConflict {
                            artifact: name.to_string(),
                            reason: "artifact has no unique index".into(),
                        });
                    }
                }
                lease
            }
            RefreshMode::Blocking => wait_lease(self.store.leases(), name),
        };

        let previous = self
            .meta(name)?
            .ok_or_else(|| StoreError::ArtifactMissing(name.to_string()))?;
        let meta = ArtifactMeta {
            generation: previous.generation + 1,
            row_count: rows.len() as u64,
            refreshed_at: Some(Utc::now()),
            ..previous.clone()
        };

        let mut ops = Vec::with_capacity(rows.len() + 2);
        self.push_rows(&mut ops, &meta, rows)?;
        ops.push(WriteOp::put(meta_key(name), encode(&meta)?));
        ops.push(WriteOp::delete_prefix(generation_prefix(
            name,
            previous.generation,
        )));
        self.store.backend().apply(ops)?;
        debug!(artifact = name, ?mode, generation = meta.generation, "artifact_swapped");
        Ok(meta)
    }

    fn push_rows<R: ArtifactRow>(
        &self,
        ops: &mut Vec<WriteOp>,
        meta: &ArtifactMeta,
        rows: &[R],
    ) -> Result<(), StoreError> {
        let prefix = generation_prefix(&meta.name, meta.generation);
        let mut seen = HashSet::with_capacity(rows.len());
        for (ordinal, row) in rows.iter().enumerate() {
            let key = if meta.unique_index {
                let key = row.row_key();
                if !seen.insert(key.clone()) {
                    return Err(StoreError::UniqueViolation {
                        artifact: meta.name.clone(),
                        key,
                    });
                }
                key
            } else {
                format!("{ordinal:012}")
            };
            ops.push(WriteOp::put(format!("{prefix}{key}"), encode(row)?));
        }
        Ok(())
    }
}
