//! Redb backend for the territory store.
//!
//! Every logical table shares one redb table; prefixes keep them apart and
//! redb's ordered keys give prefix scans for free. Each `apply` call is one
//! write transaction, so an artifact swap is all-or-nothing on disk.
//!
//! ```yaml
//! store:
//!   backend: "redb"
//!   path: "/var/lib/territory/territory.redb"
//! ```

use crate::{StoreBackend, StoreError, WriteOp};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

const TERRITORY_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("territory_data");

/// Redb backend implementation for persistent key-value storage.
pub struct RedbBackend {
    db: Arc<Database>,
}

impl RedbBackend {
    /// Open or create a redb database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(StoreError::backend)?;

        let write_txn = db.begin_write().map_err(StoreError::backend)?;
        {
            // Opening the table inside a write transaction creates it.
            let _table = write_txn
                .open_table(TERRITORY_TABLE)
                .map_err(StoreError::backend)?;
        }
        write_txn.commit().map_err(StoreError::backend)?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl StoreBackend for RedbBackend {
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.apply(vec![WriteOp::put(key, value.to_vec())])
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let read_txn = self.db.begin_read().map_err(StoreError::backend)?;
        let table = read_txn
            .open_table(TERRITORY_TABLE)
            .map_err(StoreError::backend)?;

        match table.get(key).map_err(StoreError::backend)? {
            Some(value) => Ok(Some(value.value().to_vec())),
            None => Ok(None),
        }
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.apply(vec![WriteOp::delete(key)])
    }

    fn apply(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write().map_err(StoreError::backend)?;

        {
            let mut table = write_txn
                .open_table(TERRITORY_TABLE)
                .map_err(StoreError::backend)?;

            for op in ops {
                match op {
                    WriteOp::Put { key, value } => {
                        table
                            .insert(key.as_str(), value.as_slice())
                            .map_err(StoreError::backend)?;
                    }
                    WriteOp::Delete { key } => {
                        table.remove(key.as_str()).map_err(StoreError::backend)?;
                    }
                    WriteOp::DeletePrefix { prefix } => {
                        let mut doomed = Vec::new();
                        for item in table
                            .range(prefix.as_str()..)
                            .map_err(StoreError::backend)?
                        {
                            let (key, _) = item.map_err(StoreError::backend)?;
                            let key = key.value();
                            if !key.starts_with(prefix.as_str()) {
                                break;
                            }
                            doomed.push(key.to_string());
                        }
                        for key in doomed {
                            table.remove(key.as_str()).map_err(StoreError::backend)?;
                        }
                    }
                }
            }
        }

        write_txn.commit().map_err(StoreError::backend)?;
        Ok(())
    }

    fn scan_prefix(
        &self,
        prefix: &str,
        visitor: &mut dyn FnMut(&str, &[u8]) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let read_txn = self.db.begin_read().map_err(StoreError::backend)?;
        let table = read_txn
            .open_table(TERRITORY_TABLE)
            .map_err(StoreError::backend)?;

        for item in table.range(prefix..).map_err(StoreError::backend)? {
            let (key, value) = item.map_err(StoreError::backend)?;
            let key = key.value();
            if !key.starts_with(prefix) {
                break;
            }
            visitor(key, value.value())?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn redb_backend_roundtrip() {
        let temp_file = NamedTempFile::new().unwrap();
        let backend = RedbBackend::open(temp_file.path()).unwrap();

        backend.put("cep_cache/01001000", b"value1").unwrap();
        assert_eq!(
            backend.get("cep_cache/01001000").unwrap(),
            Some(b"value1".to_vec())
        );
        assert_eq!(backend.get("cep_cache/99999999").unwrap(), None);

        backend.delete("cep_cache/01001000").unwrap();
        assert_eq!(backend.get("cep_cache/01001000").unwrap(), None);
    }

    #[test]
    fn redb_backend_prefix_scan_and_delete() {
        let temp_file = NamedTempFile::new().unwrap();
        let backend = RedbBackend::open(temp_file.path()).unwrap();

        backend
            .apply(vec![
                WriteOp::put("geo/000000000002", b"b".to_vec()),
                WriteOp::put("geo/000000000001", b"a".to_vec()),
                WriteOp::put("geo_cep/01001000/000000000001", Vec::new()),
            ])
            .unwrap();

        let mut seen = Vec::new();
        backend
            .scan_prefix("geo/", &mut |key, value| {
                seen.push((key.to_string(), value.to_vec()));
                Ok(())
            })
            .unwrap();
        assert_eq!(
            seen,
            vec![
                ("geo/000000000001".to_string(), b"a".to_vec()),
                ("geo/000000000002".to_string(), b"b".to_vec()),
            ]
        );

        backend.apply(vec![WriteOp::delete_prefix("geo/")]).unwrap();
        let mut remaining = 0;
        backend
            .scan_prefix("geo", &mut |_, _| {
                remaining += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(remaining, 1, "geo_cep/ entry must survive");
    }

    #[test]
    fn redb_backend_survives_reopen() {
        let temp_file = NamedTempFile::new().unwrap();
        {
            let backend = RedbBackend::open(temp_file.path()).unwrap();
            backend.put("k", b"v").unwrap();
        }
        let backend = RedbBackend::open(temp_file.path()).unwrap();
        assert_eq!(backend.get("k").unwrap(), Some(b"v".to_vec()));
    }
}
