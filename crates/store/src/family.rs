use crate::records::FamilyAddressRecord;
use crate::{encode, StoreError, TerritoryStore, WriteOp};

pub(crate) const FAMILY_PREFIX: &str = "family/";

/// Snapshot of the registry's family address rows.
///
/// The registry collaborator owns these rows; the engine only reads them.
pub struct FamilyTable<'a> {
    store: &'a TerritoryStore,
}

impl<'a> FamilyTable<'a> {
    pub(crate) fn new(store: &'a TerritoryStore) -> Self {
        Self { store }
    }

    /// Replace the whole snapshot in one transaction, preserving input order.
    pub fn replace(&self, records: &[FamilyAddressRecord]) -> Result<usize, StoreError> {
        let mut ops = Vec::with_capacity(records.len() + 1);
        ops.push(WriteOp::delete_prefix(FAMILY_PREFIX));
        for (ordinal, record) in records.iter().enumerate() {
            ops.push(WriteOp::put(
                format!("{FAMILY_PREFIX}{ordinal:012}"),
                encode(record)?,
            ));
        }
        self.store.backend().apply(ops)?;
        Ok(records.len())
    }

    /// Every row, in load order.
    pub fn all(&self) -> Result<Vec<FamilyAddressRecord>, StoreError> {
        self.store.scan_values(FAMILY_PREFIX)
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.store.scan_keys(FAMILY_PREFIX)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(code: &str) -> FamilyAddressRecord {
        FamilyAddressRecord {
            family_code: Some(code.into()),
            ..Default::default()
        }
    }

    #[test]
    fn replace_swaps_the_snapshot() {
        let store = TerritoryStore::in_memory();
        let families = store.families();
        families
            .replace(&[record("1"), record("2"), record("3")])
            .unwrap();
        assert_eq!(families.len().unwrap(), 3);

        families.replace(&[record("9")]).unwrap();
        let rows = families.all().unwrap();
        assert_eq!(rows, vec![record("9")]);
    }
}
