use std::collections::{BTreeMap, BTreeSet};

use canonical::{AddressKey, AddressNormalizer, Cep};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::records::{GazetteerEntry, NewGazetteerEntry};
use crate::{encode, StoreError, TerritoryStore, WriteOp};

const GEO_PREFIX: &str = "geo/";
const GEO_CEP_PREFIX: &str = "geo_cep/";
const GEO_KEY_PREFIX: &str = "geo_key/";
const NEXT_ID_KEY: &str = "meta/gazetteer_next_id";

/// Normalized address line of one gazetteer row, stamped with the rules
/// version that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StoredAddressKey {
    version: u32,
    key: Option<AddressKey>,
}

fn entry_key(id: u64) -> String {
    format!("{GEO_PREFIX}{id:012}")
}

fn address_key_key(id: u64) -> String {
    format!("{GEO_KEY_PREFIX}{id:012}")
}

fn cep_key(cep: &Cep, id: u64) -> String {
    format!("{GEO_CEP_PREFIX}{cep}/{id:012}")
}

/// The municipal gazetteer. Append-only: rows are never edited in place.
///
/// Two derivations are kept next to the rows: a postal-code presence index
/// and the normalized address-key index.
pub struct GazetteerTable<'a> {
    store: &'a TerritoryStore,
}

impl<'a> GazetteerTable<'a> {
    pub(crate) fn new(store: &'a TerritoryStore) -> Self {
        Self { store }
    }

    /// Append rows in one transaction, assigning ascending ids. The address
    /// key of each row is written alongside it.
    pub fn append(
        &self,
        entries: Vec<NewGazetteerEntry>,
        normalizer: &AddressNormalizer,
    ) -> Result<Vec<GazetteerEntry>, StoreError> {
        let mut next_id: u64 = self.store.get_value(NEXT_ID_KEY)?.unwrap_or(1);
        let mut ops = Vec::with_capacity(entries.len() * 3 + 1);
        let mut appended = Vec::with_capacity(entries.len());

        for new in entries {
            let entry = GazetteerEntry::from_new(next_id, new);
            next_id += 1;
            ops.push(WriteOp::put(entry_key(entry.id), encode(&entry)?));
            if let Some(cep) = &entry.cep {
                ops.push(WriteOp::put(cep_key(cep, entry.id), Vec::new()));
            }
            let stored = StoredAddressKey {
                version: normalizer.version(),
                key: normalizer.normalize(&entry.address),
            };
            ops.push(WriteOp::put(address_key_key(entry.id), encode(&stored)?));
            appended.push(entry);
        }

        ops.push(WriteOp::put(NEXT_ID_KEY, encode(&next_id)?));
        self.store.backend().apply(ops)?;
        Ok(appended)
    }

    /// Every row, ordered by id.
    pub fn all(&self) -> Result<Vec<GazetteerEntry>, StoreError> {
        self.store.scan_values(GEO_PREFIX)
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.store.scan_keys(GEO_PREFIX)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    pub fn contains_cep(&self, cep: &Cep) -> Result<bool, StoreError> {
        Ok(!self
            .store
            .scan_keys(&format!("{GEO_CEP_PREFIX}{cep}/"))?
            .is_empty())
    }

    /// Distinct normalized postal codes present in the gazetteer.
    pub fn ceps(&self) -> Result<BTreeSet<Cep>, StoreError> {
        let mut ceps = BTreeSet::new();
        for key in self.store.scan_keys(GEO_CEP_PREFIX)? {
            let code = key[GEO_CEP_PREFIX.len()..]
                .split('/')
                .next()
                .unwrap_or_default();
            if let Some(cep) = Cep::parse(code) {
                ceps.insert(cep);
            }
        }
        Ok(ceps)
    }

    /// Bring the address-key index in line with `normalizer`: rows with no
    /// stored key, or a key from another rules version, are recomputed.
    /// Returns the number of rows rewritten.
    pub fn ensure_address_index(
        &self,
        normalizer: &AddressNormalizer,
    ) -> Result<usize, StoreError> {
        let stored = self.stored_keys()?;
        let mut ops = Vec::new();
        for entry in self.all()? {
            let current = stored
                .get(&entry.id)
                .is_some_and(|s| s.version == normalizer.version());
            if current {
                continue;
            }
            let fresh = StoredAddressKey {
                version: normalizer.version(),
                key: normalizer.normalize(&entry.address),
            };
            ops.push(WriteOp::put(address_key_key(entry.id), encode(&fresh)?));
        }

        let rebuilt = ops.len();
        if rebuilt > 0 {
            self.store.backend().apply(ops)?;
            info!(
                rebuilt,
                normalizer_version = normalizer.version(),
                "gazetteer_address_index_rebuilt"
            );
        }
        Ok(rebuilt)
    }

    /// Address keys by gazetteer id, rebuilt first if stale.
    pub fn address_keys(
        &self,
        normalizer: &AddressNormalizer,
    ) -> Result<BTreeMap<u64, Option<AddressKey>>, StoreError> {
        self.ensure_address_index(normalizer)?;
        Ok(self
            .stored_keys()?
            .into_iter()
            .map(|(id, stored)| (id, stored.key))
            .collect())
    }

    fn stored_keys(&self) -> Result<BTreeMap<u64, StoredAddressKey>, StoreError> {
        let mut keys = BTreeMap::new();
        self.store
            .backend()
            .scan_prefix(GEO_KEY_PREFIX, &mut |key, bytes| {
                let id = key[GEO_KEY_PREFIX.len()..]
                    .parse::<u64>()
                    .map_err(|e| StoreError::Decode(format!("bad gazetteer key {key}: {e}")))?;
                keys.insert(id, crate::decode(bytes)?);
                Ok(())
            })?;
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canonical::{Abbreviation, NormalizeConfig};

    fn new_entry(address: &str, cep: Option<&str>) -> NewGazetteerEntry {
        NewGazetteerEntry {
            address: address.into(),
            cep: cep.map(str::to_string),
            general_zone: Some(3),
            ..Default::default()
        }
    }

    #[test]
    fn append_assigns_ascending_ids() {
        let store = TerritoryStore::in_memory();
        let geo = store.gazetteer();
        let normalizer = AddressNormalizer::default();

        let first = geo
            .append(vec![new_entry("RUA A", Some("01001-000"))], &normalizer)
            .unwrap();
        let second = geo
            .append(
                vec![new_entry("RUA B", None), new_entry("RUA C", Some("0100"))],
                &normalizer,
            )
            .unwrap();

        assert_eq!(first[0].id, 1);
        assert_eq!(second.iter().map(|e| e.id).collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(second[1].cep, None, "malformed cep must normalize to absent");
        assert_eq!(geo.len().unwrap(), 3);
        assert_eq!(
            geo.all().unwrap().iter().map(|e| e.address.as_str()).collect::<Vec<_>>(),
            vec!["RUA A", "RUA B", "RUA C"]
        );
    }

    #[test]
    fn cep_presence_index() {
        let store = TerritoryStore::in_memory();
        let geo = store.gazetteer();
        geo.append(
            vec![
                new_entry("RUA A", Some("01001000")),
                new_entry("RUA B", Some("01001-000")),
                new_entry("RUA C", Some("02002000")),
            ],
            &AddressNormalizer::default(),
        )
        .unwrap();

        assert!(geo.contains_cep(&Cep::parse("01001000").unwrap()).unwrap());
        assert!(!geo.contains_cep(&Cep::parse("03003000").unwrap()).unwrap());
        assert_eq!(
            geo.ceps().unwrap().into_iter().map(String::from).collect::<Vec<_>>(),
            vec!["01001000", "02002000"]
        );
    }

    #[test]
    fn address_index_follows_normalizer_version() {
        let store = TerritoryStore::in_memory();
        let geo = store.gazetteer();
        let v1 = AddressNormalizer::default();
        geo.append(vec![new_entry("STA. CRUZ", Some("01001000"))], &v1)
            .unwrap();

        assert_eq!(geo.ensure_address_index(&v1).unwrap(), 0);
        let keys = geo.address_keys(&v1).unwrap();
        assert_eq!(keys[&1].as_ref().map(AddressKey::as_str), Some("STA. CRUZ"));

        let v2 = AddressNormalizer::new(&NormalizeConfig {
            version: 2,
            abbreviations: vec![Abbreviation::new("STA", "SANTA")],
        })
        .unwrap();
        let keys = geo.address_keys(&v2).unwrap();
        assert_eq!(keys[&1].as_ref().map(AddressKey::as_str), Some("SANTA CRUZ"));
        assert_eq!(geo.ensure_address_index(&v2).unwrap(), 0);
    }
}
