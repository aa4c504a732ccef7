//! Row types persisted by the store.
//!
//! Raw collaborator rows ([`FamilyAddressRecord`], [`NewGazetteerEntry`]) keep
//! their text exactly as delivered; derived rows carry the normalized forms
//! next to the raw ones so that display never loses information.

use std::fmt;

use canonical::{
    compose_street, normalize_code, normalize_text, parse_registry_date, AddressKey,
    AddressNormalizer, Cep,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Registry family key: administrative-area code plus family code, both
/// stripped of leading zeros.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FamilyKey {
    pub ibge: Option<String>,
    pub family_code: String,
}

impl FamilyKey {
    /// Normalizes both parts. A blank family code yields no key.
    pub fn new(ibge: Option<&str>, family_code: Option<&str>) -> Option<Self> {
        Some(Self {
            ibge: normalize_code(ibge),
            family_code: normalize_code(family_code)?,
        })
    }

    /// Stable, ordered string form used as a row key.
    pub fn storage_key(&self) -> String {
        format!(
            "{}:{}",
            self.ibge.as_deref().unwrap_or_default(),
            self.family_code
        )
    }
}

impl fmt::Display for FamilyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ibge {
            Some(ibge) => write!(f, "{ibge}/{}", self.family_code),
            None => write!(f, "-/{}", self.family_code),
        }
    }
}

/// One registry row as delivered by the registry collaborator. Read-only to
/// the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyAddressRecord {
    #[serde(default)]
    pub ibge_code: Option<String>,
    #[serde(default)]
    pub family_code: Option<String>,
    #[serde(default)]
    pub street_type: Option<String>,
    #[serde(default)]
    pub street_title: Option<String>,
    #[serde(default)]
    pub street_name: Option<String>,
    #[serde(default)]
    pub house_number: Option<String>,
    #[serde(default)]
    pub complement: Option<String>,
    #[serde(default)]
    pub cep: Option<String>,
    #[serde(default)]
    pub neighborhood: Option<String>,
    #[serde(default)]
    pub locality: Option<String>,
    /// Last registry update, in one of the registry's date formats.
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl FamilyAddressRecord {
    pub fn key(&self) -> Option<FamilyKey> {
        FamilyKey::new(self.ibge_code.as_deref(), self.family_code.as_deref())
    }

    /// Street type, title and name joined with single spaces.
    pub fn street(&self) -> String {
        compose_street(&[
            self.street_type.as_deref(),
            self.street_title.as_deref(),
            self.street_name.as_deref(),
        ])
    }
}

/// Row of the `families_clean` artifact: one per family key, with the
/// normalized forms the tiers join on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanFamily {
    pub key: FamilyKey,
    /// Composed street as written in the registry.
    pub street: String,
    pub street_key: Option<AddressKey>,
    pub house_number: Option<String>,
    pub complement: Option<String>,
    pub cep_raw: Option<String>,
    pub cep: Option<Cep>,
    pub neighborhood: Option<String>,
    pub locality: Option<String>,
    pub updated_at: Option<NaiveDate>,
}

impl CleanFamily {
    /// Derive the clean row; `None` when the record has no usable family key.
    pub fn from_record(
        record: &FamilyAddressRecord,
        normalizer: &AddressNormalizer,
    ) -> Option<Self> {
        let key = record.key()?;
        let street = record.street();
        Some(Self {
            key,
            street_key: normalizer.normalize(&street),
            street,
            house_number: normalize_text(record.house_number.as_deref()),
            complement: normalize_text(record.complement.as_deref()),
            cep_raw: normalize_text(record.cep.as_deref()),
            cep: Cep::parse_opt(record.cep.as_deref()),
            neighborhood: normalize_text(record.neighborhood.as_deref()),
            locality: normalize_text(record.locality.as_deref()),
            updated_at: parse_registry_date(record.updated_at.as_deref()),
        })
    }

    /// Street plus house number, for operator listings.
    pub fn display_address(&self) -> String {
        compose_street(&[Some(self.street.as_str()), self.house_number.as_deref()])
    }
}

/// A gazetteer row as supplied for insertion; the store assigns the id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewGazetteerEntry {
    pub address: String,
    #[serde(default)]
    pub neighborhood: Option<String>,
    #[serde(default)]
    pub cep: Option<String>,
    #[serde(default)]
    pub address_id: Option<i64>,
    #[serde(default)]
    pub city_id: Option<i64>,
    #[serde(default)]
    pub neighborhood_id: Option<i64>,
    /// General social-assistance zone (CRAS) identifier.
    #[serde(default)]
    pub general_zone: Option<i64>,
    /// Specialized social-assistance zone (CREAS) identifier.
    #[serde(default)]
    pub specialized_zone: Option<i64>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl NewGazetteerEntry {
    /// Entry built from a postal-directory lookup. Zones and coordinates stay
    /// absent; they are never invented.
    pub fn from_postal(cep: &Cep, postal: &PostalAddress) -> Self {
        Self {
            address: postal.street.clone().unwrap_or_default(),
            neighborhood: postal.neighborhood.clone(),
            cep: Some(cep.formatted()),
            ..Default::default()
        }
    }
}

/// A stored gazetteer row. Never edited once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GazetteerEntry {
    pub id: u64,
    pub address: String,
    pub neighborhood: Option<String>,
    pub cep_raw: Option<String>,
    pub cep: Option<Cep>,
    pub address_id: Option<i64>,
    pub city_id: Option<i64>,
    pub neighborhood_id: Option<i64>,
    pub general_zone: Option<i64>,
    pub specialized_zone: Option<i64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl GazetteerEntry {
    pub fn from_new(id: u64, entry: NewGazetteerEntry) -> Self {
        let cep_raw = normalize_text(entry.cep.as_deref());
        Self {
            id,
            cep: Cep::parse_opt(cep_raw.as_deref()),
            cep_raw,
            address: entry.address,
            neighborhood: normalize_text(entry.neighborhood.as_deref()),
            address_id: entry.address_id,
            city_id: entry.city_id,
            neighborhood_id: entry.neighborhood_id,
            general_zone: entry.general_zone,
            specialized_zone: entry.specialized_zone,
            latitude: entry.latitude,
            longitude: entry.longitude,
        }
    }
}

/// Street-level answer from the postal directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalAddress {
    pub street: Option<String>,
    pub neighborhood: Option<String>,
    pub locality: Option<String>,
    /// Federative unit (state) code.
    pub region: Option<String>,
}

impl PostalAddress {
    /// Whether the answer carries anything worth adding to the gazetteer.
    pub fn has_location(&self) -> bool {
        self.street.is_some() || self.neighborhood.is_some()
    }
}

/// Cached result of a postal-directory lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CachedLookup {
    Found(PostalAddress),
    /// Negative result; only written when negative caching is enabled.
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CepCacheEntry {
    pub cep: Cep,
    pub result: CachedLookup,
    pub cached_at: DateTime<Utc>,
}

/// A lookup result waiting to be merged into the gazetteer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedEntry {
    pub cep: Cep,
    pub address: PostalAddress,
    pub staged_at: DateTime<Utc>,
}
