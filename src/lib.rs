//! Workspace umbrella crate for the territorial matching engine.
//!
//! Families from the social registry are matched against the municipal
//! gazetteer in a three-tier cascade (exact, address-only, fuzzy), and the
//! gazetteer is grown from a postal directory for codes it does not know.
//! This crate wires the component crates together:
//!
//! - [`Territory`] opens the store and builds every component from one
//!   [`TerritoryConfig`].
//! - [`lifecycle`] creates and refreshes the persisted match artifacts.
//! - [`enrich`] runs batched postal-directory enrichment.
//! - [`stats`] reports match coverage over the combined view.
//!
//! ```
//! use territory::{FamilyAddressRecord, NewGazetteerEntry, RefreshOptions, Territory};
//!
//! let territory = Territory::in_memory().unwrap();
//! territory
//!     .load_families(&[FamilyAddressRecord {
//!         ibge_code: Some("123".into()),
//!         family_code: Some("1".into()),
//!         street_name: Some("R. das Flores".into()),
//!         cep: Some("01001-000".into()),
//!         ..Default::default()
//!     }])
//!     .unwrap();
//! territory
//!     .load_gazetteer(vec![NewGazetteerEntry {
//!         address: "RUA DAS FLORES".into(),
//!         cep: Some("01001000".into()),
//!         ..Default::default()
//!     }])
//!     .unwrap();
//!
//! territory.manager().create_all().unwrap();
//! let report = territory.manager().refresh("all", &RefreshOptions::default()).unwrap();
//! assert!(report.failed.is_empty());
//! ```

pub mod config;
pub mod enrich;
pub mod error;
pub mod lifecycle;
pub mod stats;

use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;

pub use canonical::{AddressKey, AddressNormalizer, Cep, NormalizeConfig, normalize_address};
pub use lookup::{
    LookupClient, LookupConfig, LookupError, LookupOrigin, PostalDirectory, StaticLookup,
    ViaCepClient,
};
pub use matcher::{FamilyTerritory, MatchConfig, MatchTier, TerritoryAttributes, TierMatch};
pub use store::{
    ArtifactMeta, BackendConfig, CachedLookup, CepCacheEntry, CleanFamily, FamilyAddressRecord,
    FamilyKey, GazetteerEntry, NewGazetteerEntry, PostalAddress, StagedEntry, StoreError,
    TerritoryStore,
};

pub use config::{ConfigLoadError, TerritoryConfig};
pub use enrich::{
    CodeOutcome, CodeStatus, Enricher, EnrichmentConfig, EnrichmentRunResult, MergeResult,
};
pub use error::{EnrichError, LifecycleError, TerritoryError};
pub use lifecycle::{
    Action, ArtifactKind, ArtifactManager, ArtifactStatus, RefreshOptions, RefreshOutcome,
    RefreshReport, SkipReason,
};
pub use stats::{
    DEFAULT_WINDOW_DAYS, MatchStats, Report, StatsReporter, UnmatchedFamily, WindowedAnalysis,
};

/// The engine's components, built over one store.
pub struct Territory {
    config: TerritoryConfig,
    store: TerritoryStore,
    normalizer: AddressNormalizer,
    manager: ArtifactManager,
}

impl Territory {
    /// Open the configured backend and build every component.
    pub fn open(config: TerritoryConfig) -> Result<Self, TerritoryError> {
        config.validate()?;
        let store = TerritoryStore::open(&config.store.to_backend_config())?;
        Self::with_store(config, store)
    }

    /// Default configuration over a fresh in-memory store.
    pub fn in_memory() -> Result<Self, TerritoryError> {
        Self::with_store(TerritoryConfig::default(), TerritoryStore::in_memory())
    }

    pub fn with_store(
        config: TerritoryConfig,
        store: TerritoryStore,
    ) -> Result<Self, TerritoryError> {
        config.validate()?;
        let normalizer = AddressNormalizer::new(&config.normalizer.to_normalize_config())?;
        let manager = ArtifactManager::new(store.clone(), normalizer.clone(), &config.matcher)?;
        Ok(Self {
            config,
            store,
            normalizer,
            manager,
        })
    }

    pub fn config(&self) -> &TerritoryConfig {
        &self.config
    }

    pub fn store(&self) -> &TerritoryStore {
        &self.store
    }

    pub fn normalizer(&self) -> &AddressNormalizer {
        &self.normalizer
    }

    pub fn manager(&self) -> &ArtifactManager {
        &self.manager
    }

    pub fn reporter(&self) -> StatsReporter {
        StatsReporter::new(self.store.clone(), self.normalizer.clone())
    }

    /// Replace the registry snapshot.
    pub fn load_families(&self, records: &[FamilyAddressRecord]) -> Result<usize, TerritoryError> {
        Ok(self.store.families().replace(records)?)
    }

    /// Append gazetteer rows; returns how many were added.
    pub fn load_gazetteer(&self, entries: Vec<NewGazetteerEntry>) -> Result<usize, TerritoryError> {
        Ok(self.store.gazetteer().append(entries, &self.normalizer)?.len())
    }

    /// The postal directory named by `lookup.provider`.
    pub fn directory(&self) -> Result<Arc<dyn PostalDirectory>, TerritoryError> {
        let lookup = &self.config.lookup;
        match lookup.provider.as_str() {
            "static" => {
                let stub = match &lookup.fixtures {
                    Some(path) => load_fixtures(path)?,
                    None => StaticLookup::new(),
                };
                Ok(Arc::new(stub))
            }
            _ => Ok(Arc::new(ViaCepClient::new(&lookup.client)?)),
        }
    }

    /// An enricher over the configured directory.
    pub fn enricher(&self) -> Result<Enricher, TerritoryError> {
        self.enricher_with(self.directory()?)
    }

    pub fn enricher_with(
        &self,
        directory: Arc<dyn PostalDirectory>,
    ) -> Result<Enricher, TerritoryError> {
        let client = LookupClient::new(directory, self.store.clone(), &self.config.lookup.client)?;
        Ok(Enricher::new(
            self.store.clone(),
            client,
            self.normalizer.clone(),
            self.config.enrichment.clone(),
        )?)
    }

    /// Move staged lookups into the gazetteer.
    pub fn merge_staging(&self) -> Result<MergeResult, TerritoryError> {
        Ok(enrich::merge_staging(&self.store, &self.normalizer)?)
    }
}

/// Fixture file: a JSON object from postal code to address.
fn load_fixtures(path: &str) -> Result<StaticLookup, TerritoryError> {
    let fixtures_error = |message: String| TerritoryError::Fixtures {
        path: path.to_string(),
        message,
    };
    let content = fs::read_to_string(path).map_err(|err| fixtures_error(err.to_string()))?;
    let entries: BTreeMap<String, PostalAddress> =
        serde_json::from_str(&content).map_err(|err| fixtures_error(err.to_string()))?;
    Ok(StaticLookup::from_entries(entries))
}
