//! YAML configuration for the territory engine.
//!
//! One file configures every component. Each section is optional and every
//! field has a default, so an empty document with just a version is valid.
//!
//! ## Example YAML Configuration
//!
//! ```yaml
//! version: "1.0"
//! name: "municipality-prod"
//!
//! store:
//!   backend: "redb"
//!   path: "/var/lib/territory/territory.redb"
//!
//! normalizer:
//!   version: 1
//!
//! matcher:
//!   fuzzy_enabled: true
//!   fuzzy_threshold: 0.6
//!
//! lookup:
//!   provider: "viacep"
//!   base_url: "https://viacep.com.br/ws"
//!   timeout: 10000
//!   rate_limit:
//!     min_interval: 1100
//!     burst_size: 1
//!   retry:
//!     max_retries: 2
//!   cache_not_found: false
//!
//! enrichment:
//!   default_batch_size: 200
//!   max_batch_size: 500
//!   max_errors: 20
//!   auto_merge: true
//!
//! stats:
//!   window_days: 730
//! ```

use std::fs;
use std::path::Path;

use canonical::{Abbreviation, NormalizeConfig, default_abbreviations};
use lookup::LookupConfig;
use matcher::MatchConfig;
use serde::{Deserialize, Serialize};
use store::BackendConfig;
use thiserror::Error;

use crate::enrich::EnrichmentConfig;
use crate::stats::DEFAULT_WINDOW_DAYS;

/// Errors that can occur when loading YAML configuration files
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),

    #[error("missing required field: {0}")]
    MissingField(String),
}

/// Top-level YAML configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TerritoryConfig {
    /// Configuration format version
    pub version: String,

    /// Optional configuration name/description
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub store: StoreYamlConfig,

    #[serde(default)]
    pub normalizer: NormalizerYamlConfig,

    #[serde(default)]
    pub matcher: MatchConfig,

    #[serde(default)]
    pub lookup: LookupYamlConfig,

    #[serde(default)]
    pub enrichment: EnrichmentConfig,

    #[serde(default)]
    pub stats: StatsYamlConfig,
}

impl TerritoryConfig {
    /// Load a YAML configuration file from the given path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: TerritoryConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        self.store.validate()?;
        self.normalizer.validate()?;
        self.matcher
            .validate()
            .map_err(|err| ConfigLoadError::Validation(format!("matcher: {err}")))?;
        self.lookup.validate()?;
        self.enrichment
            .validate()
            .map_err(|err| ConfigLoadError::Validation(format!("enrichment: {err}")))?;
        self.stats.validate()?;

        Ok(())
    }
}

impl Default for TerritoryConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            name: None,
            store: StoreYamlConfig::default(),
            normalizer: NormalizerYamlConfig::default(),
            matcher: MatchConfig::default(),
            lookup: LookupYamlConfig::default(),
            enrichment: EnrichmentConfig::default(),
            stats: StatsYamlConfig::default(),
        }
    }
}

/// Store YAML configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreYamlConfig {
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Database file; required by the redb backend.
    #[serde(default)]
    pub path: Option<String>,
}

impl StoreYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        let valid_backends = ["in_memory", "redb"];
        if !valid_backends.contains(&self.backend.as_str()) {
            return Err(ConfigLoadError::Validation(format!(
                "store.backend must be one of: {valid_backends:?}"
            )));
        }
        if self.backend == "redb" && self.path.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigLoadError::MissingField("store.path".to_string()));
        }
        Ok(())
    }

    pub fn to_backend_config(&self) -> BackendConfig {
        match (self.backend.as_str(), &self.path) {
            ("redb", Some(path)) => BackendConfig::redb(path.clone()),
            _ => BackendConfig::in_memory(),
        }
    }
}

impl Default for StoreYamlConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: None,
        }
    }
}

/// Address normalizer YAML configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerYamlConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Replaces the built-in abbreviation table when set.
    #[serde(default)]
    pub abbreviations: Option<Vec<Abbreviation>>,

    /// Added on top of the active table.
    #[serde(default)]
    pub extra_abbreviations: Vec<Abbreviation>,
}

impl NormalizerYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        self.to_normalize_config()
            .validate()
            .map_err(|err| ConfigLoadError::Validation(format!("normalizer: {err}")))
    }

    pub fn to_normalize_config(&self) -> NormalizeConfig {
        let mut abbreviations = self
            .abbreviations
            .clone()
            .unwrap_or_else(default_abbreviations);
        abbreviations.extend(self.extra_abbreviations.iter().cloned());
        NormalizeConfig {
            version: self.version,
            abbreviations,
        }
    }
}

impl Default for NormalizerYamlConfig {
    fn default() -> Self {
        Self {
            version: 1,
            abbreviations: None,
            extra_abbreviations: Vec::new(),
        }
    }
}

/// Postal directory YAML configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupYamlConfig {
    /// `viacep` for the public directory, `static` for a fixture file.
    #[serde(default = "default_provider")]
    pub provider: String,

    /// JSON object mapping postal codes to addresses, for the static provider.
    #[serde(default)]
    pub fixtures: Option<String>,

    #[serde(flatten)]
    pub client: LookupConfig,
}

impl LookupYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        let valid_providers = ["viacep", "static"];
        if !valid_providers.contains(&self.provider.as_str()) {
            return Err(ConfigLoadError::Validation(format!(
                "lookup.provider must be one of: {valid_providers:?}"
            )));
        }
        self.client
            .validate()
            .map_err(|err| ConfigLoadError::Validation(format!("lookup: {err}")))
    }
}

impl Default for LookupYamlConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            fixtures: None,
            client: LookupConfig::default(),
        }
    }
}

/// Statistics YAML configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsYamlConfig {
    /// Default window of the windowed analysis.
    #[serde(default = "default_window_days")]
    pub window_days: u32,
}

impl StatsYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.window_days == 0 {
            return Err(ConfigLoadError::Validation(
                "stats.window_days must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for StatsYamlConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
        }
    }
}

fn default_version() -> u32 {
    1
}
fn default_backend() -> String {
    "in_memory".to_string()
}
fn default_provider() -> String {
    "viacep".to_string()
}
fn default_window_days() -> u32 {
    DEFAULT_WINDOW_DAYS
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_valid_yaml() {
        let yaml = r#"
version: "1.0"
name: "test config"
matcher:
  fuzzy_enabled: false
lookup:
  cache_not_found: true
"#;

        let config = TerritoryConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.name, Some("test config".to_string()));
        assert!(!config.matcher.fuzzy_enabled);
        assert_eq!(config.matcher.fuzzy_threshold, 0.6);
        assert!(config.lookup.client.cache_not_found);
        assert_eq!(config.lookup.provider, "viacep");
    }

    #[test]
    fn test_load_from_file() {
        let yaml = r#"
version: "1"
store:
  backend: "in_memory"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml.as_bytes()).unwrap();

        let config = TerritoryConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.store.to_backend_config(), BackendConfig::InMemory);
    }

    #[test]
    fn test_default_config() {
        let config = TerritoryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.stats.window_days, 730);
        assert_eq!(config.enrichment.default_batch_size, 200);
        assert_eq!(
            config.lookup.client.rate_limit.min_interval,
            Duration::from_millis(1100)
        );
    }

    #[test]
    fn test_version_validation() {
        let err = TerritoryConfig::from_yaml("version: \"2\"\n").unwrap_err();
        assert!(matches!(err, ConfigLoadError::UnsupportedVersion(v) if v == "2"));
    }

    #[test]
    fn test_redb_requires_path() {
        let yaml = r#"
version: "1.0"
store:
  backend: "redb"
"#;
        let err = TerritoryConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, ConfigLoadError::MissingField(f) if f == "store.path"));

        let yaml = r#"
version: "1.0"
store:
  backend: "rocks"
"#;
        let err = TerritoryConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("store.backend"));
    }

    #[test]
    fn test_section_validation() {
        let yaml = r#"
version: "1.0"
matcher:
  fuzzy_threshold: 1.5
"#;
        let err = TerritoryConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("fuzzy_threshold"));

        let yaml = r#"
version: "1.0"
enrichment:
  default_batch_size: 0
"#;
        let err = TerritoryConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("default_batch_size"));

        let yaml = r#"
version: "1.0"
lookup:
  provider: "correios"
"#;
        assert!(TerritoryConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_extra_abbreviations_extend_table() {
        let yaml = r#"
version: "1.0"
normalizer:
  extra_abbreviations:
    - short: "VL"
      expansion: "VILA"
"#;
        let config = TerritoryConfig::from_yaml(yaml).unwrap();
        let normalize = config.normalizer.to_normalize_config();
        assert_eq!(
            normalize.abbreviations.len(),
            default_abbreviations().len() + 1
        );

        let yaml = r#"
version: "1.0"
normalizer:
  abbreviations:
    - short: "R"
      expansion: "RUA R"
"#;
        assert!(TerritoryConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_full_yaml() {
        let yaml = r#"
version: "1.0"
name: "production"
store:
  backend: "redb"
  path: "/tmp/territory.redb"
normalizer:
  version: 1
matcher:
  fuzzy_enabled: true
  fuzzy_threshold: 0.7
lookup:
  provider: "static"
  fixtures: "fixtures/ceps.json"
  base_url: "http://localhost:8080/ws"
  timeout: 2000
  rate_limit:
    min_interval: 250
    burst_size: 2
  retry:
    max_retries: 4
enrichment:
  default_batch_size: 50
  max_batch_size: 100
  max_errors: 5
  auto_merge: false
stats:
  window_days: 365
"#;

        let config = TerritoryConfig::from_yaml(yaml).unwrap();
        assert_eq!(
            config.store.to_backend_config(),
            BackendConfig::redb("/tmp/territory.redb")
        );
        assert_eq!(config.matcher.fuzzy_threshold, 0.7);
        assert_eq!(config.lookup.provider, "static");
        assert_eq!(config.lookup.fixtures.as_deref(), Some("fixtures/ceps.json"));
        assert_eq!(config.lookup.client.timeout, Duration::from_secs(2));
        assert_eq!(config.lookup.client.rate_limit.burst_size, 2);
        assert_eq!(config.lookup.client.retry.max_retries, 4);
        assert_eq!(config.enrichment.max_batch_size, 100);
        assert!(!config.enrichment.auto_merge);
        assert_eq!(config.stats.window_days, 365);
    }
}
