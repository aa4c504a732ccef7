use std::fmt;

use canonical::Cep;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use store::{ArtifactRow, CleanFamily, FamilyKey, GazetteerEntry};
use thiserror::Error;

/// One strategy of the matching cascade. Declaration order is priority
/// order: a family matched by an earlier tier is never offered to a later one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    /// Same normalized postal code and same normalized address.
    Exact,
    /// Same normalized address, postal code ignored.
    AddressOnly,
    /// Trigram similarity of the normalized address at or above a threshold.
    Fuzzy,
}

impl MatchTier {
    pub const ALL: [MatchTier; 3] = [MatchTier::Exact, MatchTier::AddressOnly, MatchTier::Fuzzy];

    pub fn label(self) -> &'static str {
        match self {
            MatchTier::Exact => "exact",
            MatchTier::AddressOnly => "address",
            MatchTier::Fuzzy => "fuzzy",
        }
    }

    pub fn confidence(self) -> Confidence {
        match self {
            MatchTier::Exact => Confidence::High,
            MatchTier::AddressOnly => Confidence::Medium,
            MatchTier::Fuzzy => Confidence::Low,
        }
    }
}

impl fmt::Display for MatchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Canonical territory data copied from the gazetteer row a family matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerritoryAttributes {
    pub gazetteer_id: u64,
    pub cep: Option<Cep>,
    pub cep_raw: Option<String>,
    pub address: String,
    pub neighborhood: Option<String>,
    pub general_zone: Option<i64>,
    pub specialized_zone: Option<i64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl From<&GazetteerEntry> for TerritoryAttributes {
    fn from(entry: &GazetteerEntry) -> Self {
        Self {
            gazetteer_id: entry.id,
            cep: entry.cep.clone(),
            cep_raw: entry.cep_raw.clone(),
            address: entry.address.clone(),
            neighborhood: entry.neighborhood.clone(),
            general_zone: entry.general_zone,
            specialized_zone: entry.specialized_zone,
            latitude: entry.latitude,
            longitude: entry.longitude,
        }
    }
}

/// Row of a tier artifact: at most one per family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierMatch {
    pub family: FamilyKey,
    pub tier: MatchTier,
    /// 1.0 for exact and address matches, the trigram similarity for fuzzy ones.
    pub score: f64,
    pub territory: TerritoryAttributes,
}

impl ArtifactRow for TierMatch {
    fn row_key(&self) -> String {
        self.family.storage_key()
    }
}

/// Row of the combined view. Every family has one, matched or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyTerritory {
    pub family: FamilyKey,
    /// Registry address, for display only.
    pub street: String,
    pub house_number: Option<String>,
    pub neighborhood: Option<String>,
    /// The family's own postal code as registered.
    pub family_cep: Option<Cep>,
    pub updated_at: Option<NaiveDate>,
    pub tier: Option<MatchTier>,
    pub confidence: Option<Confidence>,
    pub territory: Option<TerritoryAttributes>,
}

impl FamilyTerritory {
    pub fn unmatched(family: &CleanFamily) -> Self {
        Self {
            family: family.key.clone(),
            street: family.street.clone(),
            house_number: family.house_number.clone(),
            neighborhood: family.neighborhood.clone(),
            family_cep: family.cep.clone(),
            updated_at: family.updated_at,
            tier: None,
            confidence: None,
            territory: None,
        }
    }

    pub fn matched(family: &CleanFamily, hit: &TierMatch) -> Self {
        Self {
            tier: Some(hit.tier),
            confidence: Some(hit.tier.confidence()),
            territory: Some(hit.territory.clone()),
            ..Self::unmatched(family)
        }
    }

    pub fn is_matched(&self) -> bool {
        self.tier.is_some()
    }

    /// Best available postal code: the matched gazetteer row's, else none.
    pub fn territory_cep(&self) -> Option<&Cep> {
        self.territory.as_ref().and_then(|t| t.cep.as_ref())
    }
}

impl ArtifactRow for FamilyTerritory {
    fn row_key(&self) -> String {
        self.family.storage_key()
    }
}

/// Tuning for the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Whether the fuzzy tier takes part in the cascade.
    pub fuzzy_enabled: bool,
    /// Minimum trigram similarity for a fuzzy match, in (0.0, 1.0].
    pub fuzzy_threshold: f64,
}

impl MatchConfig {
    pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.6;

    pub fn validate(&self) -> Result<(), MatchError> {
        if !(self.fuzzy_threshold > 0.0 && self.fuzzy_threshold <= 1.0) {
            return Err(MatchError::InvalidConfig(format!(
                "fuzzy_threshold must be in (0.0, 1.0], got {}",
                self.fuzzy_threshold
            )));
        }
        Ok(())
    }
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            fuzzy_enabled: true,
            fuzzy_threshold: Self::DEFAULT_FUZZY_THRESHOLD,
        }
    }
}

/// Errors produced by the matching layer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MatchError {
    #[error("invalid match config: {0}")]
    InvalidConfig(String),
    /// The tier was requested but is switched off in the config.
    #[error("match tier {0} is disabled")]
    TierDisabled(MatchTier),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_are_ordered_by_priority() {
        let mut tiers = vec![MatchTier::Fuzzy, MatchTier::Exact, MatchTier::AddressOnly];
        tiers.sort();
        assert_eq!(tiers, MatchTier::ALL);
        assert_eq!(MatchTier::Exact.confidence(), Confidence::High);
        assert_eq!(MatchTier::Fuzzy.to_string(), "fuzzy");
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = MatchConfig::default();
        assert!(cfg.validate().is_ok());
        assert!(cfg.fuzzy_enabled);
        assert_eq!(cfg.fuzzy_threshold, 0.6);
    }

    #[test]
    fn threshold_out_of_range_rejected() {
        for bad in [0.0, -0.1, 1.5, f64::NAN] {
            let cfg = MatchConfig {
                fuzzy_threshold: bad,
                ..MatchConfig::default()
            };
            match cfg.validate() {
                Err(MatchError::InvalidConfig(msg)) => assert!(msg.contains("fuzzy_threshold")),
                other => panic!("threshold {bad} accepted: {other:?}"),
            }
        }
    }

    #[test]
    fn tier_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&MatchTier::AddressOnly).unwrap(),
            "\"address_only\""
        );
    }
}
