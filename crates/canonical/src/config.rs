//! Configuration types for the address normalizer.
//!
//! [`NormalizeConfig`] carries the abbreviation table applied to address text
//! and a version number that is stamped on every persisted derivation of the
//! normalizer (the gazetteer address-key index, for one).
//!
//! # Versioning
//!
//! Any change to normalization output, including a new abbreviation, must be
//! accompanied by a version bump so that stored address keys are rebuilt.
//!
//! # Examples
//!
//! ```rust
//! use canonical::NormalizeConfig;
//!
//! let config = NormalizeConfig::default();
//! assert_eq!(config.version, 1);
//! assert!(config.abbreviations.iter().any(|a| a.short == "AV"));
//! ```

use serde::{Deserialize, Serialize};

use crate::error::CanonicalError;
use crate::pipeline::AbbreviationTable;

/// A single whole-token abbreviation and the word(s) it expands to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Abbreviation {
    /// Abbreviated form, matched case-insensitively with an optional trailing dot.
    pub short: String,
    /// Full form written in its place.
    pub expansion: String,
}

impl Abbreviation {
    pub fn new(short: impl Into<String>, expansion: impl Into<String>) -> Self {
        Self {
            short: short.into(),
            expansion: expansion.into(),
        }
    }
}

/// Configuration for the address normalizer.
///
/// The `version` field must be >= 1. Version 0 is reserved and rejected with
/// [`CanonicalError::InvalidConfig`].
///
/// The table is validated so that no expansion contains a word that is itself
/// an abbreviation. Without that rule `normalize(normalize(x))` could differ
/// from `normalize(x)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizeConfig {
    /// Version of the normalization rules.
    pub version: u32,
    /// Abbreviations expanded as whole tokens.
    #[serde(default = "default_abbreviations")]
    pub abbreviations: Vec<Abbreviation>,
}

impl NormalizeConfig {
    /// Validate the configuration, returning the compiled table on success.
    pub(crate) fn compile(&self) -> Result<AbbreviationTable, CanonicalError> {
        if self.version == 0 {
            return Err(CanonicalError::InvalidConfig(
                "config version must be >= 1".into(),
            ));
        }
        AbbreviationTable::build(&self.abbreviations)
    }

    /// Validate the configuration without keeping the compiled table.
    pub fn validate(&self) -> Result<(), CanonicalError> {
        self.compile().map(|_| ())
    }
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            version: 1,
            abbreviations: default_abbreviations(),
        }
    }
}

/// Street-type and title abbreviations common in Brazilian registry data.
pub fn default_abbreviations() -> Vec<Abbreviation> {
    [
        ("R", "RUA"),
        ("AV", "AVENIDA"),
        ("PRA", "PRACA"),
        ("PCA", "PRACA"),
        ("TV", "TRAVESSA"),
        ("AL", "ALAMEDA"),
        ("ROD", "RODOVIA"),
        ("DR", "DOUTOR"),
        ("PROF", "PROFESSOR"),
        ("CEL", "CORONEL"),
    ]
    .into_iter()
    .map(|(short, expansion)| Abbreviation::new(short, expansion))
    .collect()
}
