//! Field-level normalizers for registry and gazetteer columns.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::CanonicalError;

/// Length of a Brazilian postal code (CEP) once punctuation is removed.
pub const CEP_DIGITS: usize = 8;

/// A postal code normalized to exactly eight ASCII digits.
///
/// Anything else is malformed and never becomes a `Cep`; see [`Cep::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cep(String);

impl Cep {
    /// Strip every non-digit character and keep the result only when exactly
    /// eight digits remain.
    pub fn parse(raw: &str) -> Option<Self> {
        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
        if digits.len() == CEP_DIGITS {
            Some(Self(digits))
        } else {
            None
        }
    }

    pub fn parse_opt(raw: Option<&str>) -> Option<Self> {
        raw.and_then(Self::parse)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Display form `NNNNN-NNN`.
    pub fn formatted(&self) -> String {
        format!("{}-{}", &self.0[..5], &self.0[5..])
    }
}

impl fmt::Display for Cep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Cep {
    type Error = CanonicalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Cep::parse(&value).ok_or(CanonicalError::InvalidCep(value))
    }
}

impl From<Cep> for String {
    fn from(cep: Cep) -> Self {
        cep.0
    }
}

/// Trim; blank becomes `None`.
pub fn normalize_text(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Trim and strip leading zeros from an administrative or family code.
///
/// A blank or all-zero code is absent.
pub fn normalize_code(raw: Option<&str>) -> Option<String> {
    raw.map(|c| c.trim().trim_start_matches('0'))
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

/// Joins the non-blank street parts (type, title, name) with single spaces.
pub fn compose_street(parts: &[Option<&str>]) -> String {
    let mut street = String::new();
    for part in parts.iter().flatten().map(|p| p.trim()) {
        if part.is_empty() {
            continue;
        }
        if !street.is_empty() {
            street.push(' ');
        }
        street.push_str(part);
    }
    street
}

/// Parses the registry's last-update date.
///
/// Accepts `DD/MM/YYYY`, `DDMMYYYY` and `YYYY-MM-DD`; anything else is `None`.
pub fn parse_registry_date(raw: Option<&str>) -> Option<NaiveDate> {
    let raw = raw?.trim();
    if raw.len() == 8 && raw.bytes().all(|b| b.is_ascii_digit()) {
        return NaiveDate::parse_from_str(raw, "%d%m%Y").ok();
    }
    if raw.contains('/') {
        return NaiveDate::parse_from_str(raw, "%d/%m/%Y").ok();
    }
    if raw.contains('-') {
        return NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok();
    }
    None
}
