use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::config::{default_abbreviations, Abbreviation, NormalizeConfig};
use crate::error::CanonicalError;
use crate::whitespace::collapse_whitespace;

static DEFAULT_NORMALIZER: Lazy<AddressNormalizer> = Lazy::new(AddressNormalizer::default);

/// Normalized form of an address line, used for equality comparison.
///
/// Only produced by [`AddressNormalizer`]; never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddressKey(String);

impl AddressKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for AddressKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AddressKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Compiled abbreviation table, keyed by the folded short form.
#[derive(Debug, Clone)]
pub(crate) struct AbbreviationTable {
    map: HashMap<String, String>,
}

impl AbbreviationTable {
    pub(crate) fn build(entries: &[Abbreviation]) -> Result<Self, CanonicalError> {
        let mut map = HashMap::with_capacity(entries.len());
        for entry in entries {
            let short = fold(entry.short.trim());
            if short.is_empty() || short.contains(char::is_whitespace) || short.contains('.') {
                return Err(CanonicalError::InvalidConfig(format!(
                    "abbreviation {:?} must be a single word without dots",
                    entry.short
                )));
            }
            let expansion = collapse_whitespace(&fold(&entry.expansion));
            if expansion.is_empty() {
                return Err(CanonicalError::InvalidConfig(format!(
                    "expansion for abbreviation {short} must not be blank"
                )));
            }
            if map.insert(short.clone(), expansion).is_some() {
                return Err(CanonicalError::InvalidConfig(format!(
                    "abbreviation {short} is listed twice"
                )));
            }
        }

        let table = Self { map };
        for (short, expansion) in &table.map {
            for word in expansion.split(' ') {
                let mut expanded = String::with_capacity(word.len());
                table.push_token(word, &mut expanded);
                if expanded != word {
                    return Err(CanonicalError::InvalidConfig(format!(
                        "expansion of {short} contains the abbreviation {word}"
                    )));
                }
            }
        }
        Ok(table)
    }

    /// Appends `token` to `out`, expanding it when it is an abbreviation.
    ///
    /// A token matches as `ABBR` or `ABBR.`; `ABBR.REST` expands the head and
    /// continues with `REST` as its own token. Substrings never match.
    fn push_token(&self, token: &str, out: &mut String) {
        let bare = token.strip_suffix('.').unwrap_or(token);
        if let Some(expansion) = self.map.get(bare) {
            push_word(out, expansion);
            return;
        }
        if let Some((head, rest)) = token.split_once('.') {
            if let Some(expansion) = self.map.get(head) {
                push_word(out, expansion);
                self.push_token(rest, out);
                return;
            }
        }
        push_word(out, token);
    }
}

fn push_word(out: &mut String, word: &str) {
    if word.is_empty() {
        return;
    }
    if !out.is_empty() {
        out.push(' ');
    }
    out.push_str(word);
}

/// Uppercases and strips combining marks (diacritics) after canonical decomposition.
pub(crate) fn fold(text: &str) -> String {
    text.to_uppercase()
        .nfd()
        .filter(|ch| !is_combining_mark(*ch))
        .collect()
}

/// Address normalizer: trim, uppercase, strip diacritics, expand abbreviations,
/// collapse whitespace.
///
/// Pure and deterministic for a given configuration; safe to share across
/// threads and to call per row in bulk.
#[derive(Debug, Clone)]
pub struct AddressNormalizer {
    version: u32,
    table: AbbreviationTable,
}

impl AddressNormalizer {
    pub fn new(cfg: &NormalizeConfig) -> Result<Self, CanonicalError> {
        let table = cfg.compile()?;
        Ok(Self {
            version: cfg.version,
            table,
        })
    }

    /// Version of the rules this normalizer applies.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Normalize an address line. Blank input (or input that folds to nothing)
    /// yields `None`, never an empty key.
    pub fn normalize(&self, text: &str) -> Option<AddressKey> {
        let folded = fold(text.trim());
        let mut out = String::with_capacity(folded.len() + 8);
        for token in folded.split_whitespace() {
            self.table.push_token(token, &mut out);
        }
        if out.is_empty() {
            None
        } else {
            Some(AddressKey(out))
        }
    }

    /// Same as [`normalize`](Self::normalize) for optional input.
    pub fn normalize_opt(&self, text: Option<&str>) -> Option<AddressKey> {
        text.and_then(|t| self.normalize(t))
    }
}

impl Default for AddressNormalizer {
    fn default() -> Self {
        let map = default_abbreviations()
            .into_iter()
            .map(|a| (a.short, a.expansion))
            .collect();
        Self {
            version: NormalizeConfig::default().version,
            table: AbbreviationTable { map },
        }
    }
}

/// Normalize with the default rule set.
pub fn normalize_address(text: &str) -> Option<AddressKey> {
    DEFAULT_NORMALIZER.normalize(text)
}
