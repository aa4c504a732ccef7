//! Tier strategies. Each one looks at a single family and either names the
//! gazetteer row it matches or declines.

use store::{CleanFamily, GazetteerEntry};

use crate::index::GazetteerIndex;
use crate::types::MatchTier;

/// A strategy's answer for one family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate<'a> {
    pub entry: &'a GazetteerEntry,
    pub score: f64,
}

pub trait TierStrategy: Send + Sync {
    fn tier(&self) -> MatchTier;

    fn find<'a>(&self, family: &CleanFamily, index: &'a GazetteerIndex) -> Option<Candidate<'a>>;
}

/// Postal code and address both equal.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactStrategy;

impl TierStrategy for ExactStrategy {
    fn tier(&self) -> MatchTier {
        MatchTier::Exact
    }

    fn find<'a>(&self, family: &CleanFamily, index: &'a GazetteerIndex) -> Option<Candidate<'a>> {
        let cep = family.cep.as_ref()?;
        let key = family.street_key.as_ref()?;
        index
            .exact(cep, key)
            .map(|entry| Candidate { entry, score: 1.0 })
    }
}

/// Address equal; the family's postal code is not consulted.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddressOnlyStrategy;

impl TierStrategy for AddressOnlyStrategy {
    fn tier(&self) -> MatchTier {
        MatchTier::AddressOnly
    }

    fn find<'a>(&self, family: &CleanFamily, index: &'a GazetteerIndex) -> Option<Candidate<'a>> {
        let key = family.street_key.as_ref()?;
        index
            .by_address(key)
            .map(|entry| Candidate { entry, score: 1.0 })
    }
}

/// Most similar address at or above `threshold`.
#[derive(Debug, Clone, Copy)]
pub struct FuzzyStrategy {
    pub threshold: f64,
}

impl TierStrategy for FuzzyStrategy {
    fn tier(&self) -> MatchTier {
        MatchTier::Fuzzy
    }

    fn find<'a>(&self, family: &CleanFamily, index: &'a GazetteerIndex) -> Option<Candidate<'a>> {
        let key = family.street_key.as_ref()?;
        index
            .most_similar(key, self.threshold)
            .map(|(entry, score)| Candidate { entry, score })
    }
}
