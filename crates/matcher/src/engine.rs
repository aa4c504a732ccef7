use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Instant;

use store::{CleanFamily, FamilyKey};
use tracing::debug;

use crate::index::GazetteerIndex;
use crate::strategy::{AddressOnlyStrategy, ExactStrategy, FuzzyStrategy, TierStrategy};
use crate::types::{FamilyTerritory, MatchConfig, MatchError, MatchTier, TierMatch};

#[cfg(test)]
mod tests;

/// Every tier plus the combined view, as produced by [`CascadeBuilder::run`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CascadeOutput {
    pub tiers: BTreeMap<MatchTier, Vec<TierMatch>>,
    pub combined: Vec<FamilyTerritory>,
}

/// Builds tier artifacts and the combined view from the family base and the
/// gazetteer.
///
/// Strategies are tried in priority order; each tier only sees the families
/// no earlier tier matched.
pub struct CascadeBuilder {
    strategies: Vec<Box<dyn TierStrategy>>,
}

impl CascadeBuilder {
    pub fn new(config: &MatchConfig) -> Result<Self, MatchError> {
        config.validate()?;
        let mut strategies: Vec<Box<dyn TierStrategy>> =
            vec![Box::new(ExactStrategy), Box::new(AddressOnlyStrategy)];
        if config.fuzzy_enabled {
            strategies.push(Box::new(FuzzyStrategy {
                threshold: config.fuzzy_threshold,
            }));
        }
        Ok(Self::with_strategies(strategies))
    }

    /// Use a custom strategy list. Strategies are ordered by their tier.
    pub fn with_strategies(mut strategies: Vec<Box<dyn TierStrategy>>) -> Self {
        strategies.sort_by_key(|s| s.tier());
        Self { strategies }
    }

    /// Tiers this builder can produce, in priority order.
    pub fn tiers(&self) -> Vec<MatchTier> {
        self.strategies.iter().map(|s| s.tier()).collect()
    }

    pub fn is_enabled(&self, tier: MatchTier) -> bool {
        self.strategies.iter().any(|s| s.tier() == tier)
    }

    /// Match every family not in `exclude` with the strategy for `tier`.
    ///
    /// Output holds at most one row per family key, in input order.
    pub fn build_tier(
        &self,
        tier: MatchTier,
        families: &[CleanFamily],
        index: &GazetteerIndex,
        exclude: &HashSet<FamilyKey>,
    ) -> Result<Vec<TierMatch>, MatchError> {
        let strategy = self
            .strategies
            .iter()
            .find(|s| s.tier() == tier)
            .ok_or(MatchError::TierDisabled(tier))?;

        Ok(apply(strategy.as_ref(), families, index, exclude))
    }

    /// Left-biased union of the tiers: each family gets its row from the
    /// highest-priority tier that matched it, or an unmatched row.
    pub fn combine(
        families: &[CleanFamily],
        tiers: &BTreeMap<MatchTier, Vec<TierMatch>>,
    ) -> Vec<FamilyTerritory> {
        let mut best: HashMap<&FamilyKey, &TierMatch> = HashMap::new();
        for rows in tiers.values() {
            for row in rows {
                best.entry(&row.family).or_insert(row);
            }
        }

        let mut seen = HashSet::new();
        families
            .iter()
            .filter(|family| seen.insert(&family.key))
            .map(|family| match best.get(&family.key) {
                Some(hit) => FamilyTerritory::matched(family, hit),
                None => FamilyTerritory::unmatched(family),
            })
            .collect()
    }

    /// Run every enabled tier in order, then combine.
    pub fn run(&self, families: &[CleanFamily], index: &GazetteerIndex) -> CascadeOutput {
        let mut tiers = BTreeMap::new();
        let mut matched: HashSet<FamilyKey> = HashSet::new();
        for strategy in &self.strategies {
            let rows = apply(strategy.as_ref(), families, index, &matched);
            matched.extend(rows.iter().map(|r| r.family.clone()));
            tiers.insert(strategy.tier(), rows);
        }
        let combined = Self::combine(families, &tiers);
        CascadeOutput { tiers, combined }
    }
}

fn apply(
    strategy: &dyn TierStrategy,
    families: &[CleanFamily],
    index: &GazetteerIndex,
    exclude: &HashSet<FamilyKey>,
) -> Vec<TierMatch> {
    let tier = strategy.tier();
    let start = Instant::now();
    let mut seen = HashSet::new();
    let mut matches = Vec::new();
    if !index.is_empty() {
        for family in families {
            if exclude.contains(&family.key) || !seen.insert(&family.key) {
                continue;
            }
            if let Some(candidate) = strategy.find(family, index) {
                matches.push(TierMatch {
                    family: family.key.clone(),
                    tier,
                    score: candidate.score,
                    territory: candidate.entry.into(),
                });
            }
        }
    }

    debug!(
        tier = %tier,
        families = families.len(),
        excluded = exclude.len(),
        matched = matches.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "tier_built"
    );
    matches
}
