//! Read-only coverage reports over the match artifacts.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use canonical::{AddressKey, AddressNormalizer, Cep, compose_street};
use chrono::{Days, NaiveDate};
use matcher::{FamilyTerritory, MatchTier};
use serde::{Deserialize, Serialize};
use store::{CleanFamily, FamilyKey, StoreError, TerritoryStore};

use crate::lifecycle::ArtifactKind;

pub const DEFAULT_WINDOW_DAYS: u32 = 730;

/// A report, or the names of the artifacts it needs that do not exist yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum Report<T> {
    Ready(T),
    NotBuilt { missing: Vec<String> },
}

impl<T> Report<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            Report::Ready(value) => Some(value),
            Report::NotBuilt { .. } => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Report::Ready(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierCount {
    pub tier: MatchTier,
    pub artifact: String,
    /// `None` when the tier artifact has not been built.
    pub matched: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchStats {
    pub total_families: u64,
    pub tiers: Vec<TierCount>,
    pub with_territory: u64,
    pub unmatched: u64,
}

impl MatchStats {
    pub fn tier(&self, tier: MatchTier) -> Option<u64> {
        self.tiers
            .iter()
            .find(|t| t.tier == tier)
            .and_then(|t| t.matched)
    }
}

/// Coverage of families updated within a recency window.
///
/// Read from the family base and the gazetteer as they are now, so postal
/// codes merged by enrichment count before the tiers are rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowedAnalysis {
    pub days: u32,
    pub as_of: NaiveDate,
    /// First day inside the window. Later dates, including ones after
    /// `as_of`, are inside it.
    pub since: NaiveDate,
    pub total_families: u64,
    pub in_window: u64,
    /// In the window with a well-formed postal code.
    pub with_cep: u64,
    /// ... whose postal code exists in the gazetteer.
    pub cep_in_gazetteer: u64,
    /// ... whose address also matches a gazetteer row under that code.
    pub address_match: u64,
    /// ... whose address does not: likely a wrong or generic postal code.
    pub address_divergent: u64,
}

/// One family without any territory match, for manual review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedFamily {
    pub family: FamilyKey,
    pub cep: Option<Cep>,
    pub street: String,
    pub display_address: String,
    pub neighborhood: Option<String>,
    pub updated_at: Option<NaiveDate>,
}

/// Aggregates over the match artifacts and the gazetteer. Never writes.
#[derive(Debug, Clone)]
pub struct StatsReporter {
    store: TerritoryStore,
    normalizer: AddressNormalizer,
}

impl StatsReporter {
    pub fn new(store: TerritoryStore, normalizer: AddressNormalizer) -> Self {
        Self { store, normalizer }
    }

    fn combined(&self) -> Result<Option<Vec<FamilyTerritory>>, StoreError> {
        self.store
            .artifacts()
            .rows(ArtifactKind::FamiliesTerritory.name())
    }

    fn not_built<T>(kind: ArtifactKind) -> Report<T> {
        Report::NotBuilt {
            missing: vec![kind.name().to_string()],
        }
    }

    /// Normalized gazetteer address lines, grouped by postal code.
    fn gazetteer_addresses(&self) -> Result<BTreeMap<Cep, BTreeSet<AddressKey>>, StoreError> {
        let mut by_cep: BTreeMap<Cep, BTreeSet<AddressKey>> = BTreeMap::new();
        for entry in self.store.gazetteer().all()? {
            let Some(cep) = entry.cep else {
                continue;
            };
            let keys = by_cep.entry(cep).or_default();
            if let Some(key) = self.normalizer.normalize(&entry.address) {
                keys.insert(key);
            }
        }
        Ok(by_cep)
    }

    /// Families per tier, with any territory, and unmatched.
    pub fn match_stats(&self) -> Result<Report<MatchStats>, StoreError> {
        let Some(rows) = self.combined()? else {
            return Ok(Self::not_built(ArtifactKind::FamiliesTerritory));
        };

        let artifacts = self.store.artifacts();
        let mut tiers = Vec::with_capacity(MatchTier::ALL.len());
        for tier in MatchTier::ALL {
            let kind = ArtifactKind::for_tier(tier);
            tiers.push(TierCount {
                tier,
                artifact: kind.name().to_string(),
                matched: artifacts.meta(kind.name())?.map(|m| m.row_count),
            });
        }

        let with_territory = rows.iter().filter(|r| r.is_matched()).count() as u64;
        let total_families = rows.len() as u64;
        Ok(Report::Ready(MatchStats {
            total_families,
            tiers,
            with_territory,
            unmatched: total_families - with_territory,
        }))
    }

    /// Break down families updated from `days` before `as_of` onwards.
    ///
    /// A family's address matches when its normalized street equals the
    /// normalized address of any gazetteer row under its postal code.
    pub fn windowed(
        &self,
        days: u32,
        as_of: NaiveDate,
    ) -> Result<Report<WindowedAnalysis>, StoreError> {
        let Some(families) = self
            .store
            .artifacts()
            .rows::<CleanFamily>(ArtifactKind::FamiliesClean.name())?
        else {
            return Ok(Self::not_built(ArtifactKind::FamiliesClean));
        };
        let gazetteer = self.gazetteer_addresses()?;
        let since = as_of
            .checked_sub_days(Days::new(u64::from(days)))
            .unwrap_or(NaiveDate::MIN);

        let mut report = WindowedAnalysis {
            days,
            as_of,
            since,
            total_families: families.len() as u64,
            in_window: 0,
            with_cep: 0,
            cep_in_gazetteer: 0,
            address_match: 0,
            address_divergent: 0,
        };

        for family in &families {
            if !family.updated_at.is_some_and(|updated| updated >= since) {
                continue;
            }
            report.in_window += 1;

            let Some(cep) = &family.cep else {
                continue;
            };
            report.with_cep += 1;
            let Some(addresses) = gazetteer.get(cep) else {
                continue;
            };
            report.cep_in_gazetteer += 1;
            let matches = family
                .street_key
                .as_ref()
                .is_some_and(|key| addresses.contains(key));
            if matches {
                report.address_match += 1;
            } else {
                report.address_divergent += 1;
            }
        }
        Ok(Report::Ready(report))
    }

    /// Families no tier matched, by postal code (absent last), then street.
    pub fn unmatched_families(
        &self,
        limit: Option<usize>,
    ) -> Result<Report<Vec<UnmatchedFamily>>, StoreError> {
        let Some(rows) = self.combined()? else {
            return Ok(Self::not_built(ArtifactKind::FamiliesTerritory));
        };

        let mut unmatched: Vec<UnmatchedFamily> = rows
            .into_iter()
            .filter(|r| !r.is_matched())
            .map(|r| UnmatchedFamily {
                display_address: compose_street(&[
                    Some(r.street.as_str()),
                    r.house_number.as_deref(),
                ]),
                family: r.family,
                cep: r.family_cep,
                street: r.street,
                neighborhood: r.neighborhood,
                updated_at: r.updated_at,
            })
            .collect();
        unmatched.sort_by(|a, b| {
            cep_last(a.cep.as_ref(), b.cep.as_ref())
                .then_with(|| a.street.cmp(&b.street))
                .then_with(|| a.family.cmp(&b.family))
        });
        if let Some(limit) = limit {
            unmatched.truncate(limit);
        }
        Ok(Report::Ready(unmatched))
    }
}

fn cep_last(a: Option<&Cep>, b: Option<&Cep>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
