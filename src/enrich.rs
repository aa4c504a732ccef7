//! Gazetteer enrichment from the postal directory.
//!
//! One run collects the postal codes of unmatched families that the
//! gazetteer lacks, resolves them one at a time (cache first, then the
//! rate-limited directory) and stages the answers. Staged answers reach the
//! gazetteer through [`Enricher::merge_staging`], which only appends codes
//! the gazetteer does not have yet.

use std::collections::{BTreeSet, HashSet};
use std::time::Instant;

use canonical::{AddressNormalizer, Cep};
use chrono::Utc;
use lookup::{LookupClient, LookupError, LookupOrigin};
use matcher::TierMatch;
use serde::{Deserialize, Serialize};
use store::{
    CachedLookup, CleanFamily, FamilyKey, NewGazetteerEntry, StagedEntry, StoreError,
    TerritoryStore,
};
use tracing::{Instrument, Level, debug, info, warn};

use crate::error::EnrichError;
use crate::lifecycle::ArtifactKind;

/// Batch and reporting limits of an enrichment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Codes per run when the caller asks for none, or for too many.
    #[serde(default = "default_batch_size")]
    pub default_batch_size: usize,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Per-code errors kept in the run result.
    #[serde(default = "default_max_errors")]
    pub max_errors: usize,
    /// Merge staged entries into the gazetteer at the end of every run.
    #[serde(default = "true_value")]
    pub auto_merge: bool,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            default_batch_size: default_batch_size(),
            max_batch_size: default_max_batch_size(),
            max_errors: default_max_errors(),
            auto_merge: true,
        }
    }
}

impl EnrichmentConfig {
    pub fn validate(&self) -> Result<(), EnrichError> {
        if self.max_batch_size == 0 {
            return Err(EnrichError::InvalidConfig(
                "max_batch_size must be >= 1".into(),
            ));
        }
        if !(1..=self.max_batch_size).contains(&self.default_batch_size) {
            return Err(EnrichError::InvalidConfig(format!(
                "default_batch_size must be between 1 and {}",
                self.max_batch_size
            )));
        }
        Ok(())
    }

    /// The batch size a run will use. Requests outside
    /// `1..=max_batch_size` fall back to the default.
    pub fn effective_limit(&self, requested: Option<usize>) -> usize {
        match requested {
            Some(n) if (1..=self.max_batch_size).contains(&n) => n,
            _ => self.default_batch_size,
        }
    }
}

fn default_batch_size() -> usize {
    200
}
fn default_max_batch_size() -> usize {
    500
}
fn default_max_errors() -> usize {
    20
}
fn true_value() -> bool {
    true
}

/// What happened to one postal code during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CodeStatus {
    Staged { origin: LookupOrigin },
    /// Found, but with neither street nor neighborhood to add.
    NoLocation { origin: LookupOrigin },
    NotFound { origin: LookupOrigin },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeOutcome {
    pub cep: Cep,
    #[serde(flatten)]
    pub status: CodeStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeResult {
    /// Gazetteer rows appended.
    pub merged: usize,
    /// Staged codes dropped because the gazetteer already had them.
    pub already_present: usize,
}

/// Counts and per-code outcomes of one enrichment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichmentRunResult {
    pub limit: usize,
    /// Codes eligible before the batch cap.
    pub pending: usize,
    pub processed: usize,
    pub from_cache: usize,
    pub fetched: usize,
    pub staged: usize,
    pub not_found: usize,
    pub error_count: usize,
    /// The first `max_errors` per-code errors.
    pub errors: Vec<String>,
    pub outcomes: Vec<CodeOutcome>,
    pub merge: Option<MergeResult>,
}

impl EnrichmentRunResult {
    fn new(limit: usize, pending: usize) -> Self {
        Self {
            limit,
            pending,
            processed: 0,
            from_cache: 0,
            fetched: 0,
            staged: 0,
            not_found: 0,
            error_count: 0,
            errors: Vec::new(),
            outcomes: Vec::new(),
            merge: None,
        }
    }

    /// Eligible codes left for a later run.
    pub fn remaining(&self) -> usize {
        self.pending - self.processed
    }

    fn push_error(&mut self, max: usize, message: String) {
        self.error_count += 1;
        if self.errors.len() < max {
            self.errors.push(message);
        }
    }
}

/// Drives enrichment runs against one store.
pub struct Enricher {
    store: TerritoryStore,
    client: LookupClient,
    normalizer: AddressNormalizer,
    config: EnrichmentConfig,
}

impl Enricher {
    pub fn new(
        store: TerritoryStore,
        client: LookupClient,
        normalizer: AddressNormalizer,
        config: EnrichmentConfig,
    ) -> Result<Self, EnrichError> {
        config.validate()?;
        Ok(Self {
            store,
            client,
            normalizer,
            config,
        })
    }

    pub fn config(&self) -> &EnrichmentConfig {
        &self.config
    }

    /// Distinct postal codes worth looking up, in ascending order.
    ///
    /// A code qualifies when a family carrying it has no tier match, the
    /// gazetteer lacks it, it is not waiting in staging, and the cache does
    /// not already hold a dead end for it (a negative entry, or an answer
    /// with nothing to add).
    pub fn pending_ceps(&self) -> Result<Vec<Cep>, StoreError> {
        let matched = self.matched_families()?;
        let in_gazetteer = self.store.gazetteer().ceps()?;
        let staged: HashSet<Cep> = self
            .store
            .staging()
            .all()?
            .into_iter()
            .map(|s| s.cep)
            .collect();

        let mut ceps = BTreeSet::new();
        for (key, cep) in self.family_ceps()? {
            let Some(cep) = cep else { continue };
            if matched.contains(&key) || in_gazetteer.contains(&cep) || staged.contains(&cep) {
                continue;
            }
            ceps.insert(cep);
        }

        let cache = self.store.cep_cache();
        let mut pending = Vec::with_capacity(ceps.len());
        for cep in ceps {
            let dead_end = match cache.get(&cep)? {
                Some(entry) => match entry.result {
                    CachedLookup::Found(address) => !address.has_location(),
                    CachedLookup::NotFound => true,
                },
                None => false,
            };
            if !dead_end {
                pending.push(cep);
            }
        }
        Ok(pending)
    }

    /// Family keys with their normalized postal codes, from the family base
    /// artifact when it exists, else straight from the registry.
    fn family_ceps(&self) -> Result<Vec<(FamilyKey, Option<Cep>)>, StoreError> {
        let clean: Option<Vec<CleanFamily>> = self
            .store
            .artifacts()
            .rows(ArtifactKind::FamiliesClean.name())?;
        Ok(match clean {
            Some(rows) => rows.into_iter().map(|f| (f.key, f.cep)).collect(),
            None => self
                .store
                .families()
                .all()?
                .into_iter()
                .filter_map(|r| Some((r.key()?, Cep::parse_opt(r.cep.as_deref()))))
                .collect(),
        })
    }

    fn matched_families(&self) -> Result<HashSet<FamilyKey>, StoreError> {
        let mut matched = HashSet::new();
        for kind in [
            ArtifactKind::GeoExact,
            ArtifactKind::GeoByAddress,
            ArtifactKind::GeoFuzzy,
        ] {
            let rows: Option<Vec<TierMatch>> = self.store.artifacts().rows(kind.name())?;
            matched.extend(rows.unwrap_or_default().into_iter().map(|r| r.family));
        }
        Ok(matched)
    }

    /// Resolve up to `limit` pending codes, one at a time, and stage what
    /// the directory knows about them. A failing code is recorded and the
    /// run moves on; only store failures abort it.
    pub async fn run(&self, limit: Option<usize>) -> Result<EnrichmentRunResult, EnrichError> {
        let limit = self.config.effective_limit(limit);
        let span = tracing::span!(Level::INFO, "enrich.run", limit);
        self.run_batch(limit).instrument(span).await
    }

    async fn run_batch(&self, limit: usize) -> Result<EnrichmentRunResult, EnrichError> {
        let start = Instant::now();

        let pending = self.pending_ceps()?;
        let mut result = EnrichmentRunResult::new(limit, pending.len());

        for cep in pending.into_iter().take(limit) {
            result.processed += 1;
            let status = match self.client.resolve(&cep).await {
                Ok(resolution) => {
                    match resolution.origin {
                        LookupOrigin::Cache => result.from_cache += 1,
                        LookupOrigin::Network => result.fetched += 1,
                    }
                    let origin = resolution.origin;
                    match resolution.result {
                        CachedLookup::Found(address) if address.has_location() => {
                            self.store.staging().stage(&StagedEntry {
                                cep: cep.clone(),
                                address,
                                staged_at: Utc::now(),
                            })?;
                            result.staged += 1;
                            debug!(cep = %cep, origin = ?origin, "enrich_code_staged");
                            CodeStatus::Staged { origin }
                        }
                        CachedLookup::Found(_) => CodeStatus::NoLocation { origin },
                        CachedLookup::NotFound => {
                            result.not_found += 1;
                            result.push_error(
                                self.config.max_errors,
                                format!("CEP {cep}: not found"),
                            );
                            CodeStatus::NotFound { origin }
                        }
                    }
                }
                Err(LookupError::Store(err)) => return Err(err.into()),
                Err(err) => {
                    warn!(cep = %cep, error = %err, "enrich_code_failure");
                    result.push_error(self.config.max_errors, format!("CEP {cep}: {err}"));
                    CodeStatus::Failed {
                        error: err.to_string(),
                    }
                }
            };
            result.outcomes.push(CodeOutcome { cep, status });
        }

        if self.config.auto_merge {
            result.merge = Some(self.merge_staging()?);
        }

        info!(
            processed = result.processed,
            remaining = result.remaining(),
            from_cache = result.from_cache,
            fetched = result.fetched,
            staged = result.staged,
            errors = result.error_count,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "enrich_run_done"
        );
        Ok(result)
    }

    /// See [`merge_staging`].
    pub fn merge_staging(&self) -> Result<MergeResult, StoreError> {
        merge_staging(&self.store, &self.normalizer)
    }
}

/// Append staged entries whose code the gazetteer lacks, then clear
/// staging. Running it again with nothing staged changes nothing.
pub fn merge_staging(
    store: &TerritoryStore,
    normalizer: &AddressNormalizer,
) -> Result<MergeResult, StoreError> {
    let staged = store.staging().all()?;
    if staged.is_empty() {
        return Ok(MergeResult::default());
    }

    let gazetteer = store.gazetteer();
    let known = gazetteer.ceps()?;
    let mut result = MergeResult::default();
    let mut new_entries = Vec::new();
    for entry in &staged {
        if known.contains(&entry.cep) {
            result.already_present += 1;
        } else {
            new_entries.push(NewGazetteerEntry::from_postal(&entry.cep, &entry.address));
        }
    }

    result.merged = gazetteer.append(new_entries, normalizer)?.len();
    let ceps: Vec<Cep> = staged.into_iter().map(|s| s.cep).collect();
    store.staging().remove(&ceps)?;

    info!(
        merged = result.merged,
        already_present = result.already_present,
        "enrich_merge_done"
    );
    Ok(result)
}
