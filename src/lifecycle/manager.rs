use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use canonical::AddressNormalizer;
use chrono::{NaiveDate, Utc};
use matcher::{CascadeBuilder, FamilyTerritory, GazetteerIndex, MatchConfig, MatchError, TierMatch};
use serde::Serialize;
use store::{
    ArtifactMeta, ArtifactRow, CleanFamily, FamilyKey, RefreshMode, StoreError, TerritoryStore,
};
use tracing::{Level, info, warn};

use crate::error::LifecycleError;
use crate::lifecycle::graph::{Action, ArtifactGraph, ArtifactKind};
use crate::lifecycle::lock::{BuildLock, InProcessBuildLock};
use crate::stats::{MatchStats, Report, StatsReporter, WindowedAnalysis};

/// Rows produced by one artifact's defining query.
enum Rows {
    Families(Vec<CleanFamily>),
    Tier(Vec<TierMatch>),
    Combined(Vec<FamilyTerritory>),
}

#[derive(Debug, Clone, Copy)]
enum Write {
    Create,
    Refresh(RefreshMode),
}

impl Write {
    fn apply<R: ArtifactRow>(
        self,
        store: &TerritoryStore,
        name: &str,
        rows: &[R],
    ) -> Result<ArtifactMeta, StoreError> {
        match self {
            Write::Create => store.artifacts().create(name, rows, true),
            Write::Refresh(mode) => store.artifacts().refresh(name, rows, mode),
        }
    }
}

/// How an artifact in a batch got its new rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOutcome {
    Concurrent,
    /// The non-blocking refresh was refused and the blocking one succeeded.
    BlockingFallback,
    /// The artifact did not exist and is not optional, so it was created.
    Created,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshedArtifact {
    pub name: String,
    pub outcome: RefreshOutcome,
    pub generation: u64,
    pub rows: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    DoesNotExist,
    MissingPrerequisite { artifact: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::DoesNotExist => f.write_str("does not exist yet"),
            SkipReason::MissingPrerequisite { artifact } => {
                write!(f, "prerequisite {artifact} does not exist yet")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedArtifact {
    pub name: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedArtifact {
    pub name: String,
    pub error: String,
}

/// Aggregates attached to a batch result on request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub matches: Report<MatchStats>,
    pub window: Option<Report<WindowedAnalysis>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshReport {
    pub action: Action,
    pub refreshed: Vec<RefreshedArtifact>,
    pub skipped: Vec<SkippedArtifact>,
    pub failed: Vec<FailedArtifact>,
    pub stats: Option<StatsSnapshot>,
}

impl RefreshReport {
    pub fn refreshed_names(&self) -> Vec<&str> {
        self.refreshed.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn skipped_names(&self) -> Vec<&str> {
        self.skipped.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn failed_names(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.name.as_str()).collect()
    }
}

/// Extra output requested from a batch refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshOptions {
    pub include_stats: bool,
    /// Add the windowed analysis over this many days.
    pub window_days: Option<u32>,
    /// Window end; today when unset.
    pub as_of: Option<NaiveDate>,
}

/// State of one artifact, for operator listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactStatus {
    pub name: String,
    pub optional: bool,
    pub building: bool,
    pub meta: Option<ArtifactMeta>,
}

/// Creates and refreshes the match artifacts in dependency order.
pub struct ArtifactManager {
    store: TerritoryStore,
    normalizer: AddressNormalizer,
    cascade: CascadeBuilder,
    graph: ArtifactGraph,
    lock: Arc<dyn BuildLock>,
}

impl ArtifactManager {
    pub fn new(
        store: TerritoryStore,
        normalizer: AddressNormalizer,
        config: &MatchConfig,
    ) -> Result<Self, LifecycleError> {
        Ok(Self {
            store,
            normalizer,
            cascade: CascadeBuilder::new(config)?,
            graph: ArtifactGraph::standard(config.fuzzy_enabled)?,
            lock: Arc::new(InProcessBuildLock::new()),
        })
    }

    /// Replace the build lock, e.g. with one shared across processes.
    pub fn with_lock(mut self, lock: Arc<dyn BuildLock>) -> Self {
        self.lock = lock;
        self
    }

    pub fn graph(&self) -> &ArtifactGraph {
        &self.graph
    }

    pub fn status(&self) -> Result<Vec<ArtifactStatus>, LifecycleError> {
        let artifacts = self.store.artifacts();
        let mut status = Vec::with_capacity(self.graph.order().len());
        for &kind in self.graph.order() {
            status.push(ArtifactStatus {
                name: kind.name().to_string(),
                optional: self.graph.node(kind).is_some_and(|n| n.optional),
                building: self.lock.is_building(kind.name()),
                meta: artifacts.meta(kind.name())?,
            });
        }
        Ok(status)
    }

    /// Drop and rebuild `kind` from scratch, refreshing the gazetteer's
    /// address-key index first. Artifacts derived from `kind` are dropped
    /// with it and come back through `create` or a batch refresh. Rejected
    /// at once if a build of the same artifact is already running.
    pub fn create(&self, kind: ArtifactKind) -> Result<ArtifactMeta, LifecycleError> {
        let start = Instant::now();
        let Some(_guard) = self.lock.try_acquire(kind.name()) else {
            warn!(artifact = %kind, "artifact_create_rejected");
            return Err(LifecycleError::BuildInProgress(kind.name().to_string()));
        };

        let span = tracing::span!(Level::INFO, "lifecycle.create", artifact = %kind);
        let _entered = span.enter();

        match self.create_inner(kind) {
            Ok(meta) => {
                info!(
                    artifact = %kind,
                    rows = meta.row_count,
                    generation = meta.generation,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "artifact_create_success"
                );
                Ok(meta)
            }
            Err(err) => {
                warn!(
                    artifact = %kind,
                    error = %err,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "artifact_create_failure"
                );
                Err(err)
            }
        }
    }

    fn create_inner(&self, kind: ArtifactKind) -> Result<ArtifactMeta, LifecycleError> {
        self.store
            .gazetteer()
            .ensure_address_index(&self.normalizer)?;
        let rows = self.compute(kind)?;
        let meta = self.write(kind, &rows, Write::Create)?;

        let mut dropped = Vec::new();
        for dependent in self.graph.dependents(kind) {
            if self.store.artifacts().drop(dependent.name())? {
                dropped.push(dependent.name());
            }
        }
        if !dropped.is_empty() {
            info!(artifact = %kind, dropped = ?dropped, "artifact_dependents_dropped");
        }
        Ok(meta)
    }

    /// Create every artifact in build order, stopping at the first failure.
    pub fn create_all(&self) -> Result<Vec<ArtifactMeta>, LifecycleError> {
        self.graph
            .order()
            .iter()
            .map(|&kind| self.create(kind))
            .collect()
    }

    /// Run a named batch. Artifacts are handled in build order; a failure is
    /// recorded and the batch moves on.
    pub fn refresh(
        &self,
        action: &str,
        options: &RefreshOptions,
    ) -> Result<RefreshReport, LifecycleError> {
        let action: Action = action.parse()?;
        let span = tracing::span!(Level::INFO, "lifecycle.refresh", action = %action);
        let _entered = span.enter();
        let start = Instant::now();

        let mut report = RefreshReport {
            action,
            refreshed: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
            stats: None,
        };

        for kind in self.graph.plan(&action.members()) {
            let optional = self.graph.node(kind).is_some_and(|n| n.optional);
            if !self.store.artifacts().exists(kind.name())? {
                let reason = if optional {
                    Some(SkipReason::DoesNotExist)
                } else {
                    self.missing_prerequisite(kind)?
                        .map(|missing| SkipReason::MissingPrerequisite {
                            artifact: missing.name().to_string(),
                        })
                };
                if let Some(reason) = reason {
                    info!(artifact = %kind, reason = %reason, "artifact_refresh_skipped");
                    report.skipped.push(SkippedArtifact {
                        name: kind.name().to_string(),
                        reason,
                    });
                    continue;
                }
                let result = self.create(kind).map(|meta| (RefreshOutcome::Created, meta));
                record(&mut report, kind, result);
                continue;
            }

            let result = self.refresh_one(kind);
            record(&mut report, kind, result);
        }

        if options.include_stats {
            report.stats = Some(self.snapshot(options)?);
        }

        info!(
            action = %action,
            refreshed = report.refreshed.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "artifact_refresh_batch_done"
        );
        Ok(report)
    }

    /// Re-run the defining query of an existing artifact and swap in the
    /// result, without blocking readers. Falls back once to a blocking
    /// refresh when the non-blocking one is refused.
    fn refresh_one(
        &self,
        kind: ArtifactKind,
    ) -> Result<(RefreshOutcome, ArtifactMeta), LifecycleError> {
        let rows = self.compute(kind)?;
        match self.write(kind, &rows, Write::Refresh(RefreshMode::Concurrent)) {
            Ok(meta) => Ok((RefreshOutcome::Concurrent, meta)),
            Err(StoreError::RefreshConflict { reason, .. }) => {
                warn!(artifact = %kind, reason = %reason, "artifact_refresh_fallback");
                let meta = self.write(kind, &rows, Write::Refresh(RefreshMode::Blocking))?;
                Ok((RefreshOutcome::BlockingFallback, meta))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn snapshot(&self, options: &RefreshOptions) -> Result<StatsSnapshot, StoreError> {
        let reporter = StatsReporter::new(self.store.clone(), self.normalizer.clone());
        let window = match options.window_days {
            Some(days) => {
                let as_of = options.as_of.unwrap_or_else(|| Utc::now().date_naive());
                Some(reporter.windowed(days, as_of)?)
            }
            None => None,
        };
        Ok(StatsSnapshot {
            matches: reporter.match_stats()?,
            window,
        })
    }

    fn missing_prerequisite(&self, kind: ArtifactKind) -> Result<Option<ArtifactKind>, StoreError> {
        let Some(node) = self.graph.node(kind) else {
            return Ok(None);
        };
        for dep in node.depends_on.iter().filter(|d| d.required) {
            if !self.store.artifacts().exists(dep.on.name())? {
                return Ok(Some(dep.on));
            }
        }
        Ok(None)
    }

    /// The defining query of `kind` against current data.
    fn compute(&self, kind: ArtifactKind) -> Result<Rows, LifecycleError> {
        if !self.graph.contains(kind) {
            return Err(match kind.tier() {
                Some(tier) => MatchError::TierDisabled(tier).into(),
                None => LifecycleError::InvalidGraph(format!("{kind} is not in the graph")),
            });
        }
        if let Some(missing) = self.missing_prerequisite(kind)? {
            return Err(LifecycleError::MissingPrerequisite {
                artifact: kind.name().to_string(),
                missing: missing.name().to_string(),
            });
        }

        match kind {
            ArtifactKind::FamiliesClean => Ok(Rows::Families(self.clean_families()?)),
            ArtifactKind::FamiliesTerritory => {
                let families = self.load_families()?;
                let mut tiers = BTreeMap::new();
                for tier_kind in self.graph.tiers() {
                    if let (Some(tier), Some(rows)) =
                        (tier_kind.tier(), self.tier_rows(tier_kind)?)
                    {
                        tiers.insert(tier, rows);
                    }
                }
                Ok(Rows::Combined(CascadeBuilder::combine(&families, &tiers)))
            }
            ArtifactKind::GeoExact | ArtifactKind::GeoByAddress | ArtifactKind::GeoFuzzy => {
                let Some(tier) = kind.tier() else {
                    return Err(LifecycleError::InvalidGraph(format!("{kind} has no tier")));
                };
                let families = self.load_families()?;
                let index = self.gazetteer_index()?;

                let mut exclude: HashSet<FamilyKey> = HashSet::new();
                for earlier in self.graph.tiers().into_iter().filter(|t| *t < kind) {
                    for row in self.tier_rows(earlier)?.unwrap_or_default() {
                        exclude.insert(row.family);
                    }
                }
                let rows = self.cascade.build_tier(tier, &families, &index, &exclude)?;
                Ok(Rows::Tier(rows))
            }
        }
    }

    /// One clean row per family key; the first record of a key wins.
    fn clean_families(&self) -> Result<Vec<CleanFamily>, StoreError> {
        let records = self.store.families().all()?;
        let total = records.len();
        let mut seen = HashSet::with_capacity(total);
        let families: Vec<CleanFamily> = records
            .iter()
            .filter_map(|record| CleanFamily::from_record(record, &self.normalizer))
            .filter(|family| seen.insert(family.key.clone()))
            .collect();
        if families.len() < total {
            info!(
                records = total,
                families = families.len(),
                dropped = total - families.len(),
                "families_clean_deduplicated"
            );
        }
        Ok(families)
    }

    fn load_families(&self) -> Result<Vec<CleanFamily>, LifecycleError> {
        let name = ArtifactKind::FamiliesClean.name();
        self.store
            .artifacts()
            .rows(name)?
            .ok_or_else(|| LifecycleError::MissingPrerequisite {
                artifact: name.to_string(),
                missing: name.to_string(),
            })
    }

    fn tier_rows(&self, kind: ArtifactKind) -> Result<Option<Vec<TierMatch>>, StoreError> {
        self.store.artifacts().rows(kind.name())
    }

    fn gazetteer_index(&self) -> Result<GazetteerIndex, StoreError> {
        let gazetteer = self.store.gazetteer();
        let keys = gazetteer.address_keys(&self.normalizer)?;
        Ok(GazetteerIndex::build(gazetteer.all()?, &keys))
    }

    fn write(
        &self,
        kind: ArtifactKind,
        rows: &Rows,
        write: Write,
    ) -> Result<ArtifactMeta, StoreError> {
        let name = kind.name();
        match rows {
            Rows::Families(rows) => write.apply(&self.store, name, rows),
            Rows::Tier(rows) => write.apply(&self.store, name, rows),
            Rows::Combined(rows) => write.apply(&self.store, name, rows),
        }
    }
}

fn record(
    report: &mut RefreshReport,
    kind: ArtifactKind,
    result: Result<(RefreshOutcome, ArtifactMeta), LifecycleError>,
) {
    match result {
        Ok((outcome, meta)) => {
            info!(
                artifact = %kind,
                outcome = ?outcome,
                rows = meta.row_count,
                generation = meta.generation,
                "artifact_refresh_success"
            );
            report.refreshed.push(RefreshedArtifact {
                name: kind.name().to_string(),
                outcome,
                generation: meta.generation,
                rows: meta.row_count,
            });
        }
        Err(err) => {
            warn!(artifact = %kind, error = %err, "artifact_refresh_failure");
            report.failed.push(FailedArtifact {
                name: kind.name().to_string(),
                error: err.to_string(),
            });
        }
    }
}
