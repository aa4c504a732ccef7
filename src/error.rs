use canonical::CanonicalError;
use lookup::LookupError;
use matcher::MatchError;
use store::StoreError;
use thiserror::Error;

use crate::config::ConfigLoadError;

/// Errors raised by artifact creation and refresh.
///
/// Batch refreshes never return these for a single artifact; per-artifact
/// failures land in the report's `failed` bucket instead. Only structural
/// problems (bad action name, unreachable store) abort a batch.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("artifact {0} is already being built")]
    BuildInProgress(String),

    #[error("artifact {artifact} needs {missing}, which has not been created")]
    MissingPrerequisite { artifact: String, missing: String },

    #[error("unknown artifact {name}; valid artifacts: {valid}")]
    UnknownArtifact { name: String, valid: String },

    #[error("unknown action {action}; valid actions: {valid}")]
    UnknownAction { action: String, valid: String },

    #[error("invalid artifact graph: {0}")]
    InvalidGraph(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error(transparent)]
    Canonical(#[from] CanonicalError),
}

/// Errors that abort a whole enrichment run or merge.
///
/// Lookup failures for individual postal codes are not errors at this
/// level; they are counted in the run result.
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("invalid enrichment config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lookup(#[from] LookupError),
}

/// Errors from wiring the engine together: config, backend, provider.
#[derive(Debug, Error)]
pub enum TerritoryError {
    #[error(transparent)]
    Config(#[from] ConfigLoadError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Canonical(#[from] CanonicalError),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Enrich(#[from] EnrichError),

    #[error("failed to load lookup fixtures from {path}: {message}")]
    Fixtures { path: String, message: String },
}
