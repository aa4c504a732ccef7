//! Artifact lifecycle: which artifacts exist, what they depend on, and how
//! they are created and refreshed.
//!
//! The catalogue is a small DAG ([`ArtifactGraph`]): the family base, one
//! artifact per matching tier, and the combined view. Batch refreshes walk
//! it in topological order so every artifact sees fresh inputs. Adding a
//! tier means adding a node, not rewriting call order.

mod graph;
mod lock;
mod manager;

pub use graph::{Action, ArtifactGraph, ArtifactKind, ArtifactNode, Dependency};
pub use lock::{BuildGuard, BuildLock, InProcessBuildLock};
pub use manager::{
    ArtifactManager, ArtifactStatus, FailedArtifact, RefreshOptions, RefreshOutcome, RefreshReport,
    RefreshedArtifact, SkipReason, SkippedArtifact, StatsSnapshot,
};
