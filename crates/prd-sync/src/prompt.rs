//! Interactive collaborator seam.
//!
//! The CLI supplies a stdin-backed implementation; automation runs with
//! [`NonInteractive`].

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

use prd_core::{ObjectKey, PullStrategy, Result};

/// Answer to a pull-conflict prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyChoice {
    pub strategy: PullStrategy,
    /// Reuse this strategy for every further conflict of the same type in this run.
    pub apply_to_all: bool,
}

impl StrategyChoice {
    pub fn once(strategy: PullStrategy) -> Self {
        Self {
            strategy,
            apply_to_all: false,
        }
    }
}

/// A remote object no subdirectory claimed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnroutedObject {
    pub key: ObjectKey,
    pub name: String,
}

#[async_trait]
pub trait Prompter: Send + Sync {
    /// A remote object diverged while the local file has uncommitted edits.
    async fn choose_pull_strategy(&self, key: ObjectKey, path: &Path) -> Result<StrategyChoice>;

    /// Assign unrouted objects to subdirectories. Objects left out stay unrouted.
    async fn choose_subdirectories(
        &self,
        objects: &[UnroutedObject],
        subdirs: &[String],
    ) -> Result<BTreeMap<ObjectKey, String>>;

    /// Confirm deleting `path` remotely together with everything nested under it.
    async fn confirm_cascade_delete(&self, path: &Path, children: &[PathBuf]) -> Result<bool>;

    /// Merge conflicts are in the tree. Return `true` once the operator has
    /// resolved them, `false` to leave the object blocked.
    async fn await_conflict_resolution(&self, unresolved: &[PathBuf]) -> Result<bool>;
}

/// Prompter for unattended runs: conflicts resolve to a fixed strategy,
/// unrouted objects are skipped, cascades are refused, and merge conflicts
/// stay blocked for the operator.
#[derive(Debug, Clone)]
pub struct NonInteractive {
    conflict_strategy: PullStrategy,
}

impl Default for NonInteractive {
    fn default() -> Self {
        Self {
            conflict_strategy: PullStrategy::Skip,
        }
    }
}

impl NonInteractive {
    pub fn new(conflict_strategy: PullStrategy) -> Self {
        Self { conflict_strategy }
    }
}

#[async_trait]
impl Prompter for NonInteractive {
    async fn choose_pull_strategy(&self, key: ObjectKey, path: &Path) -> Result<StrategyChoice> {
        warn!(object_type = %key.object_type, object_id = key.id, path = %path.display(), strategy = %self.conflict_strategy, "Conflict resolved without prompting");
        Ok(StrategyChoice {
            strategy: self.conflict_strategy,
            apply_to_all: true,
        })
    }

    async fn choose_subdirectories(
        &self,
        objects: &[UnroutedObject],
        _subdirs: &[String],
    ) -> Result<BTreeMap<ObjectKey, String>> {
        for object in objects {
            warn!(object_type = %object.key.object_type, object_id = object.key.id, name = %object.name, "No subdirectory matches, skipping");
        }
        Ok(BTreeMap::new())
    }

    async fn confirm_cascade_delete(&self, path: &Path, children: &[PathBuf]) -> Result<bool> {
        warn!(path = %path.display(), children = children.len(), "Cascade delete needs confirmation, refusing");
        Ok(false)
    }

    async fn await_conflict_resolution(&self, unresolved: &[PathBuf]) -> Result<bool> {
        warn!(unresolved = unresolved.len(), "Merge conflicts left for manual resolution");
        Ok(false)
    }
}
