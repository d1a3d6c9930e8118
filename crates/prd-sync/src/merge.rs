//! Three-way merge of a diverged remote object with uncommitted local edits.
//!
//! ```text
//! Clean --stash--> Stashed --commit_remote--> Committed --pop--> Popped
//!                                                                  |
//!                                                    resolve: Resolved | Blocked
//! ```
//!
//! Local edits are stashed, the remote version is written and committed, and
//! the stash is popped on top. Conflicts keep the object in `Popped` until
//! the working tree reports no unresolved paths or the operator gives up, in
//! which case it ends `Blocked` with both sides still in the tree.

use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use prd_core::{Error, LocalObject, ObjectType, Result};
use prd_store::companions::formula_dir;
use prd_store::ObjectStore;

use crate::prompt::Prompter;
use crate::vcs::Vcs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeState {
    Clean,
    Stashed,
    Committed,
    Popped,
    Resolved,
    Blocked,
}

/// Owns every VCS transition of one object's merge.
pub struct ThreeWayMerge<'a> {
    vcs: &'a dyn Vcs,
    store: &'a ObjectStore,
    path: PathBuf,
    object_type: ObjectType,
    state: MergeState,
    stashed: bool,
}

impl<'a> ThreeWayMerge<'a> {
    pub fn new(vcs: &'a dyn Vcs, store: &'a ObjectStore, path: &Path, object_type: ObjectType) -> Self {
        Self {
            vcs,
            store,
            path: path.to_path_buf(),
            object_type,
            state: MergeState::Clean,
            stashed: false,
        }
    }

    pub fn state(&self) -> MergeState {
        self.state
    }

    fn expect(&self, expected: MergeState, action: &str) -> Result<()> {
        if self.state != expected {
            return Err(Error::Internal(format!(
                "cannot {} {} in merge state {:?}",
                action,
                self.path.display(),
                self.state
            )));
        }
        Ok(())
    }

    async fn tracked_paths(&self) -> Result<Vec<PathBuf>> {
        let mut paths = vec![self.path.clone()];
        match self.object_type {
            ObjectType::Schema => paths.push(formula_dir(&self.path)),
            _ => paths.extend(self.store.companions_of(&self.path, self.object_type).await?),
        }
        Ok(paths)
    }

    /// Clean → Stashed
    pub async fn stash(&mut self) -> Result<()> {
        self.expect(MergeState::Clean, "stash")?;
        let paths = self.tracked_paths().await?;
        self.stashed = self.vcs.stash_push(&paths)?;
        self.state = MergeState::Stashed;
        Ok(())
    }

    /// Stashed → Committed
    pub async fn commit_remote(&mut self, remote: &LocalObject) -> Result<()> {
        self.expect(MergeState::Stashed, "commit")?;
        self.store
            .write_object(&self.path, remote, self.object_type)
            .await?;
        let paths = self.tracked_paths().await?;
        let message = format!(
            "prd: pull {} {} ({})",
            self.object_type,
            remote.id.map(|id| id.to_string()).unwrap_or_default(),
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        );
        self.vcs.commit(&paths, &message)?;
        self.state = MergeState::Committed;
        Ok(())
    }

    /// Committed → Popped
    pub fn pop(&mut self) -> Result<()> {
        self.expect(MergeState::Committed, "pop")?;
        if self.stashed {
            self.vcs.stash_pop()?;
        }
        self.state = MergeState::Popped;
        Ok(())
    }

    /// Popped → Resolved | Blocked. Polls until the tree is clean of
    /// conflicts or the prompter declines to wait any longer.
    pub async fn resolve(&mut self, prompter: &dyn Prompter) -> Result<MergeState> {
        self.expect(MergeState::Popped, "resolve")?;
        loop {
            let unresolved = self.vcs.unresolved()?;
            if unresolved.is_empty() {
                self.state = MergeState::Resolved;
                info!(path = %self.path.display(), "Merged remote changes");
                break;
            }
            if !prompter.await_conflict_resolution(&unresolved).await? {
                self.state = MergeState::Blocked;
                warn!(path = %self.path.display(), unresolved = unresolved.len(), "Merge left unresolved");
                break;
            }
        }
        Ok(self.state)
    }

    /// Drive the whole machine to a terminal state.
    pub async fn run(mut self, remote: &LocalObject, prompter: &dyn Prompter) -> Result<MergeState> {
        self.stash().await?;
        self.commit_remote(remote).await?;
        self.pop()?;
        self.resolve(prompter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::{NonInteractive, StrategyChoice, UnroutedObject};
    use crate::vcs::{FakeVcs, VcsCall};
    use async_trait::async_trait;
    use prd_core::ObjectKey;
    use prd_store::Layout;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Confirms resolution every time it is asked.
    struct Patient(AtomicUsize);

    #[async_trait]
    impl Prompter for Patient {
        async fn choose_pull_strategy(&self, _: ObjectKey, _: &Path) -> Result<StrategyChoice> {
            Ok(StrategyChoice::once(prd_core::PullStrategy::Merge))
        }
        async fn choose_subdirectories(&self, _: &[UnroutedObject], _: &[String]) -> Result<BTreeMap<ObjectKey, String>> {
            Ok(BTreeMap::new())
        }
        async fn confirm_cascade_delete(&self, _: &Path, _: &[PathBuf]) -> Result<bool> {
            Ok(false)
        }
        async fn await_conflict_resolution(&self, _: &[PathBuf]) -> Result<bool> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
    }

    fn remote() -> LocalObject {
        LocalObject::from_value(json!({"id": 4, "url": "https://e/api/v1/rules/4", "name": "R"})).unwrap()
    }

    #[tokio::test]
    async fn test_clean_merge_runs_every_transition() {
        let dir = TempDir::new().unwrap();
        let store = ObjectStore::new(Layout::new(dir.path()));
        let path = dir.path().join("d/rules/R_[4].json");
        let vcs = FakeVcs::new();

        let state = ThreeWayMerge::new(&vcs, &store, &path, ObjectType::Rule)
            .run(&remote(), &NonInteractive::default())
            .await
            .unwrap();

        assert_eq!(state, MergeState::Resolved);
        let calls = vcs.calls();
        assert!(matches!(calls[0], VcsCall::StashPush(_)));
        assert!(matches!(calls[1], VcsCall::Commit(_, _)));
        assert_eq!(calls[2], VcsCall::StashPop);
        assert!(store.read_object(&path).await.is_ok());
    }

    #[tokio::test]
    async fn test_conflicts_block_until_resolved() {
        let dir = TempDir::new().unwrap();
        let store = ObjectStore::new(Layout::new(dir.path()));
        let path = dir.path().join("d/rules/R_[4].json");
        let vcs = FakeVcs::new().with_unresolved(vec![vec![path.clone()], vec![path.clone()]]);
        let prompter = Patient(AtomicUsize::new(0));

        let state = ThreeWayMerge::new(&vcs, &store, &path, ObjectType::Rule)
            .run(&remote(), &prompter)
            .await
            .unwrap();

        assert_eq!(state, MergeState::Resolved);
        assert_eq!(prompter.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_declined_resolution_leaves_object_blocked() {
        let dir = TempDir::new().unwrap();
        let store = ObjectStore::new(Layout::new(dir.path()));
        let path = dir.path().join("d/rules/R_[4].json");
        let vcs = FakeVcs::new().with_unresolved(vec![vec![path.clone()]]);

        let state = ThreeWayMerge::new(&vcs, &store, &path, ObjectType::Rule)
            .run(&remote(), &NonInteractive::default())
            .await
            .unwrap();
        assert_eq!(state, MergeState::Blocked);
    }

    #[tokio::test]
    async fn test_out_of_order_transition_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = ObjectStore::new(Layout::new(dir.path()));
        let vcs = FakeVcs::new();
        let mut merge = ThreeWayMerge::new(&vcs, &store, &dir.path().join("x.json"), ObjectType::Rule);
        assert!(merge.pop().is_err());
        assert_eq!(merge.state(), MergeState::Clean);
    }
}
