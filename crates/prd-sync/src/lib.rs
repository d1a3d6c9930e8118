//! # prd-sync
//!
//! Reconciliation between a local organization tree and the remote platform.
//!
//! This crate provides:
//! - A `Vcs` seam over git, plus an in-memory fake for tests
//! - Change detection with hook/formula companion remapping
//! - The pull reconciler, its merge state machine and stale object removal
//! - The push reconciler with create reclassification and cascade deletes
//! - A `Prompter` seam for operator decisions and a per-run `SyncContext`

pub mod changes;
pub mod context;
pub mod merge;
pub mod prompt;
pub mod pull;
pub mod push;
pub mod report;
pub mod routing;
pub mod snapshot;
pub mod stale;
pub mod vcs;

pub use changes::ChangeDetector;
pub use context::SyncContext;
pub use merge::{MergeState, ThreeWayMerge};
pub use prompt::{NonInteractive, Prompter, StrategyChoice, UnroutedObject};
pub use pull::{get_pull_decision, is_unchanged, PullReconciler};
pub use push::PushReconciler;
pub use report::{AppliedOperation, ObjectError, OperationKind, PullReport, PushReport};
pub use routing::Router;
pub use snapshot::RemoteSnapshot;
pub use stale::StaleRemover;
pub use vcs::{FakeVcs, GitCli, Vcs, VcsCall};
