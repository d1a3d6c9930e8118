//! # prd-mapping
//!
//! Cross-environment mapping store for prd.
//!
//! This crate provides:
//! - The `mapping.yaml` tree (organization → workspaces → queues → schema/inbox,
//!   plus flat hooks, schemas, rules, labels and engines)
//! - Regeneration after a pull, keeping targets that are still observed
//! - Placeholder listing and source → target lookups

pub mod file;
pub mod model;
pub mod regenerate;

pub use file::{load, save};
pub use model::{Mapping, MappingEntry, OrganizationNode, QueueNode, Target, WorkspaceNode};
pub use regenerate::{prune_targets, regenerate, MappingSource};
