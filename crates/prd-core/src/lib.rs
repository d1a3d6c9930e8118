//! # prd-core
//!
//! Core types, errors, and configuration for prd, the tool that keeps a
//! git-tracked directory of platform configuration objects in sync with the
//! remote platform.
//!
//! This crate provides the foundational data structures that the store,
//! remote, sync, and mapping crates depend on.

pub mod changes;
pub mod config;
pub mod defaults;
pub mod error;
pub mod models;
pub mod strategy;
pub mod subdir;

// Re-export commonly used types at crate root
pub use changes::{ChangeOp, ChangeRecord, ChangeSet};
pub use config::{OrgDirConfig, ProjectConfig, SubdirConfig};
pub use error::{Error, Result};
pub use models::{id_from_url, LocalObject, ObjectKey, ObjectType};
pub use strategy::PullStrategy;
pub use subdir::Subdirectory;
