//! # prd-store
//!
//! Local object store for prd.
//!
//! This crate provides:
//! - Path templating (`{name}_[{id}]`) and the per-type directory layout
//! - Whole-file JSON reads and writes with ignored-key stripping
//! - Hook source and schema formula companion files
//! - A tree index (`{type: {id: path}}`, `{type: {id: name}}`) rebuilt each run

pub mod companions;
pub mod index;
pub mod layout;
pub mod store;

pub use index::{IndexedObject, TreeIndex};
pub use layout::{classify, id_from_path, Layout, NamedId, ParentChain};
pub use store::{render_object, ObjectStore, WriteOutcome};
