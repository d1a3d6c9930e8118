//! Stale object removal.
//!
//! Runs after every pull of an organization has completed. A local object is
//! stale when its id is gone remotely or when the path computed from the
//! remote's current name and parents differs (case-insensitively) from where
//! the file sits. Schemas and inboxes are placed by their queue, so only a
//! change of that queue's location, or the queue dropping them, makes them
//! stale.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use prd_core::{LocalObject, ObjectKey, ObjectType, Result};
use prd_store::companions::{formula_dir, formula_fields};
use prd_store::layout::id_from_stem;
use prd_store::{IndexedObject, NamedId, ObjectStore, ParentChain, TreeIndex};

use crate::routing::Router;
use crate::snapshot::RemoteSnapshot;

fn same_path(a: &Path, b: &Path) -> bool {
    a.to_string_lossy().to_lowercase() == b.to_string_lossy().to_lowercase()
}

/// Removes local objects invalidated by remote state.
pub struct StaleRemover<'a> {
    store: &'a ObjectStore,
    router: &'a Router,
}

impl<'a> StaleRemover<'a> {
    pub fn new(store: &'a ObjectStore, router: &'a Router) -> Self {
        Self { store, router }
    }

    /// Delete stale objects (with their companions) and prune orphaned
    /// formula files. Returns every removed path.
    pub async fn remove_stale(&self, index: &TreeIndex, snapshot: &RemoteSnapshot) -> Result<Vec<PathBuf>> {
        let remote_ids = snapshot.ids_by_type();
        let mut removed = Vec::new();

        for entry in index.objects() {
            let object_type = entry.key.object_type;
            if object_type == ObjectType::Organization {
                continue;
            }
            let Some(subdir) = entry.subdir.as_deref() else {
                continue;
            };
            if !self.router.is_included(subdir) {
                continue;
            }

            let present = remote_ids
                .get(&object_type)
                .is_some_and(|ids| ids.contains(&entry.key.id));
            let reason = if !present {
                Some("deleted remotely")
            } else {
                match self.canonical_path(entry, subdir, snapshot) {
                    Some(expected) if same_path(&expected, &entry.path) => None,
                    Some(_) => Some("renamed or moved remotely"),
                    None => Some("no longer reachable from its parent"),
                }
            };

            match reason {
                Some(reason) => {
                    info!(object_type = %object_type, object_id = entry.key.id, path = %self.store.layout().relative(&entry.path).display(), reason, "Removing stale object");
                    removed.extend(self.store.remove_object(&entry.path, object_type).await?);
                }
                None if object_type == ObjectType::Schema => {
                    if let Some(schema) = snapshot.get(&entry.key) {
                        removed.extend(self.prune_formulas(&entry.path, schema).await?);
                    }
                }
                None => {}
            }
        }
        Ok(removed)
    }

    /// Where the remote says this object belongs, or `None` when its parent
    /// chain no longer resolves.
    fn canonical_path(&self, entry: &IndexedObject, subdir: &str, snapshot: &RemoteSnapshot) -> Option<PathBuf> {
        let layout = self.store.layout();
        let object_type = entry.key.object_type;
        let remote = snapshot.get(&entry.key)?;
        let chain = match object_type {
            ObjectType::Workspace => ParentChain::new(subdir),
            ObjectType::Queue => queue_chain(subdir, remote, snapshot)?,
            ObjectType::EmailTemplate => {
                let queue = snapshot.get(&ObjectKey::new(ObjectType::Queue, remote.related_id("queue")?))?;
                queue_chain(subdir, queue, snapshot)?.with_queue(NamedId::of(queue)?)
            }
            ObjectType::Schema | ObjectType::Inbox => {
                // keyed by the queue directory the file sits in
                let queue_dir = entry.path.parent()?;
                let queue_id = id_from_stem(queue_dir.file_name()?.to_str()?)?;
                let queue = snapshot.get(&ObjectKey::new(ObjectType::Queue, queue_id))?;
                if queue.related_id(object_type.singular()) != Some(entry.key.id) {
                    return None;
                }
                queue_chain(subdir, queue, snapshot)?.with_queue(NamedId::of(queue)?)
            }
            _ => ParentChain::new(subdir),
        };
        layout.path_for(object_type, remote, &chain).ok()
    }

    async fn prune_formulas(&self, schema_path: &Path, schema: &LocalObject) -> Result<Vec<PathBuf>> {
        let fields: BTreeSet<String> = formula_fields(schema).into_keys().collect();
        let mut removed = Vec::new();
        for file in self.store.companions_of(schema_path, ObjectType::Schema).await? {
            let known = file
                .file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|stem| fields.contains(stem));
            if !known && self.store.remove_file(&file).await? {
                debug!(path = %file.display(), "Removed orphaned formula");
                removed.push(file);
            }
        }
        if !removed.is_empty() {
            self.store.prune_empty_dirs(&formula_dir(schema_path)).await?;
        }
        Ok(removed)
    }
}

fn queue_chain(subdir: &str, queue: &LocalObject, snapshot: &RemoteSnapshot) -> Option<ParentChain> {
    let workspace = snapshot.get(&ObjectKey::new(ObjectType::Workspace, queue.related_id("workspace")?))?;
    Some(ParentChain::new(subdir).with_workspace(NamedId::of(workspace)?))
}
