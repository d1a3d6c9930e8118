//! Push reconciliation: local change records into remote requests.
//!
//! 1. Staged or untracked JSON whose id already exists remotely is an update,
//!    not a create. Organization and inbox objects are never created.
//! 2. Changes outside the configured subdirectories are dropped.
//! 3. Updates are guarded by `modified_at`; creates clear the id and rewrite
//!    the local file from the response.
//! 4. Creates and updates run with bounded concurrency, parents before
//!    children. Deletes run afterwards, one at a time, dependents first.
//!
//! Every per-object failure is collected in the report; siblings carry on.

use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use prd_core::{ChangeOp, ChangeSet, Error, LocalObject, ObjectKey, ObjectType, Result};
use prd_remote::RemoteApi;
use prd_store::layout::{classify, id_from_path};
use prd_store::{ObjectStore, TreeIndex};

use crate::context::SyncContext;
use crate::prompt::Prompter;
use crate::report::{AppliedOperation, ObjectError, OperationKind, PushReport};
use crate::routing::Router;
use crate::vcs::Vcs;

#[derive(Debug, Clone)]
struct PendingWrite {
    kind: OperationKind,
    object_type: ObjectType,
    path: PathBuf,
    object: LocalObject,
}

#[derive(Debug, Clone)]
struct PendingDelete {
    key: ObjectKey,
    path: PathBuf,
    /// Part of a confirmed workspace cascade.
    cascade: bool,
}

fn failure(object_type: ObjectType, id: Option<i64>, path: &Path, message: impl Into<String>) -> ObjectError {
    let error = ObjectError::new(message).for_type(object_type).at(path);
    match id {
        Some(id) => error.for_key(ObjectKey::new(object_type, id)),
        None => error,
    }
}

/// Sends local changes of one organization directory to the remote.
pub struct PushReconciler<'a> {
    remote: &'a dyn RemoteApi,
    store: &'a ObjectStore,
    vcs: &'a dyn Vcs,
    prompter: &'a dyn Prompter,
    router: &'a Router,
    index: &'a TreeIndex,
    context: &'a SyncContext,
}

impl<'a> PushReconciler<'a> {
    pub fn new(
        remote: &'a dyn RemoteApi,
        store: &'a ObjectStore,
        vcs: &'a dyn Vcs,
        prompter: &'a dyn Prompter,
        router: &'a Router,
        index: &'a TreeIndex,
        context: &'a SyncContext,
    ) -> Self {
        Self {
            remote,
            store,
            vcs,
            prompter,
            router,
            index,
            context,
        }
    }

    pub async fn push(&self, changes: &ChangeSet) -> Result<PushReport> {
        let mut report = PushReport::default();
        let mut writes = Vec::new();
        let mut deletes = Vec::new();

        for record in changes.records() {
            let Some(object_type) = classify(&record.path) else {
                continue;
            };
            if !self.in_scope(&record.path) {
                continue;
            }
            if record.op == ChangeOp::Deleted {
                match self.deleted_id(&record.path, object_type) {
                    Some(id) => deletes.push(PendingDelete {
                        key: ObjectKey::new(object_type, id),
                        path: record.path,
                        cascade: false,
                    }),
                    None => report.errors.push(failure(
                        object_type,
                        None,
                        &record.path,
                        "cannot determine the id of a deleted file",
                    )),
                }
                continue;
            }
            match self.store.read_object(&record.path).await {
                Ok(object) => writes.push(PendingWrite {
                    kind: if record.op.is_create() {
                        OperationKind::Create
                    } else {
                        OperationKind::Update
                    },
                    object_type,
                    path: record.path,
                    object,
                }),
                Err(e) => report
                    .errors
                    .push(failure(object_type, None, &record.path, e.to_string())),
            }
        }

        let writes = self.reclassify(writes, &mut report).await;

        // parents before children so creates can reference them
        let mut remaining = writes;
        for object_type in ObjectType::ALL {
            let (batch, rest): (Vec<_>, Vec<_>) = remaining
                .into_iter()
                .partition(|w| w.object_type == object_type);
            remaining = rest;
            if batch.is_empty() {
                continue;
            }
            let results: Vec<std::result::Result<AppliedOperation, ObjectError>> = stream::iter(batch)
                .map(|write| self.apply_write(write))
                .buffer_unordered(self.context.max_in_flight.max(1))
                .collect()
                .await;
            for result in results {
                match result {
                    Ok(applied) => report.applied.push(applied),
                    Err(error) => report.errors.push(error),
                }
            }
        }

        self.apply_deletes(deletes, &mut report).await;

        info!(
            applied = report.applied.len(),
            errors = report.errors.len(),
            "Push finished"
        );
        Ok(report)
    }

    /// Organization file, or a change inside an included subdirectory.
    fn in_scope(&self, path: &Path) -> bool {
        let layout = self.store.layout();
        match layout.subdir_of(path) {
            None => path == layout.organization_path(),
            Some(subdir) => match self.router.get(&subdir) {
                None => {
                    warn!(path = %layout.relative(path).display(), subdir = %subdir, "Change outside any configured subdirectory, dropping");
                    false
                }
                Some(s) => s.include,
            },
        }
    }

    /// Id of a deleted file: committed content first, then the path suffix.
    fn deleted_id(&self, path: &Path, object_type: ObjectType) -> Option<i64> {
        let committed = self
            .vcs
            .show_head(path)
            .ok()
            .flatten()
            .and_then(|text| serde_json::from_str::<LocalObject>(&text).ok())
            .and_then(|object| object.id);
        committed.or_else(|| id_from_path(path, object_type))
    }

    /// Creates whose id exists remotely become updates; creates of
    /// non-creatable types are dropped.
    async fn reclassify(&self, writes: Vec<PendingWrite>, report: &mut PushReport) -> Vec<PendingWrite> {
        let probed: Vec<(PendingWrite, Result<bool>)> = stream::iter(writes)
            .map(|write| async move {
                let exists = match (write.kind, write.object.id) {
                    (OperationKind::Create, Some(id)) => self
                        .remote
                        .try_fetch(write.object_type, id)
                        .await
                        .map(|found| found.is_some()),
                    _ => Ok(false),
                };
                (write, exists)
            })
            .buffer_unordered(self.context.max_in_flight.max(1))
            .collect()
            .await;

        let mut kept = Vec::new();
        for (mut write, exists) in probed {
            match exists {
                Err(e) => {
                    report.errors.push(failure(write.object_type, write.object.id, &write.path, e.to_string()));
                    continue;
                }
                Ok(true) => {
                    debug!(object_type = %write.object_type, object_id = ?write.object.id, "Already remote, pushing as update");
                    write.kind = OperationKind::Update;
                }
                Ok(false) => {}
            }
            if write.kind == OperationKind::Create && !write.object_type.is_creatable() {
                warn!(object_type = %write.object_type, path = %write.path.display(), "Object type cannot be created, dropping");
                continue;
            }
            kept.push(write);
        }
        kept
    }

    async fn apply_write(&self, write: PendingWrite) -> std::result::Result<AppliedOperation, ObjectError> {
        let PendingWrite {
            kind,
            object_type,
            path,
            object,
        } = write;
        let result = match kind {
            OperationKind::Create => self.create(object_type, &path, &object).await,
            _ => self.update(object_type, &path, &object).await,
        };
        result.map_err(|e| {
            warn!(object_type = %object_type, object_id = ?object.id, path = %path.display(), error = %e, "Push failed for object");
            failure(object_type, object.id, &path, e.to_string())
        })
    }

    async fn create(&self, object_type: ObjectType, path: &Path, object: &LocalObject) -> Result<AppliedOperation> {
        let mut body = object.clone();
        body.id = None;
        body.url = None;
        body.strip_keys(object_type.ignored_keys());
        let created = self.remote.create(object_type, &body).await?;
        let id = created
            .id
            .ok_or_else(|| Error::Serialization(format!("created {} has no id", object_type)))?;
        self.store.write_object(path, &created, object_type).await?;
        info!(object_type = %object_type, object_id = id, path = %self.store.layout().relative(path).display(), "Created remotely");
        Ok(AppliedOperation {
            kind: OperationKind::Create,
            object_type,
            object_id: id,
            path: path.to_path_buf(),
        })
    }

    async fn update(&self, object_type: ObjectType, path: &Path, object: &LocalObject) -> Result<AppliedOperation> {
        let id = object
            .id
            .ok_or_else(|| Error::InvalidInput("update without an id".to_string()))?;

        if !self.context.force {
            let current = match self.remote.fetch_one(object_type, id).await {
                Ok(current) => current,
                Err(e) if e.is_not_found() && self.context.upload_all && object_type.is_creatable() => {
                    warn!(object_type = %object_type, object_id = id, "Missing remotely, recreating");
                    return self.create(object_type, path, object).await;
                }
                Err(e) => return Err(e),
            };
            if current.modified_at != object.modified_at {
                return Err(Error::Conflict(format!(
                    "remote modified_at {} differs from local {}; pull first or push with --force",
                    current.modified_at.as_deref().unwrap_or("-"),
                    object.modified_at.as_deref().unwrap_or("-")
                )));
            }
        }

        let mut body = object.clone();
        body.strip_keys(object_type.ignored_keys());
        if object_type == ObjectType::Queue {
            body.strip_keys(&["inbox"]);
        }

        let updated = match self.remote.update(object_type, id, &body).await {
            Ok(updated) => updated,
            Err(e) if self.context.upload_all && object_type.is_creatable() => {
                warn!(object_type = %object_type, object_id = id, error = %e, "Update failed, retrying as create");
                return self.create(object_type, path, object).await;
            }
            Err(e) => return Err(e),
        };
        // keep the local copy's modified_at in step with the remote
        let mut local = object.clone();
        local.modified_at = updated.modified_at.clone().or(local.modified_at);
        self.store.write_object(path, &local, object_type).await?;
        info!(object_type = %object_type, object_id = id, path = %self.store.layout().relative(path).display(), "Updated remotely");
        Ok(AppliedOperation {
            kind: OperationKind::Update,
            object_type,
            object_id: id,
            path: path.to_path_buf(),
        })
    }

    /// Sequential deletes, dependents first. A deleted `workspace.json`
    /// cascades over everything nested under it once confirmed.
    async fn apply_deletes(&self, deletes: Vec<PendingDelete>, report: &mut PushReport) {
        let mut remaining = deletes;
        let workspaces: Vec<PendingDelete> = remaining
            .iter()
            .filter(|d| d.key.object_type == ObjectType::Workspace)
            .cloned()
            .collect();

        let mut ordered = Vec::new();
        for workspace in workspaces {
            let Some(dir) = workspace.path.parent().map(Path::to_path_buf) else {
                continue;
            };
            let (nested, rest): (Vec<_>, Vec<_>) = remaining
                .into_iter()
                .partition(|d| d.path.starts_with(&dir));
            remaining = rest;

            let children = self.cascade_children(&dir, &nested, workspace.key);
            let child_paths: Vec<PathBuf> = children.iter().map(|c| c.path.clone()).collect();
            let confirmed = match self.prompter.confirm_cascade_delete(&workspace.path, &child_paths).await {
                Ok(confirmed) => confirmed,
                Err(e) => {
                    report.errors.push(failure(ObjectType::Workspace, Some(workspace.key.id), &workspace.path, e.to_string()));
                    continue;
                }
            };
            if !confirmed {
                report.errors.push(failure(
                    ObjectType::Workspace,
                    Some(workspace.key.id),
                    &workspace.path,
                    "cascade delete not confirmed",
                ));
                continue;
            }
            ordered.extend(children.into_iter().map(|child| PendingDelete { cascade: true, ..child }));
            ordered.push(PendingDelete { cascade: true, ..workspace });
        }

        remaining.sort_by_key(|d| d.key.object_type.delete_rank());
        let ordered_keys: BTreeSet<ObjectKey> = ordered.iter().map(|d| d.key).collect();
        remaining.retain(|d| !ordered_keys.contains(&d.key));
        let mut all = remaining;
        all.extend(ordered);

        for delete in all {
            match delete.key.object_type {
                ObjectType::Organization => {
                    report.errors.push(failure(
                        ObjectType::Organization,
                        Some(delete.key.id),
                        &delete.path,
                        "organizations cannot be deleted",
                    ));
                    continue;
                }
                ObjectType::Inbox => {
                    debug!(object_id = delete.key.id, "Inbox is removed together with its queue");
                    if delete.cascade {
                        if let Err(e) = self.store.remove_object(&delete.path, ObjectType::Inbox).await {
                            warn!(path = %delete.path.display(), error = %e, "Local removal failed");
                        }
                    }
                    continue;
                }
                _ => {}
            }
            match self.remote.delete(delete.key.object_type, delete.key.id).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    debug!(object_type = %delete.key.object_type, object_id = delete.key.id, "Already gone remotely");
                }
                Err(e) => {
                    warn!(object_type = %delete.key.object_type, object_id = delete.key.id, error = %e, "Delete failed");
                    report.errors.push(failure(delete.key.object_type, Some(delete.key.id), &delete.path, e.to_string()));
                    continue;
                }
            }
            if let Err(e) = self.store.remove_object(&delete.path, delete.key.object_type).await {
                warn!(path = %delete.path.display(), error = %e, "Local removal failed");
            }
            info!(object_type = %delete.key.object_type, object_id = delete.key.id, "Deleted remotely");
            report.applied.push(AppliedOperation {
                kind: OperationKind::Delete,
                object_type: delete.key.object_type,
                object_id: delete.key.id,
                path: delete.path,
            });
        }
    }

    /// Everything under a workspace directory, dependents first.
    fn cascade_children(&self, dir: &Path, nested: &[PendingDelete], workspace: ObjectKey) -> Vec<PendingDelete> {
        let mut seen = BTreeSet::new();
        let mut children: Vec<PendingDelete> = Vec::new();
        let from_index = self
            .index
            .objects()
            .iter()
            .filter(|o| o.path.starts_with(dir))
            .map(|o| PendingDelete {
                key: o.key,
                path: o.path.clone(),
                cascade: true,
            });
        for child in nested.iter().cloned().chain(from_index) {
            if child.key == workspace {
                continue;
            }
            if seen.insert(child.key) {
                children.push(child);
            }
        }
        children.sort_by_key(|c| c.key.object_type.delete_rank());
        children
    }
}
