//! Pull reconciliation: remote snapshot into the local tree.
//!
//! The remote hierarchy is walked top-down (organization, workspaces, queues,
//! then schema/inbox/email templates, then the flat types). Each object is
//! routed to a subdirectory, given a pull decision, and the decision applied.

use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

use prd_core::{ChangeSet, LocalObject, ObjectKey, ObjectType, PullStrategy, Result};
use prd_store::{NamedId, ObjectStore, ParentChain};

use crate::context::SyncContext;
use crate::merge::{MergeState, ThreeWayMerge};
use crate::prompt::{Prompter, UnroutedObject};
use crate::report::{ObjectError, PullReport};
use crate::routing::Router;
use crate::snapshot::RemoteSnapshot;
use crate::vcs::Vcs;

/// Whether the remote object is materially the same as the local file.
///
/// `modified_at` is the primary signal. Queues additionally compare their
/// `hooks` list and schemas their `rules` list.
///
/// TODO: review the `hooks`/`rules` comparison. If the remote does not bump
/// `modified_at` on those relationship edits, drift in other relationship
/// fields goes unnoticed as well.
pub fn is_unchanged(local: &LocalObject, remote: &LocalObject, object_type: ObjectType) -> bool {
    if local.modified_at != remote.modified_at {
        return false;
    }
    match object_type {
        ObjectType::Queue => local.field("hooks") == remote.field("hooks"),
        ObjectType::Schema => local.field("rules") == remote.field("rules"),
        _ => true,
    }
}

/// Decide how to reconcile one object. Never returns `Ask`.
pub async fn get_pull_decision(
    local: Option<&LocalObject>,
    remote: &LocalObject,
    key: ObjectKey,
    path: &Path,
    has_local_changes: bool,
    context: &mut SyncContext,
    prompter: &dyn Prompter,
) -> Result<PullStrategy> {
    let Some(local) = local else {
        return Ok(PullStrategy::Overwrite);
    };
    if is_unchanged(local, remote, key.object_type) {
        return Ok(PullStrategy::Skip);
    }
    if !has_local_changes {
        return Ok(PullStrategy::Overwrite);
    }

    if let Some(strategy) = context.sticky_strategy(key.object_type) {
        debug!(object_type = %key.object_type, object_id = key.id, strategy = %strategy, "Reusing conflict strategy");
        return Ok(strategy);
    }
    let choice = prompter.choose_pull_strategy(key, path).await?;
    let strategy = match choice.strategy {
        PullStrategy::Ask => PullStrategy::Skip,
        chosen => chosen,
    };
    if choice.apply_to_all {
        context.remember(key.object_type, strategy);
    }
    Ok(strategy)
}

/// Where a routed queue lives, for its children.
#[derive(Debug, Clone)]
struct QueueHome {
    subdir: String,
    workspace: NamedId,
    queue: NamedId,
}

impl QueueHome {
    fn chain(&self) -> ParentChain {
        ParentChain::new(self.subdir.clone())
            .with_workspace(self.workspace.clone())
            .with_queue(self.queue.clone())
    }
}

/// Applies a remote snapshot to one organization directory.
pub struct PullReconciler<'a> {
    store: &'a ObjectStore,
    vcs: &'a dyn Vcs,
    prompter: &'a dyn Prompter,
    router: Router,
    changed: ChangeSet,
    context: SyncContext,
}

impl<'a> PullReconciler<'a> {
    /// `changed` holds the paths with uncommitted local edits.
    pub fn new(
        store: &'a ObjectStore,
        vcs: &'a dyn Vcs,
        prompter: &'a dyn Prompter,
        router: Router,
        changed: ChangeSet,
        context: SyncContext,
    ) -> Self {
        Self {
            store,
            vcs,
            prompter,
            router,
            changed,
            context,
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn context(&self) -> &SyncContext {
        &self.context
    }

    pub async fn reconcile(&mut self, snapshot: &RemoteSnapshot) -> Result<PullReport> {
        let mut report = PullReport::default();
        let layout = self.store.layout().clone();

        let org_path = layout.organization_path();
        self.reconcile_object(ObjectType::Organization, &snapshot.organization, &org_path, &mut report)
            .await;

        // workspaces
        let mut workspace_subdirs: BTreeMap<i64, String> = BTreeMap::new();
        let workspaces = self
            .route_level(ObjectType::Workspace, snapshot.of(ObjectType::Workspace), |_| None, &mut report)
            .await?;
        for (workspace, subdir) in workspaces {
            let Some(id) = workspace.id else { continue };
            workspace_subdirs.insert(id, subdir.clone());
            if self.router.is_included(&subdir) {
                match layout.path_for(ObjectType::Workspace, &workspace, &ParentChain::new(subdir)) {
                    Ok(path) => {
                        self.reconcile_object(ObjectType::Workspace, &workspace, &path, &mut report)
                            .await
                    }
                    Err(e) => report.errors.push(object_error(&workspace, ObjectType::Workspace, e)),
                }
            }
        }

        // queues
        let mut queue_homes: BTreeMap<i64, QueueHome> = BTreeMap::new();
        let queues = self
            .route_level(
                ObjectType::Queue,
                snapshot.of(ObjectType::Queue),
                |queue| {
                    queue
                        .related_id("workspace")
                        .and_then(|ws| workspace_subdirs.get(&ws).cloned())
                },
                &mut report,
            )
            .await?;
        for (queue, subdir) in queues {
            let Some(queue_id) = queue.id else { continue };
            let workspace = queue
                .related_id("workspace")
                .and_then(|ws| snapshot.get(&ObjectKey::new(ObjectType::Workspace, ws)))
                .and_then(NamedId::of);
            let Some(workspace) = workspace else {
                warn!(object_type = "queue", object_id = queue_id, "Queue without a resolvable workspace, skipping");
                continue;
            };
            let home = QueueHome {
                subdir,
                workspace,
                queue: NamedId::new(queue.display_name(), queue_id),
            };
            if self.router.is_included(&home.subdir) {
                match layout.path_for(ObjectType::Queue, &queue, &home.chain()) {
                    Ok(path) => self.reconcile_object(ObjectType::Queue, &queue, &path, &mut report).await,
                    Err(e) => report.errors.push(object_error(&queue, ObjectType::Queue, e)),
                }
            }
            queue_homes.insert(queue_id, home);
        }

        // queue children
        for object_type in [ObjectType::Schema, ObjectType::Inbox, ObjectType::EmailTemplate] {
            for object in snapshot.of(object_type) {
                let queue_ids = match object_type {
                    ObjectType::EmailTemplate => object.related_id("queue").into_iter().collect(),
                    _ => object.related_ids("queues"),
                };
                let homes: Vec<&QueueHome> = queue_ids.iter().filter_map(|q| queue_homes.get(q)).collect();
                let (Some(id), Some(first)) = (object.id, homes.first()) else {
                    warn!(object_type = %object_type, object_id = ?object.id, "No resolvable queue, skipping");
                    continue;
                };
                let key = ObjectKey::new(object_type, id);
                self.router.route(key, object.display_name(), Some(&first.subdir));
                for home in homes {
                    if !self.router.is_included(&home.subdir) {
                        continue;
                    }
                    match layout.path_for(object_type, object, &home.chain()) {
                        Ok(path) => self.reconcile_object(object_type, object, &path, &mut report).await,
                        Err(e) => report.errors.push(object_error(object, object_type, e)),
                    }
                }
            }
        }

        // flat types
        for object_type in ObjectType::FLAT {
            let routed = self
                .route_level(object_type, snapshot.of(object_type), |_| None, &mut report)
                .await?;
            for (object, subdir) in routed {
                if !self.router.is_included(&subdir) {
                    continue;
                }
                match layout.path_for(object_type, &object, &ParentChain::new(subdir)) {
                    Ok(path) => self.reconcile_object(object_type, &object, &path, &mut report).await,
                    Err(e) => report.errors.push(object_error(&object, object_type, e)),
                }
            }
        }

        info!(
            written = report.written.len(),
            skipped = report.skipped,
            merged = report.merged.len(),
            blocked = report.blocked.len(),
            unrouted = report.unrouted.len(),
            errors = report.errors.len(),
            "Pull reconciled"
        );
        Ok(report)
    }

    /// Route one hierarchy level. Objects nothing claims are offered to the
    /// prompter in one batch; those it leaves out are reported as unrouted.
    async fn route_level<F>(
        &mut self,
        object_type: ObjectType,
        objects: &[LocalObject],
        parent_of: F,
        report: &mut PullReport,
    ) -> Result<Vec<(LocalObject, String)>>
    where
        F: Fn(&LocalObject) -> Option<String>,
    {
        let mut routed = Vec::new();
        let mut unrouted = Vec::new();
        for object in objects {
            let Some(id) = object.id else { continue };
            let key = ObjectKey::new(object_type, id);
            let parent = parent_of(object);
            match self.router.route(key, object.display_name(), parent.as_deref()) {
                Some(subdir) => routed.push((object.clone(), subdir)),
                None => unrouted.push((object.clone(), key)),
            }
        }

        if unrouted.is_empty() {
            return Ok(routed);
        }
        let offered: Vec<UnroutedObject> = unrouted
            .iter()
            .map(|(object, key)| UnroutedObject {
                key: *key,
                name: object.display_name().to_string(),
            })
            .collect();
        let assigned = self
            .prompter
            .choose_subdirectories(&offered, &self.router.names())
            .await?;
        for (object, key) in unrouted {
            match assigned.get(&key).filter(|s| self.router.get(s).is_some()) {
                Some(subdir) => {
                    self.router.assign(key, subdir);
                    routed.push((object, subdir.clone()));
                }
                None => {
                    warn!(object_type = %key.object_type, object_id = key.id, "Unrouted object skipped");
                    report.unrouted.push(key);
                }
            }
        }
        Ok(routed)
    }

    /// Decide and apply for one object. Failures land in the report.
    async fn reconcile_object(
        &mut self,
        object_type: ObjectType,
        remote: &LocalObject,
        path: &Path,
        report: &mut PullReport,
    ) {
        if let Err(e) = self.try_reconcile_object(object_type, remote, path, report).await {
            warn!(object_type = %object_type, object_id = ?remote.id, path = %path.display(), error = %e, "Pull failed for object");
            report.errors.push(object_error(remote, object_type, e).at(path));
        }
    }

    async fn try_reconcile_object(
        &mut self,
        object_type: ObjectType,
        remote: &LocalObject,
        path: &Path,
        report: &mut PullReport,
    ) -> Result<()> {
        let key = ObjectKey::new(object_type, remote.id.unwrap_or_default());
        let local = self.store.try_read_object(path).await?;
        if local.as_ref().is_some_and(LocalObject::is_foreign) {
            warn!(path = %path.display(), "Foreign file at object path, leaving untouched");
            report.skipped += 1;
            return Ok(());
        }

        let has_local_changes = self.changed.contains(path);
        let strategy = get_pull_decision(
            local.as_ref(),
            remote,
            key,
            path,
            has_local_changes,
            &mut self.context,
            self.prompter,
        )
        .await?;
        debug!(object_type = %object_type, object_id = key.id, strategy = %strategy, "Pull decision");

        match strategy {
            PullStrategy::Skip | PullStrategy::Ask => report.skipped += 1,
            PullStrategy::Overwrite => {
                if self.store.write_object(path, remote, object_type).await?.is_written() {
                    info!(object_type = %object_type, object_id = key.id, path = %self.store.layout().relative(path).display(), "Pulled");
                    report.written.push(path.to_path_buf());
                } else {
                    report.skipped += 1;
                }
            }
            PullStrategy::Merge => {
                let state = ThreeWayMerge::new(self.vcs, self.store, path, object_type)
                    .run(remote, self.prompter)
                    .await?;
                match state {
                    MergeState::Resolved => report.merged.push(path.to_path_buf()),
                    _ => report.blocked.push(path.to_path_buf()),
                }
            }
        }
        Ok(())
    }
}

fn object_error(object: &LocalObject, object_type: ObjectType, e: prd_core::Error) -> ObjectError {
    let error = ObjectError::new(e.to_string()).for_type(object_type);
    match object.id {
        Some(id) => error.for_key(ObjectKey::new(object_type, id)),
        None => error,
    }
}
