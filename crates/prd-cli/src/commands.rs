//! Per-organization orchestration behind each subcommand.

use anyhow::Context;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use prd_core::{ChangeSet, Error, ObjectType, OrgDirConfig, ProjectConfig, PullStrategy};
use prd_mapping::{regenerate, Mapping, MappingSource};
use prd_remote::{RemoteApi, RemoteClient, RemoteConfig};
use prd_store::{Layout, ObjectStore, TreeIndex};
use prd_sync::{
    ChangeDetector, GitCli, Prompter, PullReconciler, PullReport, PushReconciler, PushReport,
    RemoteSnapshot, Router, StaleRemover, SyncContext, Vcs,
};

/// Result of pulling one organization directory.
pub struct OrgPull {
    pub report: PullReport,
    pub snapshot: RemoteSnapshot,
}

/// Index, fetch, reconcile, then remove stale objects once everything of the
/// organization has been pulled.
pub async fn pull_org(
    store: &ObjectStore,
    dir: &OrgDirConfig,
    remote: &dyn RemoteApi,
    vcs: &dyn Vcs,
    prompter: &dyn Prompter,
    context: SyncContext,
) -> prd_core::Result<OrgPull> {
    let mut subdirs = dir.subdirectories()?;
    TreeIndex::scan(store).await?.seed_subdirectories(&mut subdirs);
    let changed = ChangeDetector::new(vcs, store).preview(false)?;
    let snapshot = RemoteSnapshot::fetch(remote, dir.org_id, context.max_in_flight).await?;

    let mut reconciler = PullReconciler::new(store, vcs, prompter, Router::new(subdirs), changed, context);
    let mut report = reconciler.reconcile(&snapshot).await?;

    let index = TreeIndex::scan(store).await?;
    report.removed = StaleRemover::new(store, reconciler.router())
        .remove_stale(&index, &snapshot)
        .await?;
    Ok(OrgPull { report, snapshot })
}

/// Merge sidecars, then push every local change of one organization directory.
pub async fn push_org(
    store: &ObjectStore,
    dir: &OrgDirConfig,
    remote: &dyn RemoteApi,
    vcs: &dyn Vcs,
    prompter: &dyn Prompter,
    context: &SyncContext,
    indexed_only: bool,
) -> prd_core::Result<PushReport> {
    let mut subdirs = dir.subdirectories()?;
    let index = TreeIndex::scan(store).await?;
    index.seed_subdirectories(&mut subdirs);
    let router = Router::new(subdirs);
    let changes = ChangeDetector::new(vcs, store).detect(indexed_only).await?;
    if changes.is_empty() {
        info!(org_dir = %store.layout().org_dir().display(), "Nothing to push");
        return Ok(PushReport::default());
    }
    PushReconciler::new(remote, store, vcs, prompter, &router, &index, context)
        .push(&changes)
        .await
}

pub fn mapping_source(snapshot: &RemoteSnapshot) -> MappingSource {
    ObjectType::ALL
        .into_iter()
        .filter(|t| *t != ObjectType::Organization)
        .fold(MappingSource::new(snapshot.organization.clone()), |source, t| {
            source.with(t, snapshot.of(t).to_vec())
        })
}

/// Regenerate and save `mapping.yaml` of a source organization.
pub async fn update_mapping(
    store: &ObjectStore,
    snapshot: &RemoteSnapshot,
    observed: &BTreeSet<i64>,
) -> prd_core::Result<Mapping> {
    let path = store.layout().mapping_path();
    let previous = prd_mapping::load(&path).await?;
    let mapping = regenerate(previous.as_ref(), &mapping_source(snapshot), observed);
    prd_mapping::save(&path, &mapping).await?;
    Ok(mapping)
}

// =============================================================================
// SUBCOMMANDS
// =============================================================================

/// Shared settings of one invocation.
pub struct Invocation<'a> {
    pub project: &'a Path,
    pub config: &'a ProjectConfig,
    pub prompter: &'a dyn Prompter,
    pub json: bool,
}

impl Invocation<'_> {
    /// Requested directories, or all of them.
    fn selected(&self, names: &[String]) -> anyhow::Result<Vec<(String, OrgDirConfig)>> {
        if names.is_empty() {
            return Ok(self
                .config
                .directories
                .iter()
                .map(|(name, dir)| (name.clone(), dir.clone()))
                .collect());
        }
        names
            .iter()
            .map(|name| -> anyhow::Result<(String, OrgDirConfig)> {
                Ok((name.clone(), self.config.directory(name)?.clone()))
            })
            .collect()
    }

    fn store(&self, name: &str) -> ObjectStore {
        ObjectStore::new(Layout::new(self.project.join(name)))
    }

    fn connect(&self, dir: &OrgDirConfig) -> anyhow::Result<(RemoteClient, RemoteConfig)> {
        let config = RemoteConfig::for_org(dir)?;
        let client = RemoteClient::from_config(&config)?;
        Ok((client, config))
    }

    fn print<T: serde::Serialize>(&self, reports: &BTreeMap<String, T>, text: impl Fn(&str, &T) -> String) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(reports)?);
        } else {
            for (name, report) in reports {
                println!("{}", text(name, report));
            }
        }
        Ok(())
    }
}

/// Ids present locally in directories not pulled this run, so their
/// correspondences are not dropped from the mapping.
async fn indexed_ids(invocation: &Invocation<'_>, skip: &BTreeSet<String>) -> anyhow::Result<BTreeSet<i64>> {
    let mut ids = BTreeSet::new();
    for name in invocation.config.directories.keys() {
        if skip.contains(name) {
            continue;
        }
        let index = TreeIndex::scan(&invocation.store(name)).await?;
        ids.extend(index.objects().iter().map(|o| o.key.id));
    }
    Ok(ids)
}

pub async fn pull(invocation: &Invocation<'_>, names: &[String], strategy: PullStrategy) -> anyhow::Result<bool> {
    let mut reports = BTreeMap::new();
    let mut pulled = Vec::new();
    let mut clean = true;

    for (name, dir) in invocation.selected(names)? {
        let store = invocation.store(&name);
        tokio::fs::create_dir_all(store.layout().org_dir())
            .await
            .with_context(|| format!("cannot create {}", store.layout().org_dir().display()))?;
        let (client, remote_config) = invocation.connect(&dir)?;
        let vcs = GitCli::open(store.layout().org_dir())?;
        let context = SyncContext::new()
            .with_strategy(strategy)
            .with_max_in_flight(remote_config.max_in_flight);

        info!(org_dir = %name, org_id = dir.org_id, "Pulling organization");
        match pull_org(&store, &dir, &client, &vcs, invocation.prompter, context).await {
            Ok(OrgPull { report, snapshot }) => {
                clean &= report.is_clean();
                reports.insert(name.clone(), report);
                pulled.push((name, dir, store, snapshot));
            }
            Err(e @ Error::Download { .. }) => {
                error!(org_dir = %name, error = %e, "Organization skipped");
                clean = false;
            }
            Err(e) => return Err(e).with_context(|| format!("pull of {} failed", name)),
        }
    }

    let pulled_names: BTreeSet<String> = pulled.iter().map(|(name, ..)| name.clone()).collect();
    let mut observed = indexed_ids(invocation, &pulled_names).await?;
    for (.., snapshot) in &pulled {
        observed.extend(snapshot.all_ids());
    }
    for (name, dir, store, snapshot) in &pulled {
        if dir.source {
            let mapping = update_mapping(store, snapshot, &observed).await?;
            let placeholders = mapping.placeholders().len();
            if placeholders > 0 {
                warn!(org_dir = %name, placeholders, "Mapping has entries without a target");
            }
        }
    }

    invocation.print(&reports, |name, r| {
        let mut line = format!(
            "{}: {} written, {} unchanged, {} merged, {} blocked, {} unrouted, {} removed",
            name,
            r.written.len(),
            r.skipped,
            r.merged.len(),
            r.blocked.len(),
            r.unrouted.len(),
            r.removed.len()
        );
        for path in &r.blocked {
            line.push_str(&format!("\n  conflict: {}", path.display()));
        }
        for e in &r.errors {
            line.push_str(&format!("\n  error: {}", e));
        }
        line
    })?;
    Ok(clean)
}

pub async fn push(
    invocation: &Invocation<'_>,
    names: &[String],
    context: SyncContext,
    indexed_only: bool,
) -> anyhow::Result<bool> {
    let mut reports = BTreeMap::new();
    let mut clean = true;
    for (name, dir) in invocation.selected(names)? {
        let store = invocation.store(&name);
        let (client, remote_config) = invocation.connect(&dir)?;
        let vcs = GitCli::open(store.layout().org_dir())?;
        let context = context.clone().with_max_in_flight(remote_config.max_in_flight);

        info!(org_dir = %name, org_id = dir.org_id, "Pushing organization");
        let report = push_org(&store, &dir, &client, &vcs, invocation.prompter, &context, indexed_only)
            .await
            .with_context(|| format!("push of {} failed", name))?;
        clean &= report.errors.is_empty();
        reports.insert(name, report);
    }

    invocation.print(&reports, |name, r| {
        let mut line = format!(
            "{}: {} created, {} updated, {} deleted",
            name,
            r.count(prd_sync::OperationKind::Create),
            r.count(prd_sync::OperationKind::Update),
            r.count(prd_sync::OperationKind::Delete)
        );
        for e in &r.errors {
            line.push_str(&format!("\n  error: {}", e));
        }
        line
    })?;
    Ok(clean)
}

/// Normalized change records relative to the organization directory.
pub fn status_org(store: &ObjectStore, vcs: &dyn Vcs, indexed_only: bool) -> prd_core::Result<Vec<(String, PathBuf)>> {
    let changes: ChangeSet = ChangeDetector::new(vcs, store).preview(indexed_only)?;
    Ok(changes
        .records()
        .into_iter()
        .map(|r| (r.op.to_string(), store.layout().relative(&r.path).to_path_buf()))
        .collect())
}

pub async fn status(invocation: &Invocation<'_>, names: &[String], indexed_only: bool) -> anyhow::Result<bool> {
    let mut reports = BTreeMap::new();
    for (name, _) in invocation.selected(names)? {
        let store = invocation.store(&name);
        let vcs = GitCli::open(store.layout().org_dir())?;
        reports.insert(name, status_org(&store, &vcs, indexed_only)?);
    }
    invocation.print(&reports, |name, records| {
        let mut out = format!("{}: {} change(s)", name, records.len());
        for (op, path) in records {
            out.push_str(&format!("\n  {:<18} {}", op, path.display()));
        }
        out
    })?;
    Ok(true)
}

pub async fn mapping_placeholders(invocation: &Invocation<'_>, name: &str) -> anyhow::Result<bool> {
    let store = invocation.store(name);
    let path = store.layout().mapping_path();
    let mapping = prd_mapping::load(&path)
        .await?
        .with_context(|| format!("no mapping at {}; pull first", path.display()))?;
    let placeholders: Vec<(String, i64, String)> = mapping
        .placeholders()
        .into_iter()
        .map(|(key, entry)| (key.object_type.to_string(), key.id, entry.name.clone()))
        .collect();
    if invocation.json {
        println!("{}", serde_json::to_string_pretty(&placeholders)?);
    } else {
        for (object_type, id, entry_name) in &placeholders {
            println!("{:<15} {:>8}  {}", object_type, id, entry_name);
        }
    }
    Ok(placeholders.is_empty())
}

pub async fn mapping_targets(invocation: &Invocation<'_>, name: &str, source_id: i64) -> anyhow::Result<bool> {
    let store = invocation.store(name);
    let path = store.layout().mapping_path();
    let mapping = prd_mapping::load(&path).await?.unwrap_or_default();
    let targets = mapping.targets_for(source_id);
    if invocation.json {
        println!("{}", serde_json::to_string(&targets)?);
    } else {
        for id in &targets {
            println!("{}", id);
        }
    }
    Ok(!targets.is_empty())
}
