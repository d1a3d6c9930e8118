//! Change detection: VCS status normalized onto object JSON paths.
//!
//! Sidecar edits never surface on their own. A changed hook source or formula
//! file is folded into its owning JSON (`config.code` / the datapoint's
//! `formula`) and reported as an update of that JSON. JSON-side edits of the
//! same content are mirrored back out to the sidecars.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use prd_core::{ChangeOp, ChangeRecord, ChangeSet, ObjectType, Result};
use prd_store::companions::set_formula;
use prd_store::layout::{classify, hook_json_for_source, schema_for_formula};
use prd_store::ObjectStore;

use crate::vcs::Vcs;

/// Raw status split into object changes and sidecar edits.
#[derive(Debug, Default)]
struct Normalized {
    changes: ChangeSet,
    hook_sources: Vec<PathBuf>,
    formula_sources: BTreeMap<PathBuf, Vec<PathBuf>>,
}

fn normalize(raw: Vec<(ChangeOp, PathBuf)>) -> Normalized {
    let mut out = Normalized::default();
    for (op, path) in raw {
        if let Some(json) = hook_json_for_source(&path) {
            // a sidecar deletion never clears the embedded code
            if op != ChangeOp::Deleted {
                out.hook_sources.push(path);
                out.changes.insert(ChangeRecord::new(ChangeOp::Updated, json));
            }
        } else if let Some(schema) = schema_for_formula(&path) {
            if op != ChangeOp::Deleted {
                out.formula_sources.entry(schema.clone()).or_default().push(path);
                out.changes.insert(ChangeRecord::new(ChangeOp::Updated, schema));
            }
        } else if classify(&path).is_some() {
            out.changes.insert(ChangeRecord::new(op, path));
        }
    }
    out
}

/// Derives normalized change records for one organization directory.
pub struct ChangeDetector<'a> {
    vcs: &'a dyn Vcs,
    store: &'a ObjectStore,
}

impl<'a> ChangeDetector<'a> {
    pub fn new(vcs: &'a dyn Vcs, store: &'a ObjectStore) -> Self {
        Self { vcs, store }
    }

    fn raw(&self, indexed_only: bool) -> Result<Vec<(ChangeOp, PathBuf)>> {
        self.vcs.status(self.store.layout().org_dir(), indexed_only)
    }

    /// Normalized changes without touching any file.
    pub fn preview(&self, indexed_only: bool) -> Result<ChangeSet> {
        Ok(normalize(self.raw(indexed_only)?).changes)
    }

    /// Normalized changes with sidecars merged into their JSON and JSON edits
    /// mirrored back out to the sidecars.
    pub async fn detect(&self, indexed_only: bool) -> Result<ChangeSet> {
        let Normalized {
            mut changes,
            hook_sources,
            formula_sources,
        } = normalize(self.raw(indexed_only)?);

        // a deleted owner stays deleted whatever happened to its sidecars
        for source in &hook_sources {
            let json = source.with_extension("json");
            if changes.get(&json) == Some(ChangeOp::Deleted) {
                continue;
            }
            if !self.merge_hook_source(source, &json).await? {
                changes.remove(&json);
            }
        }

        for (schema, files) in &formula_sources {
            if changes.get(schema) == Some(ChangeOp::Deleted) {
                continue;
            }
            if !self.merge_formulas(schema, files).await? {
                changes.remove(schema);
            }
        }

        // JSON-only edits: regenerate sidecars from the embedded copy
        for record in changes.records() {
            if record.op == ChangeOp::Deleted {
                continue;
            }
            let handled = hook_sources.iter().any(|s| s.with_extension("json") == record.path)
                || formula_sources.contains_key(&record.path);
            if handled {
                continue;
            }
            if let Some(object_type @ (ObjectType::Hook | ObjectType::Schema)) = classify(&record.path) {
                self.mirror(&record.path, object_type).await?;
            }
        }

        debug!(changes = changes.len(), "Detected local changes");
        Ok(changes)
    }

    async fn merge_hook_source(&self, source: &Path, json: &Path) -> Result<bool> {
        let Some(code) = self.store.read_text(source).await? else {
            return Ok(false);
        };
        let Some(mut hook) = self.store.try_read_object(json).await? else {
            warn!(path = %source.display(), "Hook source without its JSON, ignoring");
            return Ok(false);
        };
        if hook.hook_code() != Some(code.as_str()) {
            hook.set_hook_code(&code);
            self.store.write_object(json, &hook, ObjectType::Hook).await?;
            debug!(path = %json.display(), "Merged hook source into JSON");
        }
        Ok(true)
    }

    async fn merge_formulas(&self, schema_path: &Path, files: &[PathBuf]) -> Result<bool> {
        let Some(mut schema) = self.store.try_read_object(schema_path).await? else {
            warn!(path = %schema_path.display(), "Formula files without schema.json, ignoring");
            return Ok(false);
        };
        for file in files {
            let Some(field_id) = file.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Some(code) = self.store.read_text(file).await? else {
                continue;
            };
            if !set_formula(&mut schema, field_id, &code) {
                warn!(path = %file.display(), field_id, "No formula field with this id in schema");
            }
        }
        self.store
            .write_object(schema_path, &schema, ObjectType::Schema)
            .await?;
        Ok(true)
    }

    async fn mirror(&self, path: &Path, object_type: ObjectType) -> Result<()> {
        if let Some(object) = self.store.try_read_object(path).await? {
            let written = self
                .store
                .attach_companions(path, &object, object_type)
                .await?;
            for companion in written {
                debug!(path = %companion.display(), "Mirrored JSON edit to sidecar");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::FakeVcs;
    use prd_core::LocalObject;
    use prd_store::Layout;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup() -> (TempDir, ObjectStore) {
        let dir = TempDir::new().unwrap();
        let store = ObjectStore::new(Layout::new(dir.path().join("org")));
        (dir, store)
    }

    async fn write(store: &ObjectStore, path: &Path, value: serde_json::Value, t: ObjectType) {
        let object = LocalObject::from_value(value).unwrap();
        store.write_object(path, &object, t).await.unwrap();
    }

    #[tokio::test]
    async fn test_hook_source_edit_is_merged_into_json() {
        let (_dir, store) = setup();
        let json_path = store.layout().org_dir().join("default/hooks/H_[1].json");
        write(&store, &json_path, json!({"id": 1, "url": "https://e/api/v1/hooks/1", "config": {"code": "old"}}), ObjectType::Hook).await;
        let source = json_path.with_extension("py");
        store.write_text(&source, "new").await.unwrap();

        let vcs = FakeVcs::new().with_change(ChangeOp::Updated, source.clone());
        let changes = ChangeDetector::new(&vcs, &store).detect(false).await.unwrap();

        assert_eq!(changes.records(), vec![ChangeRecord::new(ChangeOp::Updated, json_path.clone())]);
        let hook = store.read_object(&json_path).await.unwrap();
        assert_eq!(hook.hook_code(), Some("new"));
    }

    #[tokio::test]
    async fn test_json_code_edit_is_mirrored_to_sidecar() {
        let (_dir, store) = setup();
        let json_path = store.layout().org_dir().join("default/hooks/H_[1].json");
        write(&store, &json_path, json!({"id": 1, "url": "https://e/api/v1/hooks/1", "config": {"code": "a"}}), ObjectType::Hook).await;
        // edit only the JSON copy
        let edited = LocalObject::from_value(json!({"id": 1, "url": "https://e/api/v1/hooks/1", "config": {"code": "b"}})).unwrap();
        let text = prd_store::render_object(&edited, ObjectType::Hook).unwrap();
        store.write_text(&json_path, &text).await.unwrap();

        let vcs = FakeVcs::new().with_change(ChangeOp::Updated, json_path.clone());
        ChangeDetector::new(&vcs, &store).detect(false).await.unwrap();

        let source = store.read_text(&json_path.with_extension("py")).await.unwrap();
        assert_eq!(source.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_formula_edit_is_merged_into_schema() {
        let (_dir, store) = setup();
        let schema_path = store
            .layout()
            .org_dir()
            .join("default/workspaces/W_[1]/queues/Q_[2]/schema.json");
        write(&store, &schema_path, json!({
            "id": 3,
            "url": "https://e/api/v1/schemas/3",
            "content": [{"category": "datapoint", "id": "total", "formula": "1"}]
        }), ObjectType::Schema).await;
        let formula = schema_path.parent().unwrap().join("formula/total.py");
        store.write_text(&formula, "2").await.unwrap();

        let vcs = FakeVcs::new().with_change(ChangeOp::Updated, formula);
        let changes = ChangeDetector::new(&vcs, &store).detect(false).await.unwrap();

        assert_eq!(changes.get(&schema_path), Some(ChangeOp::Updated));
        let schema = store.read_object(&schema_path).await.unwrap();
        assert_eq!(prd_store::companions::formula_fields(&schema)["total"], "2");
    }

    #[tokio::test]
    async fn test_schema_formula_edit_is_mirrored_to_file() {
        let (_dir, store) = setup();
        let schema_path = store
            .layout()
            .org_dir()
            .join("default/workspaces/W_[1]/queues/Q_[2]/schema.json");
        let schema = |formula: &str| {
            LocalObject::from_value(json!({
                "id": 3,
                "url": "https://e/api/v1/schemas/3",
                "content": [{"category": "section", "id": "s", "children": [
                    {"category": "datapoint", "id": "total", "formula": formula}
                ]}]
            }))
            .unwrap()
        };
        store.write_object(&schema_path, &schema("1"), ObjectType::Schema).await.unwrap();
        let formula = schema_path.parent().unwrap().join("formula/total.py");
        assert_eq!(store.read_text(&formula).await.unwrap().as_deref(), Some("1"));

        // edit the formula inside schema.json only
        let text = prd_store::render_object(&schema("price * 2"), ObjectType::Schema).unwrap();
        store.write_text(&schema_path, &text).await.unwrap();

        let vcs = FakeVcs::new().with_change(ChangeOp::Updated, schema_path.clone());
        let changes = ChangeDetector::new(&vcs, &store).detect(false).await.unwrap();

        assert_eq!(changes.get(&schema_path), Some(ChangeOp::Updated));
        assert_eq!(store.read_text(&formula).await.unwrap().as_deref(), Some("price * 2"));
    }

    #[tokio::test]
    async fn test_deleted_hook_survives_sidecar_edit() {
        let (_dir, store) = setup();
        let json_path = store.layout().org_dir().join("default/hooks/H_[1].json");
        let source = json_path.with_extension("py");
        store.write_text(&source, "edited").await.unwrap();

        let vcs = FakeVcs::new()
            .with_change(ChangeOp::Deleted, json_path.clone())
            .with_change(ChangeOp::Updated, source.clone());
        let detector = ChangeDetector::new(&vcs, &store);

        assert_eq!(detector.preview(false).unwrap().get(&json_path), Some(ChangeOp::Deleted));
        let changes = detector.detect(false).await.unwrap();
        assert_eq!(changes.records(), vec![ChangeRecord::new(ChangeOp::Deleted, json_path.clone())]);
        assert!(!json_path.exists());
    }

    #[tokio::test]
    async fn test_deleted_schema_survives_formula_edit() {
        let (_dir, store) = setup();
        let schema_path = store
            .layout()
            .org_dir()
            .join("default/workspaces/W_[1]/queues/Q_[2]/schema.json");
        let formula = schema_path.parent().unwrap().join("formula/total.py");
        store.write_text(&formula, "2").await.unwrap();

        let vcs = FakeVcs::new()
            .with_change(ChangeOp::Deleted, schema_path.clone())
            .with_change(ChangeOp::Updated, formula);
        let changes = ChangeDetector::new(&vcs, &store).detect(false).await.unwrap();

        assert_eq!(changes.get(&schema_path), Some(ChangeOp::Deleted));
        assert!(!schema_path.exists());
    }

    #[test]
    fn test_normalize_drops_sidecar_deletes_and_unknown_files() {
        let normalized = normalize(vec![
            (ChangeOp::Deleted, PathBuf::from("o/d/hooks/H_[1].py")),
            (ChangeOp::Updated, PathBuf::from("o/mapping.yaml")),
            (ChangeOp::Created, PathBuf::from("o/d/labels/L_[4].json")),
            (ChangeOp::Updated, PathBuf::from("o/d/hooks/H_[2].js")),
            (ChangeOp::Updated, PathBuf::from("o/d/hooks/H_[2].json")),
        ]);
        let records = normalized.changes.records();
        assert_eq!(
            records,
            vec![
                ChangeRecord::new(ChangeOp::Updated, "o/d/hooks/H_[2].json"),
                ChangeRecord::new(ChangeOp::Created, "o/d/labels/L_[4].json"),
            ]
        );
    }

    #[test]
    fn test_preview_does_not_need_files() {
        let dir = TempDir::new().unwrap();
        let store = ObjectStore::new(Layout::new(dir.path()));
        let vcs = FakeVcs::new().with_change(ChangeOp::Created, dir.path().join("d/hooks/H_[1].py"));
        let changes = ChangeDetector::new(&vcs, &store).preview(false).unwrap();
        assert_eq!(changes.get(&dir.path().join("d/hooks/H_[1].json")), Some(ChangeOp::Updated));
    }
}
