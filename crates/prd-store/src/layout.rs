//! Directory layout of one organization directory.
//!
//! ```text
//! {org}/organization.json
//! {org}/mapping.yaml
//! {org}/{subdir}/workspaces/{name}_[{id}]/workspace.json
//! {org}/{subdir}/workspaces/{name}_[{id}]/queues/{name}_[{id}]/queue.json
//!                                                            /schema.json
//!                                                            /formula/{field_id}.py
//!                                                            /inbox.json
//!                                                            /email_templates/{name}_[{id}].json
//! {org}/{subdir}/hooks/{name}_[{id}].json   (+ .py / .js sidecar)
//! {org}/{subdir}/rules|labels|engines/{name}_[{id}].json
//! ```

use std::path::{Path, PathBuf};

use prd_core::{defaults, Error, LocalObject, ObjectType, Result};

/// Name and id of an ancestor object, as needed to build a nested path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedId {
    pub name: String,
    pub id: i64,
}

impl NamedId {
    pub fn new(name: impl Into<String>, id: i64) -> Self {
        Self {
            name: name.into(),
            id,
        }
    }

    /// Take name and id from an object; `None` when the id is missing.
    pub fn of(object: &LocalObject) -> Option<Self> {
        Some(Self::new(object.display_name(), object.id?))
    }
}

/// Ancestors an object's path depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentChain {
    pub subdir: String,
    pub workspace: Option<NamedId>,
    pub queue: Option<NamedId>,
}

impl ParentChain {
    pub fn new(subdir: impl Into<String>) -> Self {
        Self {
            subdir: subdir.into(),
            workspace: None,
            queue: None,
        }
    }

    pub fn with_workspace(mut self, workspace: NamedId) -> Self {
        self.workspace = Some(workspace);
        self
    }

    pub fn with_queue(mut self, queue: NamedId) -> Self {
        self.queue = Some(queue);
        self
    }
}

/// Replace path separators so an object name stays a single path component.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect()
}

/// `{name}_[{id}]`
pub fn object_stem(name: &str, id: i64) -> String {
    format!("{}_[{}]", sanitize_name(name), id)
}

/// Parse the id out of a `{name}_[{id}]` component.
pub fn id_from_stem(stem: &str) -> Option<i64> {
    let inner = stem.strip_suffix(']')?;
    let start = inner.rfind("_[")?;
    inner[start + 2..].parse().ok()
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name()?.to_str()
}

fn parent_name(path: &Path) -> Option<&str> {
    path.parent()?.file_name()?.to_str()
}

/// Infer the object type of a JSON file from its name and location.
pub fn classify(path: &Path) -> Option<ObjectType> {
    if path.extension()?.to_str()? != "json" {
        return None;
    }
    match file_name(path)? {
        "organization.json" => return Some(ObjectType::Organization),
        "workspace.json" => return Some(ObjectType::Workspace),
        "queue.json" => return Some(ObjectType::Queue),
        "schema.json" => return Some(ObjectType::Schema),
        "inbox.json" => return Some(ObjectType::Inbox),
        _ => {}
    }
    match parent_name(path)? {
        "email_templates" => Some(ObjectType::EmailTemplate),
        dir => ObjectType::FLAT.into_iter().find(|t| t.resource() == dir),
    }
}

/// Id encoded in the path itself. Schemas, inboxes and the organization are
/// keyed by their location, not their own id.
pub fn id_from_path(path: &Path, object_type: ObjectType) -> Option<i64> {
    match object_type {
        ObjectType::Workspace | ObjectType::Queue => id_from_stem(parent_name(path)?),
        ObjectType::Organization | ObjectType::Schema | ObjectType::Inbox => None,
        _ => id_from_stem(path.file_stem()?.to_str()?),
    }
}

/// Hook JSON owning a `.py`/`.js` sidecar, if `path` is one.
pub fn hook_json_for_source(path: &Path) -> Option<PathBuf> {
    let ext = path.extension()?.to_str()?;
    if !matches!(ext, "py" | "js") || parent_name(path)? != ObjectType::Hook.resource() {
        return None;
    }
    Some(path.with_extension("json"))
}

/// `schema.json` owning a formula sidecar, if `path` is one.
pub fn schema_for_formula(path: &Path) -> Option<PathBuf> {
    if path.extension()?.to_str()? != "py" || parent_name(path)? != defaults::FORMULA_DIR {
        return None;
    }
    Some(path.parent()?.parent()?.join("schema.json"))
}

/// Paths of one organization directory.
#[derive(Debug, Clone)]
pub struct Layout {
    org_dir: PathBuf,
}

impl Layout {
    pub fn new(org_dir: impl Into<PathBuf>) -> Self {
        Self {
            org_dir: org_dir.into(),
        }
    }

    pub fn org_dir(&self) -> &Path {
        &self.org_dir
    }

    pub fn organization_path(&self) -> PathBuf {
        self.org_dir.join(defaults::ORGANIZATION_FILE)
    }

    pub fn mapping_path(&self) -> PathBuf {
        self.org_dir.join(defaults::MAPPING_FILE)
    }

    pub fn subdir_dir(&self, subdir: &str) -> PathBuf {
        self.org_dir.join(subdir)
    }

    pub fn workspace_dir(&self, subdir: &str, workspace: &NamedId) -> PathBuf {
        self.subdir_dir(subdir)
            .join(ObjectType::Workspace.resource())
            .join(object_stem(&workspace.name, workspace.id))
    }

    pub fn queue_dir(&self, subdir: &str, workspace: &NamedId, queue: &NamedId) -> PathBuf {
        self.workspace_dir(subdir, workspace)
            .join(ObjectType::Queue.resource())
            .join(object_stem(&queue.name, queue.id))
    }

    /// Deterministic path of an object given its type and ancestors.
    pub fn path_for(
        &self,
        object_type: ObjectType,
        object: &LocalObject,
        chain: &ParentChain,
    ) -> Result<PathBuf> {
        let own_id = || {
            object.id.ok_or_else(|| {
                Error::InvalidInput(format!("{} without an id has no path", object_type))
            })
        };
        let workspace = || {
            chain.workspace.as_ref().ok_or_else(|| {
                Error::InvalidInput(format!("{} path needs its workspace", object_type))
            })
        };
        let queue = || {
            chain.queue.as_ref().ok_or_else(|| {
                Error::InvalidInput(format!("{} path needs its queue", object_type))
            })
        };

        let path = match object_type {
            ObjectType::Organization => self.organization_path(),
            ObjectType::Workspace => {
                let id = own_id()?;
                self.workspace_dir(&chain.subdir, &NamedId::new(object.display_name(), id))
                    .join("workspace.json")
            }
            ObjectType::Queue => {
                let id = own_id()?;
                self.queue_dir(
                    &chain.subdir,
                    workspace()?,
                    &NamedId::new(object.display_name(), id),
                )
                .join("queue.json")
            }
            ObjectType::Schema | ObjectType::Inbox => self
                .queue_dir(&chain.subdir, workspace()?, queue()?)
                .join(format!("{}.json", object_type.singular())),
            ObjectType::EmailTemplate => self
                .queue_dir(&chain.subdir, workspace()?, queue()?)
                .join(ObjectType::EmailTemplate.resource())
                .join(format!("{}.json", object_stem(object.display_name(), own_id()?))),
            ObjectType::Hook | ObjectType::Rule | ObjectType::Label | ObjectType::Engine => self
                .subdir_dir(&chain.subdir)
                .join(object_type.resource())
                .join(format!("{}.json", object_stem(object.display_name(), own_id()?))),
        };
        Ok(path)
    }

    /// Subdirectory a path lives in; `None` for org-level files.
    pub fn subdir_of(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.org_dir).ok()?;
        let mut components = relative.components();
        let first = components.next()?;
        // org-level files have no further components
        components.next()?;
        Some(first.as_os_str().to_string_lossy().into_owned())
    }

    /// Path relative to the organization directory, for logs and reports.
    pub fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.org_dir).unwrap_or(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: serde_json::Value) -> LocalObject {
        LocalObject::from_value(value).unwrap()
    }

    fn chain() -> ParentChain {
        ParentChain::new("default")
            .with_workspace(NamedId::new("Finance", 1))
            .with_queue(NamedId::new("Invoices", 10))
    }

    #[test]
    fn test_stem_round_trip_and_sanitizing() {
        assert_eq!(object_stem("AP/AR", 7), "AP_AR_[7]");
        assert_eq!(id_from_stem("AP_AR_[7]"), Some(7));
        assert_eq!(id_from_stem("name_with_[brackets]_[12]"), Some(12));
        assert_eq!(id_from_stem("no id"), None);
    }

    #[test]
    fn test_path_for_nested_types() {
        let layout = Layout::new("/repo/dev");
        let queue = object(json!({"id": 10, "name": "Invoices"}));
        assert_eq!(
            layout.path_for(ObjectType::Queue, &queue, &chain()).unwrap(),
            PathBuf::from("/repo/dev/default/workspaces/Finance_[1]/queues/Invoices_[10]/queue.json")
        );

        let schema = object(json!({"id": 99, "name": "Invoice schema"}));
        assert_eq!(
            layout.path_for(ObjectType::Schema, &schema, &chain()).unwrap(),
            PathBuf::from("/repo/dev/default/workspaces/Finance_[1]/queues/Invoices_[10]/schema.json")
        );

        let template = object(json!({"id": 4, "name": "Rejection"}));
        assert_eq!(
            layout
                .path_for(ObjectType::EmailTemplate, &template, &chain())
                .unwrap(),
            PathBuf::from(
                "/repo/dev/default/workspaces/Finance_[1]/queues/Invoices_[10]/email_templates/Rejection_[4].json"
            )
        );
    }

    #[test]
    fn test_path_for_flat_types() {
        let layout = Layout::new("/repo/dev");
        let hook = object(json!({"id": 3, "name": "Validate totals"}));
        assert_eq!(
            layout
                .path_for(ObjectType::Hook, &hook, &ParentChain::new("prod"))
                .unwrap(),
            PathBuf::from("/repo/dev/prod/hooks/Validate totals_[3].json")
        );
    }

    #[test]
    fn test_nested_path_without_parent_is_rejected() {
        let layout = Layout::new("/repo/dev");
        let inbox = object(json!({"id": 5}));
        let err = layout
            .path_for(ObjectType::Inbox, &inbox, &ParentChain::new("default"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            classify(Path::new("d/workspaces/W_[1]/queues/Q_[2]/schema.json")),
            Some(ObjectType::Schema)
        );
        assert_eq!(
            classify(Path::new("d/workspaces/W_[1]/queues/Q_[2]/email_templates/T_[3].json")),
            Some(ObjectType::EmailTemplate)
        );
        assert_eq!(classify(Path::new("d/labels/L_[3].json")), Some(ObjectType::Label));
        assert_eq!(classify(Path::new("d/hooks/H_[3].py")), None);
        assert_eq!(classify(Path::new("d/notes/readme.json")), None);
    }

    #[test]
    fn test_id_from_path() {
        let queue = Path::new("d/workspaces/W_[1]/queues/Q_[2]/queue.json");
        assert_eq!(id_from_path(queue, ObjectType::Queue), Some(2));
        let hook = Path::new("d/hooks/H_[8].json");
        assert_eq!(id_from_path(hook, ObjectType::Hook), Some(8));
        let schema = Path::new("d/workspaces/W_[1]/queues/Q_[2]/schema.json");
        assert_eq!(id_from_path(schema, ObjectType::Schema), None);
    }

    #[test]
    fn test_companion_owners() {
        assert_eq!(
            hook_json_for_source(Path::new("d/hooks/H_[8].js")),
            Some(PathBuf::from("d/hooks/H_[8].json"))
        );
        assert_eq!(hook_json_for_source(Path::new("d/rules/R_[8].py")), None);
        assert_eq!(
            schema_for_formula(Path::new("q/formula/total.py")),
            Some(PathBuf::from("q/schema.json"))
        );
        assert_eq!(schema_for_formula(Path::new("q/formulas/total.py")), None);
        assert_eq!(schema_for_formula(Path::new("q/formula/total.js")), None);
    }

    #[test]
    fn test_subdir_of() {
        let layout = Layout::new("/repo/dev");
        assert_eq!(
            layout.subdir_of(Path::new("/repo/dev/prod/hooks/H_[1].json")),
            Some("prod".to_string())
        );
        assert_eq!(layout.subdir_of(Path::new("/repo/dev/organization.json")), None);
    }
}
