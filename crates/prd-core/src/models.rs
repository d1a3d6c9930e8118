//! Object types and the local JSON object record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

// =============================================================================
// OBJECT TYPES
// =============================================================================

/// Kinds of configuration objects synchronized with the remote platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Organization,
    Workspace,
    Queue,
    Schema,
    Inbox,
    Hook,
    EmailTemplate,
    Rule,
    Label,
    Engine,
}

impl ObjectType {
    /// All object types, parents before children.
    pub const ALL: [ObjectType; 10] = [
        ObjectType::Organization,
        ObjectType::Workspace,
        ObjectType::Queue,
        ObjectType::Schema,
        ObjectType::Inbox,
        ObjectType::EmailTemplate,
        ObjectType::Hook,
        ObjectType::Rule,
        ObjectType::Label,
        ObjectType::Engine,
    ];

    /// Types stored flat under `{subdir}/{resource}/{name}_[{id}].json`.
    pub const FLAT: [ObjectType; 4] = [
        ObjectType::Hook,
        ObjectType::Rule,
        ObjectType::Label,
        ObjectType::Engine,
    ];

    /// REST collection name, also used as the local directory name.
    pub fn resource(&self) -> &'static str {
        match self {
            ObjectType::Organization => "organizations",
            ObjectType::Workspace => "workspaces",
            ObjectType::Queue => "queues",
            ObjectType::Schema => "schemas",
            ObjectType::Inbox => "inboxes",
            ObjectType::Hook => "hooks",
            ObjectType::EmailTemplate => "email_templates",
            ObjectType::Rule => "rules",
            ObjectType::Label => "labels",
            ObjectType::Engine => "engines",
        }
    }

    /// Singular name, used for fixed file names such as `queue.json`.
    pub fn singular(&self) -> &'static str {
        match self {
            ObjectType::Organization => "organization",
            ObjectType::Workspace => "workspace",
            ObjectType::Queue => "queue",
            ObjectType::Schema => "schema",
            ObjectType::Inbox => "inbox",
            ObjectType::Hook => "hook",
            ObjectType::EmailTemplate => "email_template",
            ObjectType::Rule => "rule",
            ObjectType::Label => "label",
            ObjectType::Engine => "engine",
        }
    }

    /// Parse a REST collection name.
    pub fn from_resource(resource: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.resource() == resource)
    }

    /// Organization and inbox objects can only be updated, never created.
    pub fn is_creatable(&self) -> bool {
        !matches!(self, ObjectType::Organization | ObjectType::Inbox)
    }

    /// Keys stripped before an object of this type is persisted locally.
    pub fn ignored_keys(&self) -> &'static [&'static str] {
        match self {
            ObjectType::Queue => &["counts"],
            ObjectType::Organization => &["trial_expires_at"],
            _ => &[],
        }
    }

    /// Types whose files live inside a queue directory.
    pub fn is_queue_child(&self) -> bool {
        matches!(
            self,
            ObjectType::Schema | ObjectType::Inbox | ObjectType::EmailTemplate
        )
    }

    /// Order in which remote deletes are issued: dependents first.
    pub fn delete_rank(&self) -> u8 {
        match self {
            ObjectType::EmailTemplate => 0,
            ObjectType::Hook | ObjectType::Rule | ObjectType::Label | ObjectType::Engine => 1,
            ObjectType::Inbox => 2,
            ObjectType::Queue => 3,
            ObjectType::Schema => 4,
            ObjectType::Workspace => 5,
            ObjectType::Organization => 6,
        }
    }

    /// Parse `https://host/api/v1/queues/123` into `(Queue, 123)`.
    pub fn parse_url(url: &str) -> Option<(ObjectType, i64)> {
        let mut segments = url.trim_end_matches('/').rsplit('/');
        let id = segments.next()?.parse().ok()?;
        let object_type = ObjectType::from_resource(segments.next()?)?;
        Some((object_type, id))
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.singular())
    }
}

impl FromStr for ObjectType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ObjectType::ALL
            .into_iter()
            .find(|t| t.singular() == s || t.resource() == s)
            .ok_or_else(|| Error::InvalidInput(format!("unknown object type: {}", s)))
    }
}

/// Type-qualified object identity. Ids are unique per type only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub object_type: ObjectType,
    pub id: i64,
}

impl ObjectKey {
    pub fn new(object_type: ObjectType, id: i64) -> Self {
        Self { object_type, id }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.object_type, self.id)
    }
}

/// Extract the trailing numeric id from an object url.
pub fn id_from_url(url: &str) -> Option<i64> {
    url.trim_end_matches('/').rsplit('/').next()?.parse().ok()
}

// =============================================================================
// LOCAL OBJECT
// =============================================================================

/// A configuration object as persisted locally and exchanged with the remote.
///
/// Only the fields the engine inspects are typed; everything else rides along
/// untouched in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LocalObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl LocalObject {
    /// Build from an arbitrary JSON value.
    pub fn from_value(value: JsonValue) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Convert back into a JSON value.
    pub fn to_value(&self) -> Result<JsonValue> {
        Ok(serde_json::to_value(self)?)
    }

    /// A foreign object was not produced by a pull: it has no id or url and
    /// must never be auto-deleted or auto-overwritten.
    pub fn is_foreign(&self) -> bool {
        self.id.is_none() || self.url.as_deref().map_or(true, str::is_empty)
    }

    /// Name, or an empty string for unnamed objects.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    /// Id of a single related object referenced by url (e.g. a queue's `workspace`).
    pub fn related_id(&self, key: &str) -> Option<i64> {
        self.extra.get(key)?.as_str().and_then(id_from_url)
    }

    /// Ids of related objects referenced by a url list (e.g. a schema's `queues`).
    pub fn related_ids(&self, key: &str) -> Vec<i64> {
        match self.extra.get(key) {
            Some(JsonValue::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str().and_then(id_from_url))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Raw JSON of a relationship field, for equality checks.
    pub fn field(&self, key: &str) -> Option<&JsonValue> {
        self.extra.get(key)
    }

    /// Remove keys the local representation does not track.
    pub fn strip_keys(&mut self, keys: &[&str]) {
        for key in keys {
            self.extra.remove(*key);
        }
    }

    /// Hook source code stored in `config.code`.
    pub fn hook_code(&self) -> Option<&str> {
        self.extra.get("config")?.get("code")?.as_str()
    }

    /// Replace `config.code`, creating `config` when missing.
    pub fn set_hook_code(&mut self, code: &str) {
        let config = self
            .extra
            .entry("config")
            .or_insert_with(|| JsonValue::Object(Map::new()));
        if !config.is_object() {
            *config = JsonValue::Object(Map::new());
        }
        if let JsonValue::Object(map) = config {
            map.insert("code".to_string(), JsonValue::String(code.to_string()));
        }
    }

    /// Declared hook runtime, e.g. `python3.12` or `nodejs22.x`.
    pub fn hook_runtime(&self) -> Option<&str> {
        self.extra.get("config")?.get("runtime")?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_url() {
        assert_eq!(
            ObjectType::parse_url("https://example.com/api/v1/queues/123"),
            Some((ObjectType::Queue, 123))
        );
        assert_eq!(
            ObjectType::parse_url("https://example.com/api/v1/email_templates/9/"),
            Some((ObjectType::EmailTemplate, 9))
        );
        assert_eq!(ObjectType::parse_url("https://example.com/api/v1/queues"), None);
    }

    #[test]
    fn test_object_type_from_str() {
        assert_eq!("queue".parse::<ObjectType>().unwrap(), ObjectType::Queue);
        assert_eq!("inboxes".parse::<ObjectType>().unwrap(), ObjectType::Inbox);
        assert!("widget".parse::<ObjectType>().is_err());
    }

    #[test]
    fn test_non_creatable_types() {
        assert!(!ObjectType::Organization.is_creatable());
        assert!(!ObjectType::Inbox.is_creatable());
        assert!(ObjectType::Queue.is_creatable());
        assert!(ObjectType::Hook.is_creatable());
    }

    #[test]
    fn test_local_object_keeps_unknown_fields() {
        let value = json!({
            "id": 5,
            "url": "https://example.com/api/v1/queues/5",
            "name": "Invoices",
            "modified_at": "2024-01-01T00:00:00Z",
            "workspace": "https://example.com/api/v1/workspaces/2",
            "settings": {"columns": [1, 2]}
        });
        let object = LocalObject::from_value(value.clone()).unwrap();
        assert_eq!(object.id, Some(5));
        assert_eq!(object.related_id("workspace"), Some(2));
        assert_eq!(object.to_value().unwrap(), value);
    }

    #[test]
    fn test_foreign_objects() {
        let no_url = LocalObject::from_value(json!({"id": 1, "name": "x"})).unwrap();
        assert!(no_url.is_foreign());
        let empty_url = LocalObject::from_value(json!({"id": 1, "url": ""})).unwrap();
        assert!(empty_url.is_foreign());
        let no_id = LocalObject::from_value(json!({"url": "https://e/api/v1/hooks/1"})).unwrap();
        assert!(no_id.is_foreign());
        let pulled =
            LocalObject::from_value(json!({"id": 1, "url": "https://e/api/v1/hooks/1"})).unwrap();
        assert!(!pulled.is_foreign());
    }

    #[test]
    fn test_related_ids() {
        let schema = LocalObject::from_value(json!({
            "id": 3,
            "queues": ["https://e/api/v1/queues/10", "https://e/api/v1/queues/11"]
        }))
        .unwrap();
        assert_eq!(schema.related_ids("queues"), vec![10, 11]);
        assert!(schema.related_ids("rules").is_empty());
    }

    #[test]
    fn test_set_hook_code() {
        let mut hook = LocalObject::from_value(json!({"id": 1, "config": {"runtime": "python3.12"}}))
            .unwrap();
        hook.set_hook_code("print('hi')");
        assert_eq!(hook.hook_code(), Some("print('hi')"));
        assert_eq!(hook.hook_runtime(), Some("python3.12"));

        let mut bare = LocalObject::default();
        bare.set_hook_code("x = 1");
        assert_eq!(bare.hook_code(), Some("x = 1"));
    }
}
