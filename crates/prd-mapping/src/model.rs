//! Mapping tree types.
//!
//! ```yaml
//! generated_at: 2026-10-19T08:00:00Z
//! organization:
//!   id: 1
//!   name: Acme
//!   targets:
//!     - target_id: 901
//!   workspaces:
//!     - id: 2
//!       name: Finance
//!       targets:
//!         - target_id: null
//!       queues:
//!         - id: 3
//!           name: Invoices
//!           targets:
//!             - target_id: 903
//!               attribute_override:
//!                 name: Invoices (prod)
//!           schema: { id: 4, name: Invoice schema, targets: [{ target_id: null }] }
//! hooks:
//!   - id: 6
//!     name: Validator
//!     targets: [{ target_id: 906 }]
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;
use std::collections::BTreeMap;

use prd_core::{ObjectKey, ObjectType};

/// One deploy correspondence of a source object.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Target {
    /// `None` is a placeholder awaiting completion.
    pub target_id: Option<i64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attribute_override: BTreeMap<String, YamlValue>,
}

impl Target {
    pub fn placeholder() -> Self {
        Self::default()
    }

    pub fn to(target_id: i64) -> Self {
        Self {
            target_id: Some(target_id),
            attribute_override: BTreeMap::new(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.target_id.is_none()
    }
}

/// A source object and its targets. Unknown keys are kept as written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub targets: Vec<Target>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, YamlValue>,
}

impl MappingEntry {
    /// Fresh entry with a single placeholder target.
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            targets: vec![Target::placeholder()],
            extra: BTreeMap::new(),
        }
    }

    pub fn has_placeholder(&self) -> bool {
        self.targets.iter().any(Target::is_placeholder)
    }

    pub fn target_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.targets.iter().filter_map(|t| t.target_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueNode {
    #[serde(flatten)]
    pub entry: MappingEntry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<MappingEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inbox: Option<MappingEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub email_templates: Vec<MappingEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceNode {
    #[serde(flatten)]
    pub entry: MappingEntry,
    #[serde(default)]
    pub queues: Vec<QueueNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationNode {
    #[serde(flatten)]
    pub entry: MappingEntry,
    #[serde(default)]
    pub workspaces: Vec<WorkspaceNode>,
}

/// The whole mapping file of one source organization.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Mapping {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<OrganizationNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hooks: Vec<MappingEntry>,
    /// Schemas no queue references.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schemas: Vec<MappingEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<MappingEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<MappingEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub engines: Vec<MappingEntry>,
}

impl Mapping {
    /// Every entry with its object type, parents before children.
    pub fn entries(&self) -> Vec<(ObjectType, &MappingEntry)> {
        let mut out = Vec::new();
        if let Some(org) = &self.organization {
            out.push((ObjectType::Organization, &org.entry));
            for workspace in &org.workspaces {
                out.push((ObjectType::Workspace, &workspace.entry));
                for queue in &workspace.queues {
                    out.push((ObjectType::Queue, &queue.entry));
                    if let Some(schema) = &queue.schema {
                        out.push((ObjectType::Schema, schema));
                    }
                    if let Some(inbox) = &queue.inbox {
                        out.push((ObjectType::Inbox, inbox));
                    }
                    out.extend(queue.email_templates.iter().map(|e| (ObjectType::EmailTemplate, e)));
                }
            }
        }
        for (object_type, list) in [
            (ObjectType::Hook, &self.hooks),
            (ObjectType::Schema, &self.schemas),
            (ObjectType::Rule, &self.rules),
            (ObjectType::Label, &self.labels),
            (ObjectType::Engine, &self.engines),
        ] {
            out.extend(list.iter().map(|e| (object_type, e)));
        }
        out
    }

    /// Previous entries keyed by object, first occurrence wins.
    pub fn by_key(&self) -> BTreeMap<ObjectKey, &MappingEntry> {
        let mut map = BTreeMap::new();
        for (object_type, entry) in self.entries() {
            map.entry(ObjectKey::new(object_type, entry.id)).or_insert(entry);
        }
        map
    }

    /// Entries still holding a `target_id: null` slot.
    pub fn placeholders(&self) -> Vec<(ObjectKey, &MappingEntry)> {
        let mut seen = std::collections::BTreeSet::new();
        self.entries()
            .into_iter()
            .filter(|(_, entry)| entry.has_placeholder())
            .map(|(object_type, entry)| (ObjectKey::new(object_type, entry.id), entry))
            .filter(|(key, _)| seen.insert(*key))
            .collect()
    }

    /// Target ids recorded for a source id, across every entry carrying it.
    pub fn targets_for(&self, source_id: i64) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .entries()
            .into_iter()
            .filter(|(_, entry)| entry.id == source_id)
            .flat_map(|(_, entry)| entry.target_ids().collect::<Vec<_>>())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
generated_at: 2026-10-19T08:00:00Z
organization:
  id: 1
  name: Acme
  targets:
    - target_id: 901
  workspaces:
    - id: 2
      name: Finance
      owner: finance-team
      targets:
        - target_id: null
      queues:
        - id: 3
          name: Invoices
          targets:
            - target_id: 903
              attribute_override:
                name: Invoices (prod)
          schema:
            id: 4
            name: Invoice schema
            targets:
              - target_id: null
hooks:
  - id: 6
    name: Validator
    targets:
      - target_id: 906
      - target_id: 907
"#;

    #[test]
    fn test_parse_tree_and_keep_unknown_keys() {
        let mapping: Mapping = serde_yaml::from_str(YAML).unwrap();
        let org = mapping.organization.as_ref().unwrap();
        let workspace = &org.workspaces[0];
        assert_eq!(workspace.entry.extra["owner"], YamlValue::from("finance-team"));
        let queue = &workspace.queues[0];
        assert_eq!(queue.entry.targets[0].target_id, Some(903));
        assert_eq!(
            queue.entry.targets[0].attribute_override["name"],
            YamlValue::from("Invoices (prod)")
        );
        assert_eq!(queue.schema.as_ref().unwrap().id, 4);
        assert!(queue.inbox.is_none());
    }

    #[test]
    fn test_placeholders() {
        let mapping: Mapping = serde_yaml::from_str(YAML).unwrap();
        let keys: Vec<ObjectKey> = mapping.placeholders().into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec![
                ObjectKey::new(ObjectType::Workspace, 2),
                ObjectKey::new(ObjectType::Schema, 4)
            ]
        );
    }

    #[test]
    fn test_targets_for() {
        let mapping: Mapping = serde_yaml::from_str(YAML).unwrap();
        assert_eq!(mapping.targets_for(6), vec![906, 907]);
        assert_eq!(mapping.targets_for(2), Vec::<i64>::new());
        assert!(mapping.targets_for(404).is_empty());
    }

    #[test]
    fn test_round_trip_keeps_extra_keys() {
        let mapping: Mapping = serde_yaml::from_str(YAML).unwrap();
        let text = serde_yaml::to_string(&mapping).unwrap();
        assert!(text.contains("owner: finance-team"));
        let again: Mapping = serde_yaml::from_str(&text).unwrap();
        assert_eq!(again, mapping);
    }
}
