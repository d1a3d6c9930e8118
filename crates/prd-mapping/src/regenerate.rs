//! Rebuilding the mapping after a pull.
//!
//! The fresh tree mirrors what was just pulled. Each node then inherits from
//! the previous file: scalar keys the fresh node lacks are copied forward, and
//! previous targets survive only while their `target_id` is still observed.

use chrono::Utc;
use serde_yaml::Value as YamlValue;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use prd_core::{LocalObject, ObjectKey, ObjectType};

use crate::model::{Mapping, MappingEntry, OrganizationNode, QueueNode, Target, WorkspaceNode};

/// The pulled objects of one source organization.
#[derive(Debug, Clone, Default)]
pub struct MappingSource {
    pub organization: LocalObject,
    objects: BTreeMap<ObjectType, Vec<LocalObject>>,
}

impl MappingSource {
    pub fn new(organization: LocalObject) -> Self {
        Self {
            organization,
            objects: BTreeMap::new(),
        }
    }

    pub fn with(mut self, object_type: ObjectType, objects: impl IntoIterator<Item = LocalObject>) -> Self {
        self.objects.entry(object_type).or_default().extend(objects);
        self
    }

    fn of(&self, object_type: ObjectType) -> &[LocalObject] {
        self.objects
            .get(&object_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn find(&self, object_type: ObjectType, id: i64) -> Option<&LocalObject> {
        self.of(object_type).iter().find(|o| o.id == Some(id))
    }
}

/// Previous targets still pointing at an observed id. Placeholders always
/// survive; an empty result resets to a single placeholder.
pub fn prune_targets(previous: &[Target], observed: &BTreeSet<i64>) -> Vec<Target> {
    let kept: Vec<Target> = previous
        .iter()
        .filter(|t| t.target_id.map_or(true, |id| observed.contains(&id)))
        .cloned()
        .collect();
    if kept.is_empty() {
        vec![Target::placeholder()]
    } else {
        kept
    }
}

fn is_scalar(value: &YamlValue) -> bool {
    matches!(
        value,
        YamlValue::Null | YamlValue::Bool(_) | YamlValue::Number(_) | YamlValue::String(_)
    )
}

struct Enricher<'a> {
    previous: BTreeMap<ObjectKey, &'a MappingEntry>,
    observed: &'a BTreeSet<i64>,
    reset: usize,
}

impl<'a> Enricher<'a> {
    fn entry(&mut self, object_type: ObjectType, object: &LocalObject) -> Option<MappingEntry> {
        let id = object.id?;
        let mut entry = MappingEntry::new(id, object.display_name());
        if let Some(previous) = self.previous.get(&ObjectKey::new(object_type, id)) {
            for (key, value) in &previous.extra {
                if is_scalar(value) && !entry.extra.contains_key(key) {
                    entry.extra.insert(key.clone(), value.clone());
                }
            }
            entry.targets = prune_targets(&previous.targets, self.observed);
            let dropped = previous.target_ids().count() - entry.target_ids().count();
            if dropped > 0 {
                debug!(object_type = %object_type, object_id = id, dropped, "Dropped targets no longer observed");
                self.reset += dropped;
            }
        }
        Some(entry)
    }
}

/// Build the new mapping for `source`. `observed` is every id seen in this
/// run, source and target organizations alike.
pub fn regenerate(previous: Option<&Mapping>, source: &MappingSource, observed: &BTreeSet<i64>) -> Mapping {
    let mut enricher = Enricher {
        previous: previous.map(Mapping::by_key).unwrap_or_default(),
        observed,
        reset: 0,
    };

    let mut referenced_schemas = BTreeSet::new();
    let workspaces = source
        .of(ObjectType::Workspace)
        .iter()
        .filter_map(|workspace| {
            let entry = enricher.entry(ObjectType::Workspace, workspace)?;
            let queues = source
                .of(ObjectType::Queue)
                .iter()
                .filter(|q| q.related_id("workspace") == Some(entry.id))
                .filter_map(|queue| {
                    let queue_entry = enricher.entry(ObjectType::Queue, queue)?;
                    let schema = queue
                        .related_id("schema")
                        .and_then(|id| source.find(ObjectType::Schema, id))
                        .and_then(|s| enricher.entry(ObjectType::Schema, s));
                    if let Some(schema) = &schema {
                        referenced_schemas.insert(schema.id);
                    }
                    let inbox = queue
                        .related_id("inbox")
                        .and_then(|id| source.find(ObjectType::Inbox, id))
                        .and_then(|i| enricher.entry(ObjectType::Inbox, i));
                    let email_templates = source
                        .of(ObjectType::EmailTemplate)
                        .iter()
                        .filter(|t| t.related_id("queue") == Some(queue_entry.id))
                        .filter_map(|t| enricher.entry(ObjectType::EmailTemplate, t))
                        .collect();
                    Some(QueueNode {
                        entry: queue_entry,
                        schema,
                        inbox,
                        email_templates,
                    })
                })
                .collect();
            Some(WorkspaceNode { entry, queues })
        })
        .collect();

    let organization = enricher
        .entry(ObjectType::Organization, &source.organization)
        .map(|entry| OrganizationNode { entry, workspaces });

    let mut flat = |object_type: ObjectType, skip: &BTreeSet<i64>| -> Vec<MappingEntry> {
        source
            .of(object_type)
            .iter()
            .filter(|o| o.id.is_some_and(|id| !skip.contains(&id)))
            .filter_map(|o| enricher.entry(object_type, o))
            .collect()
    };
    let none = BTreeSet::new();
    let hooks = flat(ObjectType::Hook, &none);
    let schemas = flat(ObjectType::Schema, &referenced_schemas);
    let rules = flat(ObjectType::Rule, &none);
    let labels = flat(ObjectType::Label, &none);
    let engines = flat(ObjectType::Engine, &none);

    let mapping = Mapping {
        generated_at: Some(Utc::now()),
        organization,
        hooks,
        schemas,
        rules,
        labels,
        engines,
    };
    info!(
        entries = mapping.entries().len(),
        placeholders = mapping.placeholders().len(),
        reset_targets = enricher.reset,
        "Regenerated mapping"
    );
    mapping
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BASE: &str = "https://example.com/api/v1";

    fn object(value: serde_json::Value) -> LocalObject {
        LocalObject::from_value(value).unwrap()
    }

    fn source() -> MappingSource {
        MappingSource::new(object(json!({"id": 1, "name": "Acme"})))
            .with(ObjectType::Workspace, [object(json!({"id": 2, "name": "Finance"}))])
            .with(
                ObjectType::Queue,
                [object(json!({
                    "id": 3,
                    "name": "Invoices",
                    "workspace": format!("{}/workspaces/2", BASE),
                    "schema": format!("{}/schemas/4", BASE),
                    "inbox": format!("{}/inboxes/5", BASE)
                }))],
            )
            .with(
                ObjectType::Schema,
                [
                    object(json!({"id": 4, "name": "Invoice schema"})),
                    object(json!({"id": 9, "name": "Unused schema"})),
                ],
            )
            .with(ObjectType::Inbox, [object(json!({"id": 5, "name": "Inbox"}))])
            .with(ObjectType::Hook, [object(json!({"id": 6, "name": "Validator"}))])
    }

    fn observed(ids: &[i64]) -> BTreeSet<i64> {
        ids.iter().copied().collect()
    }

    #[test]
    fn test_fresh_mapping_has_placeholders_everywhere() {
        let mapping = regenerate(None, &source(), &observed(&[1, 2, 3, 4, 5, 6, 9]));
        let queue = &mapping.organization.as_ref().unwrap().workspaces[0].queues[0];
        assert_eq!(queue.schema.as_ref().unwrap().id, 4);
        assert_eq!(queue.inbox.as_ref().unwrap().id, 5);
        // only the unreferenced schema is listed flat
        assert_eq!(mapping.schemas.iter().map(|s| s.id).collect::<Vec<_>>(), vec![9]);
        assert_eq!(mapping.placeholders().len(), 7);
        assert!(mapping.generated_at.is_some());
    }

    #[test]
    fn test_target_kept_while_observed() {
        let mut previous = regenerate(None, &source(), &BTreeSet::new());
        previous.hooks[0].targets = vec![Target::to(42)];

        let kept = regenerate(Some(&previous), &source(), &observed(&[6, 42]));
        assert_eq!(kept.hooks[0].targets, vec![Target::to(42)]);

        let reset = regenerate(Some(&previous), &source(), &observed(&[6]));
        assert_eq!(reset.hooks[0].targets, vec![Target::placeholder()]);
    }

    #[test]
    fn test_partial_pruning_keeps_overrides() {
        let mut previous = regenerate(None, &source(), &BTreeSet::new());
        let mut overridden = Target::to(43);
        overridden
            .attribute_override
            .insert("name".to_string(), YamlValue::from("Validator (prod)"));
        previous.hooks[0].targets = vec![Target::to(42), overridden.clone(), Target::placeholder()];

        let mapping = regenerate(Some(&previous), &source(), &observed(&[43]));
        assert_eq!(mapping.hooks[0].targets, vec![overridden, Target::placeholder()]);
    }

    #[test]
    fn test_scalars_copied_forward_but_name_refreshed() {
        let mut previous = regenerate(None, &source(), &BTreeSet::new());
        let workspace = &mut previous.organization.as_mut().unwrap().workspaces[0].entry;
        workspace.name = "Old name".to_string();
        workspace.extra.insert("owner".to_string(), YamlValue::from("finance-team"));
        workspace
            .extra
            .insert("notes".to_string(), YamlValue::Sequence(vec![YamlValue::from("x")]));

        let mapping = regenerate(Some(&previous), &source(), &BTreeSet::new());
        let workspace = &mapping.organization.as_ref().unwrap().workspaces[0].entry;
        assert_eq!(workspace.name, "Finance");
        assert_eq!(workspace.extra["owner"], YamlValue::from("finance-team"));
        assert!(!workspace.extra.contains_key("notes"));
    }

    #[test]
    fn test_objects_gone_from_the_pull_leave_the_mapping() {
        let previous = regenerate(None, &source(), &BTreeSet::new());
        let smaller = MappingSource::new(object(json!({"id": 1, "name": "Acme"})));
        let mapping = regenerate(Some(&previous), &smaller, &observed(&[1]));
        assert!(mapping.organization.as_ref().unwrap().workspaces.is_empty());
        assert!(mapping.hooks.is_empty());
    }
}
