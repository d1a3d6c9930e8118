//! Everything one organization holds remotely, fetched up front.

use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

use prd_core::{Error, LocalObject, ObjectKey, ObjectType, Result};
use prd_remote::RemoteApi;

/// Types listed with `fetch_all`. Schemas and inboxes are fetched per queue.
const LISTED: [ObjectType; 7] = [
    ObjectType::Workspace,
    ObjectType::Queue,
    ObjectType::EmailTemplate,
    ObjectType::Hook,
    ObjectType::Rule,
    ObjectType::Label,
    ObjectType::Engine,
];

/// Remote objects of one organization, grouped by type.
#[derive(Debug, Clone, Default)]
pub struct RemoteSnapshot {
    pub organization: LocalObject,
    objects: BTreeMap<ObjectType, Vec<LocalObject>>,
}

impl RemoteSnapshot {
    pub fn new(organization: LocalObject) -> Self {
        Self {
            organization,
            objects: BTreeMap::new(),
        }
    }

    /// Add objects of one type.
    pub fn with(mut self, object_type: ObjectType, objects: Vec<LocalObject>) -> Self {
        self.objects.entry(object_type).or_default().extend(objects);
        self
    }

    /// Fetch the organization and its objects, at most `max_in_flight`
    /// requests at a time.
    pub async fn fetch(remote: &dyn RemoteApi, org_id: i64, max_in_flight: usize) -> Result<Self> {
        let organization = remote
            .fetch_one(ObjectType::Organization, org_id)
            .await
            .map_err(|e| match e.status() {
                Some(401 | 403 | 404) => Error::Download {
                    org_id,
                    message: e.to_string(),
                },
                _ => e,
            })?;
        let mut snapshot = Self::new(organization);

        let listed: Vec<(ObjectType, Result<Vec<LocalObject>>)> = stream::iter(LISTED)
            .map(|object_type| async move { (object_type, remote.fetch_all(object_type).await) })
            .buffer_unordered(max_in_flight.max(1))
            .collect()
            .await;
        for (object_type, objects) in listed {
            snapshot = snapshot.with(object_type, objects?);
        }

        let mut children = BTreeSet::new();
        for queue in snapshot.of(ObjectType::Queue) {
            for object_type in [ObjectType::Schema, ObjectType::Inbox] {
                if let Some(id) = queue.related_id(object_type.singular()) {
                    children.insert(ObjectKey::new(object_type, id));
                }
            }
        }
        let fetched: Vec<(ObjectKey, Result<Option<LocalObject>>)> = stream::iter(children)
            .map(|key| async move { (key, remote.try_fetch(key.object_type, key.id).await) })
            .buffer_unordered(max_in_flight.max(1))
            .collect()
            .await;
        let mut fetched_children: BTreeMap<ObjectKey, LocalObject> = BTreeMap::new();
        for (key, object) in fetched {
            match object? {
                Some(object) => {
                    fetched_children.insert(key, object);
                }
                None => warn!(object_type = %key.object_type, object_id = key.id, "Referenced object not found remotely"),
            }
        }
        for (key, object) in fetched_children {
            snapshot = snapshot.with(key.object_type, vec![object]);
        }

        info!(
            org_id,
            workspaces = snapshot.of(ObjectType::Workspace).len(),
            queues = snapshot.of(ObjectType::Queue).len(),
            hooks = snapshot.of(ObjectType::Hook).len(),
            "Fetched remote snapshot"
        );
        Ok(snapshot)
    }

    /// Objects of one type, in fetch order.
    pub fn of(&self, object_type: ObjectType) -> &[LocalObject] {
        if object_type == ObjectType::Organization {
            return std::slice::from_ref(&self.organization);
        }
        self.objects
            .get(&object_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn get(&self, key: &ObjectKey) -> Option<&LocalObject> {
        self.of(key.object_type)
            .iter()
            .find(|o| o.id == Some(key.id))
    }

    /// `{type: {id}}` of everything present remotely.
    pub fn ids_by_type(&self) -> BTreeMap<ObjectType, BTreeSet<i64>> {
        ObjectType::ALL
            .into_iter()
            .map(|t| (t, self.of(t).iter().filter_map(|o| o.id).collect()))
            .collect()
    }

    /// Every id seen, regardless of type.
    pub fn all_ids(&self) -> BTreeSet<i64> {
        ObjectType::ALL
            .into_iter()
            .flat_map(|t| self.of(t).iter().filter_map(|o| o.id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prd_remote::mock::MockRemote;
    use serde_json::json;

    fn remote() -> MockRemote {
        let base = "https://mock.example.com/api/v1";
        MockRemote::new()
            .with_object(ObjectType::Organization, json!({"id": 1, "name": "Org"}))
            .with_object(ObjectType::Workspace, json!({"id": 2, "name": "W"}))
            .with_object(ObjectType::Queue, json!({
                "id": 3,
                "name": "Q",
                "workspace": format!("{}/workspaces/2", base),
                "schema": format!("{}/schemas/4", base),
                "inbox": format!("{}/inboxes/5", base)
            }))
            .with_object(ObjectType::Schema, json!({"id": 4, "queues": [format!("{}/queues/3", base)]}))
            .with_object(ObjectType::Inbox, json!({"id": 5, "queues": [format!("{}/queues/3", base)]}))
            .with_object(ObjectType::Hook, json!({"id": 6, "name": "H"}))
    }

    #[tokio::test]
    async fn test_fetch_snapshot() {
        let remote = remote();
        let snapshot = RemoteSnapshot::fetch(&remote, 1, 5).await.unwrap();
        assert_eq!(snapshot.of(ObjectType::Queue).len(), 1);
        assert_eq!(snapshot.of(ObjectType::Schema).len(), 1);
        assert_eq!(snapshot.of(ObjectType::Inbox).len(), 1);
        assert!(snapshot.get(&ObjectKey::new(ObjectType::Hook, 6)).is_some());
        assert_eq!(snapshot.all_ids(), (1..=6).collect());
    }

    #[tokio::test]
    async fn test_unknown_organization_is_a_download_error() {
        let remote = remote();
        let err = RemoteSnapshot::fetch(&remote, 99, 5).await.unwrap_err();
        assert!(matches!(err, Error::Download { org_id: 99, .. }));
    }
}
