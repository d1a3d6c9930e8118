//! Test doubles: a scripted transport and an in-memory remote platform.
//!
//! ```rust,ignore
//! let remote = MockRemote::new()
//!     .with_object(ObjectType::Queue, json!({"id": 5, "name": "Invoices"}));
//! let queue = remote.fetch_one(ObjectType::Queue, 5).await?;
//! assert_eq!(remote.update_count(), 0);
//! ```

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Mutex;

use prd_core::{Error, LocalObject, ObjectKey, ObjectType, Result};

use crate::api::RemoteApi;
use crate::transport::{ApiRequest, ApiResponse, Transport};

// =============================================================================
// SCRIPTED TRANSPORT
// =============================================================================

/// Transport replaying a queue of canned responses.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<ApiResponse>>>,
    fallback: Option<ApiResponse>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Response returned once the script is exhausted.
    pub fn with_fallback(mut self, response: ApiResponse) -> Self {
        self.fallback = Some(response);
        self
    }

    pub fn push(&self, response: ApiResponse) {
        self.script.lock().unwrap().push_back(Ok(response));
    }

    pub fn push_error(&self, error: Error) {
        self.script.lock().unwrap().push_back(Err(error));
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(outcome) => outcome,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| Error::Internal("scripted transport exhausted".into())),
        }
    }
}

// =============================================================================
// IN-MEMORY REMOTE
// =============================================================================

/// A recorded mutation against the mock remote.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Create { object_type: ObjectType, body: JsonValue },
    Update { object_type: ObjectType, id: i64, body: JsonValue },
    Delete { object_type: ObjectType, id: i64 },
}

#[derive(Default)]
struct MockState {
    objects: BTreeMap<ObjectKey, LocalObject>,
    calls: Vec<MockCall>,
    failing: BTreeSet<ObjectKey>,
    next_id: i64,
    clock: u64,
}

/// In-memory implementation of the remote API.
///
/// Updates bump `modified_at`; creates assign fresh ids starting at 10 000.
#[derive(Default)]
pub struct MockRemote {
    state: Mutex<MockState>,
    base_url: String,
}

impl MockRemote {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                next_id: 10_000,
                ..MockState::default()
            }),
            base_url: "https://mock.example.com/api/v1".to_string(),
        }
    }

    /// URL the mock assigns to an object.
    pub fn url_for(&self, object_type: ObjectType, id: i64) -> String {
        format!("{}/{}/{}", self.base_url, object_type.resource(), id)
    }

    /// Seed an object. `url` is filled in when missing.
    pub fn with_object(self, object_type: ObjectType, value: JsonValue) -> Self {
        self.insert(object_type, value);
        self
    }

    /// Seed or replace an object.
    pub fn insert(&self, object_type: ObjectType, value: JsonValue) {
        let mut object = LocalObject::from_value(value).expect("mock object must be a JSON object");
        let id = object.id.expect("mock object needs an id");
        if object.url.is_none() {
            object.url = Some(self.url_for(object_type, id));
        }
        self.state
            .lock()
            .unwrap()
            .objects
            .insert(ObjectKey::new(object_type, id), object);
    }

    /// Remove an object as if it had been deleted remotely.
    pub fn remove(&self, object_type: ObjectType, id: i64) {
        self.state
            .lock()
            .unwrap()
            .objects
            .remove(&ObjectKey::new(object_type, id));
    }

    /// Make every mutation of this object fail with a 500.
    pub fn fail_on(&self, object_type: ObjectType, id: i64) {
        self.state
            .lock()
            .unwrap()
            .failing
            .insert(ObjectKey::new(object_type, id));
    }

    pub fn get(&self, object_type: ObjectType, id: i64) -> Option<LocalObject> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(&ObjectKey::new(object_type, id))
            .cloned()
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn create_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MockCall::Create { .. }))
            .count()
    }

    pub fn update_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MockCall::Update { .. }))
            .count()
    }

    pub fn delete_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MockCall::Delete { .. }))
            .count()
    }
}

fn not_found(key: &ObjectKey) -> Error {
    Error::remote(404, format!("{} not found", key))
}

#[async_trait]
impl RemoteApi for MockRemote {
    async fn fetch_one(&self, object_type: ObjectType, id: i64) -> Result<LocalObject> {
        let key = ObjectKey::new(object_type, id);
        self.state
            .lock()
            .unwrap()
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| not_found(&key))
    }

    async fn fetch_all(&self, object_type: ObjectType) -> Result<Vec<LocalObject>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .objects
            .iter()
            .filter(|(key, _)| key.object_type == object_type)
            .map(|(_, object)| object.clone())
            .collect())
    }

    async fn create(&self, object_type: ObjectType, body: &LocalObject) -> Result<LocalObject> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(MockCall::Create {
            object_type,
            body: body.to_value()?,
        });
        state.next_id += 1;
        state.clock += 1;
        let id = state.next_id;
        let mut object = body.clone();
        object.id = Some(id);
        object.url = Some(self.url_for(object_type, id));
        object.modified_at = Some(format!("2024-01-01T00:00:{:02}Z", state.clock % 60));
        state
            .objects
            .insert(ObjectKey::new(object_type, id), object.clone());
        Ok(object)
    }

    async fn update(&self, object_type: ObjectType, id: i64, body: &LocalObject) -> Result<LocalObject> {
        let key = ObjectKey::new(object_type, id);
        let mut state = self.state.lock().unwrap();
        state.calls.push(MockCall::Update {
            object_type,
            id,
            body: body.to_value()?,
        });
        if state.failing.contains(&key) {
            return Err(Error::remote(500, "mock failure"));
        }
        if !state.objects.contains_key(&key) {
            return Err(not_found(&key));
        }
        state.clock += 1;
        let mut object = body.clone();
        object.id = Some(id);
        object.url = Some(self.url_for(object_type, id));
        object.modified_at = Some(format!("2024-06-01T00:00:{:02}Z", state.clock % 60));
        state.objects.insert(key, object.clone());
        Ok(object)
    }

    async fn delete(&self, object_type: ObjectType, id: i64) -> Result<()> {
        let key = ObjectKey::new(object_type, id);
        let mut state = self.state.lock().unwrap();
        state.calls.push(MockCall::Delete { object_type, id });
        if state.failing.contains(&key) {
            return Err(Error::remote(500, "mock failure"));
        }
        state
            .objects
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| not_found(&key))
    }
}
