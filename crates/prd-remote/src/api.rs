//! Typed remote API used by the reconcilers.

use async_trait::async_trait;

use prd_core::{LocalObject, ObjectType, Result};

/// CRUD access to the remote platform's configuration objects.
///
/// Every implementation routed to a real server goes through the retry policy;
/// callers never retry on their own.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Fetch one object by id. A missing object yields an error whose
    /// `is_not_found()` is true.
    async fn fetch_one(&self, object_type: ObjectType, id: i64) -> Result<LocalObject>;

    /// Fetch every object of a type visible to the organization, following pagination.
    async fn fetch_all(&self, object_type: ObjectType) -> Result<Vec<LocalObject>>;

    /// Create an object; returns the remote's representation (with its new id).
    async fn create(&self, object_type: ObjectType, body: &LocalObject) -> Result<LocalObject>;

    /// Update an object in place.
    async fn update(&self, object_type: ObjectType, id: i64, body: &LocalObject) -> Result<LocalObject>;

    /// Delete an object.
    async fn delete(&self, object_type: ObjectType, id: i64) -> Result<()>;

    /// Probe for existence, mapping "not found" to `None`.
    async fn try_fetch(&self, object_type: ObjectType, id: i64) -> Result<Option<LocalObject>> {
        match self.fetch_one(object_type, id).await {
            Ok(object) => Ok(Some(object)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
