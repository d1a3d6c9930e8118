//! Outcome reports for pull and push runs.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use prd_core::{ObjectKey, ObjectType};

/// A per-object failure collected instead of aborting the batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectError {
    pub object_type: Option<ObjectType>,
    pub object_id: Option<i64>,
    pub path: Option<PathBuf>,
    pub message: String,
}

impl ObjectError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            object_type: None,
            object_id: None,
            path: None,
            message: message.into(),
        }
    }

    pub fn for_key(mut self, key: ObjectKey) -> Self {
        self.object_type = Some(key.object_type);
        self.object_id = Some(key.id);
        self
    }

    pub fn for_type(mut self, object_type: ObjectType) -> Self {
        self.object_type = Some(object_type);
        self
    }

    pub fn at(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl fmt::Display for ObjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(t) = self.object_type {
            write!(f, "{}", t)?;
            if let Some(id) = self.object_id {
                write!(f, " {}", id)?;
            }
            f.write_str(": ")?;
        }
        f.write_str(&self.message)?;
        if let Some(path) = &self.path {
            write!(f, " ({})", path.display())?;
        }
        Ok(())
    }
}

/// Summary of one organization's pull.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PullReport {
    pub written: Vec<PathBuf>,
    pub skipped: usize,
    pub merged: Vec<PathBuf>,
    /// Objects left with unresolved merge conflicts.
    pub blocked: Vec<PathBuf>,
    pub unrouted: Vec<ObjectKey>,
    pub removed: Vec<PathBuf>,
    pub errors: Vec<ObjectError>,
}

impl PullReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.blocked.is_empty()
    }
}

/// Kind of remote mutation issued by a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        })
    }
}

/// A remote mutation that succeeded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedOperation {
    pub kind: OperationKind,
    pub object_type: ObjectType,
    pub object_id: i64,
    pub path: PathBuf,
}

/// Summary of a push.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PushReport {
    pub applied: Vec<AppliedOperation>,
    pub errors: Vec<ObjectError>,
}

impl PushReport {
    pub fn count(&self, kind: OperationKind) -> usize {
        self.applied.iter().filter(|op| op.kind == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_error_display() {
        let err = ObjectError::new("modified_at mismatch")
            .for_key(ObjectKey::new(ObjectType::Queue, 4))
            .at("dev/default/queue.json");
        assert_eq!(
            err.to_string(),
            "queue 4: modified_at mismatch (dev/default/queue.json)"
        );
    }
}
