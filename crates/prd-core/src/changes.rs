//! Normalized local change records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// What happened to a local file since the last commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    /// Untracked new file.
    Created,
    /// New file already added to the index.
    CreatedStaged,
    /// Modified tracked file.
    Updated,
    /// Staged modification with further unstaged edits on top.
    PartiallyUpdated,
    /// Removed tracked file.
    Deleted,
}

impl ChangeOp {
    pub fn is_create(&self) -> bool {
        matches!(self, ChangeOp::Created | ChangeOp::CreatedStaged)
    }

    pub fn is_update(&self) -> bool {
        matches!(self, ChangeOp::Updated | ChangeOp::PartiallyUpdated)
    }

    /// Precedence when two records name the same path.
    fn rank(&self) -> u8 {
        match self {
            ChangeOp::Updated => 0,
            ChangeOp::PartiallyUpdated => 1,
            ChangeOp::Created | ChangeOp::CreatedStaged => 2,
            ChangeOp::Deleted => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeOp::Created => "created",
            ChangeOp::CreatedStaged => "created_staged",
            ChangeOp::Updated => "updated",
            ChangeOp::PartiallyUpdated => "partially_updated",
            ChangeOp::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ChangeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single normalized change: an operation on a JSON object path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub op: ChangeOp,
    pub path: PathBuf,
}

impl ChangeRecord {
    pub fn new(op: ChangeOp, path: impl Into<PathBuf>) -> Self {
        Self {
            op,
            path: path.into(),
        }
    }
}

/// Deduplicated collection of change records keyed by path.
///
/// A path is reported at most once. When two operations collide the stronger
/// one is kept (`deleted` > `created*` > `partially_updated` > `updated`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    records: BTreeMap<PathBuf, ChangeOp>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, merging with an existing record for the same path.
    pub fn insert(&mut self, record: ChangeRecord) {
        self.records
            .entry(record.path)
            .and_modify(|existing| {
                if record.op.rank() > existing.rank() {
                    *existing = record.op;
                }
            })
            .or_insert(record.op);
    }

    /// Replace whatever is recorded for `path`.
    pub fn set(&mut self, op: ChangeOp, path: impl Into<PathBuf>) {
        self.records.insert(path.into(), op);
    }

    pub fn get(&self, path: &Path) -> Option<ChangeOp> {
        self.records.get(path).copied()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.records.contains_key(path)
    }

    pub fn remove(&mut self, path: &Path) -> Option<ChangeOp> {
        self.records.remove(path)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.records.keys().map(PathBuf::as_path)
    }

    /// Records in path order.
    pub fn records(&self) -> Vec<ChangeRecord> {
        self.records
            .iter()
            .map(|(path, op)| ChangeRecord::new(*op, path.clone()))
            .collect()
    }
}

impl FromIterator<ChangeRecord> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = ChangeRecord>>(iter: I) -> Self {
        let mut set = ChangeSet::new();
        for record in iter {
            set.insert(record);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_reported_once() {
        let mut set = ChangeSet::new();
        set.insert(ChangeRecord::new(ChangeOp::Updated, "a/hook_[1].json"));
        set.insert(ChangeRecord::new(ChangeOp::Updated, "a/hook_[1].json"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_create_wins_over_update() {
        let mut set = ChangeSet::new();
        set.insert(ChangeRecord::new(ChangeOp::Created, "h.json"));
        set.insert(ChangeRecord::new(ChangeOp::Updated, "h.json"));
        assert_eq!(set.get(Path::new("h.json")), Some(ChangeOp::Created));

        let mut set = ChangeSet::new();
        set.insert(ChangeRecord::new(ChangeOp::Updated, "h.json"));
        set.insert(ChangeRecord::new(ChangeOp::CreatedStaged, "h.json"));
        assert_eq!(set.get(Path::new("h.json")), Some(ChangeOp::CreatedStaged));
    }

    #[test]
    fn test_records_are_sorted_by_path() {
        let set: ChangeSet = vec![
            ChangeRecord::new(ChangeOp::Deleted, "b.json"),
            ChangeRecord::new(ChangeOp::Created, "a.json"),
        ]
        .into_iter()
        .collect();
        let records = set.records();
        assert_eq!(records[0].path, PathBuf::from("a.json"));
        assert_eq!(records[1].op, ChangeOp::Deleted);
    }
}
