//! Subdirectories: named partitions of one organization's local tree.

use regex::Regex;
use std::collections::BTreeSet;

use crate::models::ObjectKey;

/// A local partition of an organization directory.
///
/// `object_ids` is rebuilt from the files on disk at the start of every run
/// and grows as objects are routed during the run.
#[derive(Debug, Clone)]
pub struct Subdirectory {
    pub name: String,
    pub regex: Option<Regex>,
    /// Excluded subdirectories keep routing stable but are never written or pushed.
    pub include: bool,
    pub object_ids: BTreeSet<ObjectKey>,
}

impl Subdirectory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            regex: None,
            include: true,
            object_ids: BTreeSet::new(),
        }
    }

    pub fn with_regex(mut self, regex: Regex) -> Self {
        self.regex = Some(regex);
        self
    }

    pub fn with_include(mut self, include: bool) -> Self {
        self.include = include;
        self
    }

    /// Whether the subdirectory's name pattern matches an object name.
    pub fn matches_name(&self, name: &str) -> bool {
        self.regex.as_ref().is_some_and(|re| re.is_match(name))
    }

    pub fn knows(&self, key: &ObjectKey) -> bool {
        self.object_ids.contains(key)
    }
}
