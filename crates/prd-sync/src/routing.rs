//! Subdirectory routing for remote objects.
//!
//! Resolution order: a lone subdirectory takes everything; otherwise a known
//! id is sticky, then the parent's subdirectory is inherited, then name
//! patterns are tried in configuration order. Anything left is unrouted.

use tracing::debug;

use prd_core::{ObjectKey, Subdirectory};

/// Routes objects to subdirectories and remembers every assignment.
#[derive(Debug, Clone)]
pub struct Router {
    subdirs: Vec<Subdirectory>,
}

impl Router {
    pub fn new(subdirs: Vec<Subdirectory>) -> Self {
        Self { subdirs }
    }

    pub fn subdirs(&self) -> &[Subdirectory] {
        &self.subdirs
    }

    pub fn names(&self) -> Vec<String> {
        self.subdirs.iter().map(|s| s.name.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Subdirectory> {
        self.subdirs.iter().find(|s| s.name == name)
    }

    /// Whether objects routed to `name` are written and pushed.
    pub fn is_included(&self, name: &str) -> bool {
        self.get(name).is_some_and(|s| s.include)
    }

    /// Resolve without recording the result.
    pub fn resolve(&self, key: &ObjectKey, name: &str, parent: Option<&str>) -> Option<String> {
        if let [only] = self.subdirs.as_slice() {
            return Some(only.name.clone());
        }
        if let Some(known) = self.subdirs.iter().find(|s| s.knows(key)) {
            debug!(object_type = %key.object_type, object_id = key.id, subdir = %known.name, "Routed by known id");
            return Some(known.name.clone());
        }
        if let Some(parent) = parent.filter(|p| self.get(p).is_some()) {
            debug!(object_type = %key.object_type, object_id = key.id, subdir = %parent, "Routed by parent");
            return Some(parent.to_string());
        }
        if let Some(matched) = self.subdirs.iter().find(|s| s.matches_name(name)) {
            debug!(object_type = %key.object_type, object_id = key.id, subdir = %matched.name, "Routed by name pattern");
            return Some(matched.name.clone());
        }
        None
    }

    /// Resolve and make the result sticky for the rest of the run.
    pub fn route(&mut self, key: ObjectKey, name: &str, parent: Option<&str>) -> Option<String> {
        let subdir = self.resolve(&key, name, parent)?;
        self.assign(key, &subdir);
        Some(subdir)
    }

    /// Record a manual or computed assignment.
    pub fn assign(&mut self, key: ObjectKey, subdir: &str) {
        if let Some(target) = self.subdirs.iter_mut().find(|s| s.name == subdir) {
            target.object_ids.insert(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prd_core::ObjectType;
    use regex::Regex;

    fn router() -> Router {
        let mut a = Subdirectory::new("a").with_regex(Regex::new("^alpha").unwrap());
        a.object_ids.insert(ObjectKey::new(ObjectType::Queue, 1));
        let b = Subdirectory::new("b").with_regex(Regex::new("^beta").unwrap());
        Router::new(vec![a, b])
    }

    #[test]
    fn test_single_subdirectory_takes_everything() {
        let router = Router::new(vec![Subdirectory::new("only")]);
        let key = ObjectKey::new(ObjectType::Hook, 9);
        assert_eq!(router.resolve(&key, "anything", None), Some("only".to_string()));
    }

    #[test]
    fn test_known_id_beats_name_pattern() {
        let router = router();
        let key = ObjectKey::new(ObjectType::Queue, 1);
        // renamed so that it would now match b's pattern
        assert_eq!(router.resolve(&key, "beta invoices", None), Some("a".to_string()));
    }

    #[test]
    fn test_parent_inheritance_beats_name_pattern() {
        let router = router();
        let key = ObjectKey::new(ObjectType::Queue, 2);
        assert_eq!(router.resolve(&key, "alpha", Some("b")), Some("b".to_string()));
    }

    #[test]
    fn test_unmatched_is_unrouted() {
        let router = router();
        assert_eq!(router.resolve(&ObjectKey::new(ObjectType::Hook, 3), "gamma", None), None);
    }

    #[test]
    fn test_route_is_sticky_within_run() {
        let mut router = router();
        let key = ObjectKey::new(ObjectType::Workspace, 5);
        assert_eq!(router.route(key, "beta ws", None), Some("b".to_string()));
        assert_eq!(router.resolve(&key, "alpha ws", None), Some("b".to_string()));
    }
}
