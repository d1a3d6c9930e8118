//! Per-run reconciliation context.

use std::collections::BTreeMap;

use prd_core::{defaults, ObjectType, PullStrategy};

/// Decisions and knobs scoped to one organization's run.
///
/// A fresh context is created per organization so sticky choices never leak
/// between organizations reconciled in the same process.
#[derive(Debug, Clone)]
pub struct SyncContext {
    /// Strategy for conflicts; `Ask` defers to the prompter.
    pub default_strategy: PullStrategy,
    sticky: BTreeMap<ObjectType, PullStrategy>,
    /// Push updates even when the remote `modified_at` moved.
    pub force: bool,
    /// Retry a failed update as a create.
    pub upload_all: bool,
    /// Remote requests in flight during bulk operations.
    pub max_in_flight: usize,
}

impl Default for SyncContext {
    fn default() -> Self {
        Self {
            default_strategy: PullStrategy::Ask,
            sticky: BTreeMap::new(),
            force: false,
            upload_all: false,
            max_in_flight: defaults::MAX_IN_FLIGHT,
        }
    }
}

impl SyncContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategy(mut self, strategy: PullStrategy) -> Self {
        self.default_strategy = strategy;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_upload_all(mut self, upload_all: bool) -> Self {
        self.upload_all = upload_all;
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    /// Strategy already fixed for conflicts of this type, if any.
    pub fn sticky_strategy(&self, object_type: ObjectType) -> Option<PullStrategy> {
        match self.default_strategy {
            PullStrategy::Ask => self.sticky.get(&object_type).copied(),
            fixed => Some(fixed),
        }
    }

    pub fn remember(&mut self, object_type: ObjectType, strategy: PullStrategy) {
        self.sticky.insert(object_type, strategy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sticky_is_per_type() {
        let mut ctx = SyncContext::new();
        assert_eq!(ctx.sticky_strategy(ObjectType::Queue), None);
        ctx.remember(ObjectType::Queue, PullStrategy::Merge);
        assert_eq!(ctx.sticky_strategy(ObjectType::Queue), Some(PullStrategy::Merge));
        assert_eq!(ctx.sticky_strategy(ObjectType::Hook), None);
    }

    #[test]
    fn test_fixed_strategy_overrides_prompting() {
        let ctx = SyncContext::new().with_strategy(PullStrategy::Overwrite);
        assert_eq!(ctx.sticky_strategy(ObjectType::Schema), Some(PullStrategy::Overwrite));
    }
}
