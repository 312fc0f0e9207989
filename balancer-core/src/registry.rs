//! Manager registry (spec section 4.1): named, independent balancer
//! managers under one agent. Create/delete are serialized by a single
//! mutex; get/list take the same lock (spec section 5 shared-resource
//! policy), which is enough because both are O(1) hash lookups, not a
//! source of contention worth splitting further.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::schema::BalancerConfigPatch;
use crate::error::{BalancerError, BalancerResult};
use crate::manager::Manager;

#[derive(Default)]
pub struct ManagerRegistry {
    managers: Mutex<HashMap<String, Arc<Manager>>>,
}

impl ManagerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `create(name, config)` (spec section 4.1/6). Rejects a duplicate
    /// name without touching the existing manager (testable property 9).
    pub fn create(&self, name: &str, config: BalancerConfigPatch) -> BalancerResult<Arc<Manager>> {
        let mut managers = self.managers.lock();
        if managers.contains_key(name) {
            return Err(BalancerError::Duplicate(name.to_string()));
        }
        let manager = Arc::new(Manager::create(name, config)?);
        managers.insert(name.to_string(), manager.clone());
        Ok(manager)
    }

    pub fn get(&self, name: &str) -> BalancerResult<Arc<Manager>> {
        self.managers
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| BalancerError::NotFound(name.to_string()))
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.managers.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Releases the manager's data-plane links and frees its resources
    /// (spec section 4.1). The registry is the sole owner of the `Arc`
    /// it hands out for long-term reference (e.g. the refresh-loop task),
    /// so dropping it here only frees the registry's own slot; any task
    /// still holding a clone keeps the manager alive until it notices the
    /// name is gone.
    pub fn delete(&self, name: &str) -> BalancerResult<()> {
        self.managers
            .lock()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| BalancerError::NotFound(name.to_string()))
    }
}
