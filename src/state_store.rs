use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::OrchestratorError;
use crate::types::WorkflowState;

/// In-memory, concurrency-safe map of `run_id → WorkflowState`.
///
/// `update` is the only mutation path: it takes the state out from
/// under the lock, hands an owned copy to the caller's closure, and
/// installs whatever the closure returns — no caller ever holds a
/// mutable reference into the store's internals, preserving the
/// functional-update invariant from SPEC_FULL §4.8.
pub struct WorkflowStateStore {
    runs: Mutex<HashMap<String, WorkflowState>>,
}

impl WorkflowStateStore {
    pub fn new() -> Self {
        Self { runs: Mutex::new(HashMap::new()) }
    }

    pub fn put(&self, state: WorkflowState) {
        self.runs.lock().unwrap().insert(state.run_id.clone(), state);
    }

    pub fn get(&self, run_id: &str) -> Option<WorkflowState> {
        self.runs.lock().unwrap().get(run_id).cloned()
    }

    /// Applies `f` to the current state for `run_id` and stores its
    /// result. `f` is synchronous by design — async work (model calls,
    /// tool execution) happens before `update` is called, and only the
    /// resulting successor is installed here.
    pub fn update<F>(&self, run_id: &str, f: F) -> Result<WorkflowState, OrchestratorError>
    where
        F: FnOnce(WorkflowState) -> WorkflowState,
    {
        let mut runs = self.runs.lock().unwrap();
        let current = runs.remove(run_id).ok_or_else(|| OrchestratorError::UnknownRun(run_id.to_string()))?;
        let next = f(current);
        runs.insert(run_id.to_string(), next.clone());
        Ok(next)
    }

    pub fn delete(&self, run_id: &str) -> Option<WorkflowState> {
        self.runs.lock().unwrap().remove(run_id)
    }

    /// Run ids whose state is terminal and whose `updated_at` is older
    /// than `retention`, for the garbage-collection sweeper.
    pub fn terminal_older_than(&self, retention: chrono::Duration) -> Vec<String> {
        let cutoff = chrono::Utc::now() - retention;
        self.runs.lock().unwrap().values()
            .filter(|s| s.is_terminal() && s.updated_at < cutoff)
            .map(|s| s.run_id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.runs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for WorkflowStateStore {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExecutionContext;

    #[test]
    fn update_on_unknown_run_errors() {
        let store = WorkflowStateStore::new();
        let result = store.update("missing", |s| s);
        assert!(matches!(result, Err(OrchestratorError::UnknownRun(_))));
    }

    #[test]
    fn update_installs_successor_atomically() {
        let store = WorkflowStateStore::new();
        let context = ExecutionContext::new("task", "role", "user");
        let state = WorkflowState::new("run-1", context);
        store.put(state);

        let updated = store.update("run-1", |mut s| {
            s.status.message = "changed".to_string();
            s
        }).unwrap();

        assert_eq!(updated.status.message, "changed");
        assert_eq!(store.get("run-1").unwrap().status.message, "changed");
    }
}
