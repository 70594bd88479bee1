use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::config::AgentRoleConfig;

/// The resolved, ready-to-use handle for an agent role: its config plus
/// the model name it should call with. Construction of a real per-role
/// agent (binding prompts, tool restrictions, etc.) is often nontrivial
/// enough that the orchestrator shouldn't repeat it on every node
/// traversal — this cache memoizes it per process.
#[derive(Debug, Clone)]
pub struct AgentHandle {
    pub agent_role: String,
    pub config:     AgentRoleConfig,
}

/// Process-wide memoization of constructed agent handles, keyed by role.
///
/// Mirrors the teacher's preference for a `Mutex`/`RwLock`-guarded
/// `HashMap` as the shared-registry idiom (see `checkpoint.rs`'s
/// `MemoryCheckpointStore`), rather than a process-global `static` —
/// the cache is owned by the orchestrator's runtime and passed by
/// reference, which keeps it replaceable in tests.
pub struct AgentCache {
    handles: RwLock<HashMap<String, Arc<AgentHandle>>>,
}

impl AgentCache {
    pub fn new() -> Self {
        Self { handles: RwLock::new(HashMap::new()) }
    }

    /// Returns the cached handle for `agent_role`, building and caching
    /// one from `config` if this is the first request for that role.
    pub fn get_or_build(&self, agent_role: &str, config: &AgentRoleConfig) -> Arc<AgentHandle> {
        if let Some(handle) = self.handles.read().unwrap().get(agent_role) {
            return Arc::clone(handle);
        }

        let handle = Arc::new(AgentHandle {
            agent_role: agent_role.to_string(),
            config: config.clone(),
        });

        self.handles.write().unwrap().insert(agent_role.to_string(), Arc::clone(&handle));
        handle
    }

    pub fn clear(&self) {
        self.handles.write().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.handles.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AgentCache {
    fn default() -> Self { Self::new() }
}
