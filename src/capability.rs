use std::sync::{Arc, RwLock};

use crate::catalog::ToolCatalogClient;
use crate::error::OrchestratorError;
use crate::types::{ExecutionContext, ToolCatalog, ToolDescriptor, WorkflowState};

/// Additional filtering beyond the context-based role rules applied by
/// the Policy Engine downstream.
#[derive(Debug, Clone, Default)]
pub struct CapabilityFilter {
    pub excluded_tools: Vec<String>,
    pub required_tags:  Vec<String>,
}

/// Discovers and caches the tool catalog, and produces role-filtered
/// views of it for the orchestrator's `capability_discovery` node.
///
/// Grounded on `capability_registry.py`: discovery is cache-once,
/// filter errors degrade to an empty result rather than failing the
/// whole node (policy_validation will reject downstream with a precise
/// reason instead).
pub struct CapabilityRegistry {
    client:  Arc<dyn ToolCatalogClient>,
    cache:   RwLock<Option<ToolCatalog>>,
}

impl CapabilityRegistry {
    pub fn new(client: Arc<dyn ToolCatalogClient>) -> Self {
        Self { client, cache: RwLock::new(None) }
    }

    /// Returns the cached catalog, fetching it on first call.
    pub async fn discover(&self) -> Result<ToolCatalog, OrchestratorError> {
        if let Some(cached) = self.cache.read().unwrap().clone() {
            return Ok(cached);
        }

        let catalog = self.client.list_tools().await
            .map_err(|e| OrchestratorError::CapabilityDiscoveryFailed(e.to_string()))?;

        *self.cache.write().unwrap() = Some(catalog.clone());
        Ok(catalog)
    }

    pub fn clear_cache(&self) {
        *self.cache.write().unwrap() = None;
    }

    /// Applies `filter` on top of the discovered catalog. An empty
    /// catalog is a legitimate result, not an error.
    pub async fn filter(
        &self,
        _context: &ExecutionContext,
        filter: Option<&CapabilityFilter>,
    ) -> Vec<ToolDescriptor> {
        let catalog = match self.discover().await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "capability filter falling back to empty catalog");
                return Vec::new();
            }
        };

        let Some(filter) = filter else { return catalog.tools().to_vec() };

        catalog.tools().iter()
            .filter(|t| !filter.excluded_tools.iter().any(|e| e == &t.name))
            .filter(|t| filter.required_tags.is_empty() ||
                filter.required_tags.iter().all(|tag| t.tags.contains(tag)))
            .cloned()
            .collect()
    }

    /// Runs `filter` with the state's context and writes the result into
    /// `available_capabilities` on a successor `WorkflowState`.
    pub async fn update_workflow_state(&self, state: WorkflowState) -> WorkflowState {
        let tools = self.filter(&state.context, None).await;
        let mut state = state;
        state.available_capabilities = Some(ToolCatalog::new(tools));
        state.updated_at = chrono::Utc::now();
        state
    }

    pub async fn get_by_name(&self, name: &str) -> Option<ToolDescriptor> {
        self.discover().await.ok()?.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticToolCatalogClient;
    use crate::types::ExecutionContext;

    fn descriptor(name: &str, tags: &[&str]) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            description: String::new(),
            server: "test".to_string(),
            parameters: serde_json::json!({}),
            returns: None,
            tags: tags.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn discover_is_cached() {
        let client = Arc::new(StaticToolCatalogClient::new()
            .register(descriptor("a", &[]), |_| Ok(serde_json::Value::Null)));
        let registry = CapabilityRegistry::new(client);

        let first = registry.discover().await.unwrap();
        registry.clear_cache();
        let second = registry.discover().await.unwrap();
        assert_eq!(first.len(), second.len());
    }

    #[tokio::test]
    async fn filter_applies_excluded_tools_and_tags() {
        let client = Arc::new(StaticToolCatalogClient::new()
            .register(descriptor("safe_read", &["safe"]), |_| Ok(serde_json::Value::Null))
            .register(descriptor("danger_write", &["write"]), |_| Ok(serde_json::Value::Null)));
        let registry = CapabilityRegistry::new(client);
        let context = ExecutionContext::new("task", "role", "user");

        let filter = CapabilityFilter { excluded_tools: vec!["danger_write".to_string()], required_tags: vec![] };
        let tools = registry.filter(&context, Some(&filter)).await;
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "safe_read");

        let tag_filter = CapabilityFilter { excluded_tools: vec![], required_tags: vec!["safe".to_string()] };
        let tagged = registry.filter(&context, Some(&tag_filter)).await;
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].name, "safe_read");
    }
}
