use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::OrchestratorError;
use crate::types::{ExecutionOutcome, Payload, ToolCatalog, ToolDescriptor};

/// The boundary between the orchestrator and whatever actually hosts
/// tools — an MCP server, an in-process registry, a remote RPC service.
///
/// Implementations must be cheap to clone/share (`Send + Sync`) since the
/// orchestrator holds one behind an `Arc` for the lifetime of the process.
#[async_trait]
pub trait ToolCatalogClient: Send + Sync {
    async fn list_tools(&self) -> Result<ToolCatalog, OrchestratorError>;

    async fn execute_tool(
        &self,
        name: &str,
        parameters: &Payload,
    ) -> Result<ExecutionOutcome, OrchestratorError>;
}

/// An in-process catalog backed by a fixed set of tool descriptors and
/// closures — used in tests and demos where standing up a real MCP
/// server would be overkill.
pub struct StaticToolCatalogClient {
    catalog: ToolCatalog,
    handlers: HashMap<String, Box<dyn Fn(&Payload) -> Result<serde_json::Value, String> + Send + Sync>>,
    calls: Mutex<Vec<String>>,
}

impl StaticToolCatalogClient {
    pub fn new() -> Self {
        Self {
            catalog: ToolCatalog::empty(),
            handlers: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn register(
        mut self,
        descriptor: ToolDescriptor,
        handler: impl Fn(&Payload) -> Result<serde_json::Value, String> + Send + Sync + 'static,
    ) -> Self {
        let mut tools = self.catalog.tools().to_vec();
        tools.push(descriptor.clone());
        self.catalog = ToolCatalog::new(tools);
        self.handlers.insert(descriptor.name, Box::new(handler));
        self
    }

    /// Names of tools executed so far, in call order — for test assertions.
    pub fn call_log(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for StaticToolCatalogClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolCatalogClient for StaticToolCatalogClient {
    async fn list_tools(&self) -> Result<ToolCatalog, OrchestratorError> {
        Ok(self.catalog.clone())
    }

    async fn execute_tool(
        &self,
        name: &str,
        parameters: &Payload,
    ) -> Result<ExecutionOutcome, OrchestratorError> {
        self.calls.lock().unwrap().push(name.to_string());
        match self.handlers.get(name) {
            Some(handler) => match handler(parameters) {
                Ok(data) => Ok(ExecutionOutcome { ok: true, data: Some(data), error: None }),
                Err(e)   => Ok(ExecutionOutcome { ok: false, data: None, error: Some(e) }),
            },
            None => Ok(ExecutionOutcome {
                ok: false,
                data: None,
                error: Some(format!("tool '{}' not found in catalog", name)),
            }),
        }
    }
}

/// Bridges an MCP server's tool set into the orchestrator's catalog
/// contract, reusing the existing stdio JSON-RPC client.
pub struct McpToolCatalogClient {
    client: std::sync::Arc<crate::mcp::McpClient>,
    server_name: String,
}

impl McpToolCatalogClient {
    pub fn new(client: std::sync::Arc<crate::mcp::McpClient>, server_name: impl Into<String>) -> Self {
        Self { client, server_name: server_name.into() }
    }
}

#[async_trait]
impl ToolCatalogClient for McpToolCatalogClient {
    async fn list_tools(&self) -> Result<ToolCatalog, OrchestratorError> {
        let tools = self.client.list_tools().await
            .map_err(|e| OrchestratorError::CatalogError(e.to_string()))?;

        let descriptors = tools.into_iter().map(|t| ToolDescriptor {
            name:        t.name,
            description: t.description.unwrap_or_default(),
            server:       self.server_name.clone(),
            parameters:  t.input_schema.unwrap_or_else(|| serde_json::json!({})),
            returns:      None,
            tags:         Vec::new(),
        }).collect();

        Ok(ToolCatalog::new(descriptors))
    }

    async fn execute_tool(
        &self,
        name: &str,
        parameters: &Payload,
    ) -> Result<ExecutionOutcome, OrchestratorError> {
        match self.client.call_tool(name, parameters.clone()).await {
            Ok(result) => {
                let mut text = String::new();
                for content in &result.content {
                    if let crate::mcp::McpContent::Text { text: t } = content {
                        text.push_str(t);
                    }
                }
                if result.is_error {
                    Ok(ExecutionOutcome { ok: false, data: None, error: Some(text) })
                } else {
                    Ok(ExecutionOutcome { ok: true, data: Some(serde_json::Value::String(text)), error: None })
                }
            }
            Err(e) => Ok(ExecutionOutcome { ok: false, data: None, error: Some(e.to_string()) }),
        }
    }
}
