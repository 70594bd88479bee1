use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Per-role settings: which prompt template and model to use, and the
/// tool/approval policies that gate that role's proposals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRoleConfig {
    pub prompt_template_id: String,
    pub model:              String,
    #[serde(default)]
    pub allowed_tools:      Option<Vec<String>>,
    #[serde(default)]
    pub denied_tools:       Vec<String>,
    #[serde(default)]
    pub read_only:          bool,
    #[serde(default)]
    pub max_executions:     Option<u32>,
    #[serde(default)]
    pub require_approval_for_all: bool,
    #[serde(default)]
    pub high_risk_tools:    Vec<String>,
}

impl Default for AgentRoleConfig {
    fn default() -> Self {
        Self {
            prompt_template_id: "default".to_string(),
            model:              "gpt-4o".to_string(),
            allowed_tools:      None,
            denied_tools:       Vec::new(),
            read_only:          false,
            max_executions:     None,
            require_approval_for_all: false,
            high_risk_tools:    Vec::new(),
        }
    }
}

/// Runtime options read by the orchestrator and scheduler. Deserializable
/// from a TOML file; any field left out falls back to its `Default`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub tool_timeout_seconds:      u64,
    pub overall_timeout_seconds:   u64,
    pub approval_timeout_seconds:  u64,
    pub max_retries:               u32,
    pub retry_delay_seconds:       u64,
    pub terminal_retention_seconds: u64,
    pub scheduler_tick_seconds:    u64,
    pub scheduler_concurrency_cap: usize,
    pub max_concurrent_executions: usize,
    pub allowed_roles:             Vec<String>,
    pub roles:                     HashMap<String, AgentRoleConfig>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tool_timeout_seconds:       30,
            overall_timeout_seconds:    300,
            approval_timeout_seconds:   3600,
            max_retries:                3,
            retry_delay_seconds:        5,
            terminal_retention_seconds: 86_400,
            scheduler_tick_seconds:     60,
            scheduler_concurrency_cap:  8,
            max_concurrent_executions:  16,
            allowed_roles:              Vec::new(),
            roles:                      HashMap::new(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, crate::error::OrchestratorError> {
        toml::from_str(s).map_err(|e| crate::error::OrchestratorError::ConfigError(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, crate::error::OrchestratorError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| crate::error::OrchestratorError::ConfigError(e.to_string()))?;
        Self::from_toml_str(&contents)
    }

    pub fn role(&self, agent_role: &str) -> AgentRoleConfig {
        self.roles.get(agent_role).cloned().unwrap_or_default()
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_seconds)
    }

    pub fn overall_timeout(&self) -> Duration {
        Duration::from_secs(self.overall_timeout_seconds)
    }

    pub fn approval_timeout(&self) -> Duration {
        Duration::from_secs(self.approval_timeout_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds)
    }
}
