use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::config::AgentRoleConfig;
use crate::types::{ActionProposal, ExecutionContext, ToolCatalog};

const WRITE_HEURISTIC_KEYWORDS: &[&str] =
    &["write", "delete", "remove", "update", "create", "deploy", "execute"];

/// Outcome of a full policy validation pass — the set named in SPEC_FULL §4.3/§7.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Allowed,
    DeniedByToolPolicy(String),
    DeniedByRole(String),
    DeniedByLimit(String),
    DeniedBySafety(String),
}

impl PolicyDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Gates which tools a role may invoke, how often, and whether it may
/// only read. Per-tool execution counters are process-local and keyed
/// by tool name.
pub struct ToolPolicy {
    allowed_tools:  Option<Vec<String>>,
    denied_tools:   Vec<String>,
    read_only:      bool,
    max_executions: Option<u32>,
    counters:       Mutex<HashMap<String, u32>>,
}

impl ToolPolicy {
    pub fn from_config(config: &AgentRoleConfig) -> Self {
        Self {
            allowed_tools:  config.allowed_tools.clone(),
            denied_tools:   config.denied_tools.clone(),
            read_only:      config.read_only,
            max_executions: config.max_executions,
            counters:       Mutex::new(HashMap::new()),
        }
    }

    fn looks_like_write(tool_name: &str) -> bool {
        let lower = tool_name.to_lowercase();
        WRITE_HEURISTIC_KEYWORDS.iter().any(|kw| lower.contains(kw))
    }

    /// Denial order matches SPEC_FULL §4.3: denylist, then allowlist
    /// absence, then read-only heuristic, then execution count.
    pub fn evaluate(&self, tool_name: &str) -> Option<PolicyDecision> {
        if self.denied_tools.iter().any(|t| t == tool_name) {
            return Some(PolicyDecision::DeniedByToolPolicy(format!("'{}' is in denied_tools", tool_name)));
        }
        if let Some(allowed) = &self.allowed_tools {
            if !allowed.iter().any(|t| t == tool_name) {
                return Some(PolicyDecision::DeniedByToolPolicy(format!("'{}' is not in allowed_tools", tool_name)));
            }
        }
        if self.read_only && Self::looks_like_write(tool_name) {
            return Some(PolicyDecision::DeniedByToolPolicy(format!("'{}' looks like a write operation under a read_only policy", tool_name)));
        }
        if let Some(limit) = self.max_executions {
            let count = self.counters.lock().unwrap().get(tool_name).copied().unwrap_or(0);
            if count >= limit {
                return Some(PolicyDecision::DeniedByLimit(format!("'{}' reached its execution limit of {}", tool_name, limit)));
            }
        }
        None
    }

    pub fn record_execution(&self, tool_name: &str) {
        *self.counters.lock().unwrap().entry(tool_name.to_string()).or_insert(0) += 1;
    }
}

/// Decides whether a proposed action requires human approval.
pub struct ApprovalPolicy {
    require_approval_for_all: bool,
    high_risk_tools:          Vec<String>,
    pub approval_timeout:     std::time::Duration,
}

impl ApprovalPolicy {
    pub fn from_config(config: &AgentRoleConfig, approval_timeout: std::time::Duration) -> Self {
        Self {
            require_approval_for_all: config.require_approval_for_all,
            high_risk_tools: config.high_risk_tools.clone(),
            approval_timeout,
        }
    }

    pub fn requires_approval(&self, tool_name: &str) -> bool {
        self.require_approval_for_all || self.high_risk_tools.iter().any(|t| t == tool_name)
    }
}

/// Gates by role and bounds process-wide execution concurrency.
pub struct SafetyPolicy {
    allowed_roles:             Vec<String>,
    max_concurrent_executions: usize,
    concurrent:                AtomicU32,
}

impl SafetyPolicy {
    pub fn new(allowed_roles: Vec<String>, max_concurrent_executions: usize) -> Self {
        Self { allowed_roles, max_concurrent_executions, concurrent: AtomicU32::new(0) }
    }

    pub fn evaluate(&self, agent_role: &str) -> Option<PolicyDecision> {
        if !self.allowed_roles.is_empty() && !self.allowed_roles.iter().any(|r| r == agent_role) {
            return Some(PolicyDecision::DeniedByRole(format!("role '{}' is not in allowed_roles", agent_role)));
        }
        if self.concurrent.load(Ordering::SeqCst) as usize >= self.max_concurrent_executions {
            return Some(PolicyDecision::DeniedByLimit(format!(
                "max_concurrent_executions ({}) reached", self.max_concurrent_executions,
            )));
        }
        None
    }

    pub fn begin_execution(&self) {
        self.concurrent.fetch_add(1, Ordering::SeqCst);
    }

    pub fn end_execution(&self) {
        self.concurrent.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| Some(c.saturating_sub(1))).ok();
    }
}

/// Aggregates the three sub-policies behind a single entry point for
/// the `policy_validation` node.
pub struct PolicyEngine {
    pub tool:     ToolPolicy,
    pub approval: ApprovalPolicy,
    pub safety:   SafetyPolicy,
}

impl PolicyEngine {
    pub fn new(tool: ToolPolicy, approval: ApprovalPolicy, safety: SafetyPolicy) -> Self {
        Self { tool, approval, safety }
    }

    pub fn from_config(config: &AgentRoleConfig, runtime: &crate::config::RuntimeConfig) -> Self {
        Self {
            tool:     ToolPolicy::from_config(config),
            approval: ApprovalPolicy::from_config(config, runtime.approval_timeout()),
            safety:   SafetyPolicy::new(runtime.allowed_roles.clone(), runtime.max_concurrent_executions),
        }
    }

    /// Full validation for `policy_validation`: safety first (role/
    /// concurrency), then tool policy against the catalog-known action.
    pub fn validate(&self, proposal: &ActionProposal, context: &ExecutionContext, catalog: &ToolCatalog) -> PolicyDecision {
        if let Some(denied) = self.safety.evaluate(&context.agent_role) {
            return denied;
        }

        if !catalog.is_empty() && !catalog.contains(&proposal.action) {
            return PolicyDecision::DeniedByToolPolicy(format!(
                "'{}' is not present in the discovered tool catalog", proposal.action,
            ));
        }

        if let Some(denied) = self.tool.evaluate(&proposal.action) {
            return denied;
        }

        PolicyDecision::Allowed
    }

    pub fn requires_approval(&self, tool_name: &str) -> bool {
        self.approval.requires_approval(tool_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_with(names: &[&str]) -> ToolCatalog {
        ToolCatalog::new(names.iter().map(|n| crate::types::ToolDescriptor {
            name: n.to_string(), description: String::new(), server: "t".to_string(),
            parameters: serde_json::json!({}), returns: None, tags: vec![],
        }).collect())
    }

    fn proposal(action: &str) -> ActionProposal {
        ActionProposal { action: action.to_string(), parameters: Default::default(), reason: "t".to_string(), expected_result: None, usage: None }
    }

    #[test]
    fn denies_unknown_action_against_nonempty_catalog() {
        let config = AgentRoleConfig::default();
        let runtime = crate::config::RuntimeConfig::default();
        let engine = PolicyEngine::from_config(&config, &runtime);
        let ctx = ExecutionContext::new("t", "role", "u");

        let decision = engine.validate(&proposal("ghost_tool"), &ctx, &catalog_with(&["real_tool"]));
        assert_eq!(decision, PolicyDecision::DeniedByToolPolicy(
            "'ghost_tool' is not present in the discovered tool catalog".to_string()));
    }

    #[test]
    fn read_only_denies_write_heuristic_match() {
        let mut config = AgentRoleConfig::default();
        config.read_only = true;
        let runtime = crate::config::RuntimeConfig::default();
        let engine = PolicyEngine::from_config(&config, &runtime);
        let ctx = ExecutionContext::new("t", "role", "u");

        let decision = engine.validate(&proposal("delete_record"), &ctx, &catalog_with(&["delete_record"]));
        assert!(matches!(decision, PolicyDecision::DeniedByToolPolicy(_)));
    }

    #[test]
    fn max_executions_limit_is_enforced() {
        let mut config = AgentRoleConfig::default();
        config.max_executions = Some(1);
        let runtime = crate::config::RuntimeConfig::default();
        let engine = PolicyEngine::from_config(&config, &runtime);
        let ctx = ExecutionContext::new("t", "role", "u");
        let catalog = catalog_with(&["limited_tool"]);

        assert_eq!(engine.validate(&proposal("limited_tool"), &ctx, &catalog), PolicyDecision::Allowed);
        engine.tool.record_execution("limited_tool");
        assert!(matches!(engine.validate(&proposal("limited_tool"), &ctx, &catalog), PolicyDecision::DeniedByLimit(_)));
    }

    #[test]
    fn safety_policy_denies_unlisted_role() {
        let safety = SafetyPolicy::new(vec!["approved_role".to_string()], 10);
        assert!(safety.evaluate("rogue_role").is_some());
        assert!(safety.evaluate("approved_role").is_none());
    }

    #[test]
    fn approval_required_for_high_risk_tool() {
        let mut config = AgentRoleConfig::default();
        config.high_risk_tools = vec!["deploy_prod".to_string()];
        let policy = ApprovalPolicy::from_config(&config, std::time::Duration::from_secs(60));
        assert!(policy.requires_approval("deploy_prod"));
        assert!(!policy.requires_approval("read_file"));
    }
}
