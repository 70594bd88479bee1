mod nodes;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::agent_cache::AgentCache;
use crate::approval::ApprovalManager;
use crate::capability::CapabilityRegistry;
use crate::catalog::ToolCatalogClient;
use crate::config::RuntimeConfig;
use crate::error::OrchestratorError;
use crate::executor::WorkflowExecutor;
use crate::llm::ModelBackendClient;
use crate::policy::PolicyEngine;
use crate::state_store::WorkflowStateStore;
use crate::types::{ExecutionContext, WorkflowState, WorkflowStateName};

/// Which node the router sends control to next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    AgentDecision,
    PolicyValidation,
    ApprovalCheck,
    ApprovalWorkflow,
    ResultProcessing,
    CompletionCheck,
    ApprovalResolution,
    ErrorHandler,
}

/// Where the router sends control after a node finishes.
enum RouteDecision {
    /// Call this node next, then re-route from its resulting status.
    Continue(NodeKind),
    /// Install this status directly, no node call — used for the single
    /// `APPROVAL_RESOLVED → END(SUCCEEDED)` edge, which names no node.
    Finalize(WorkflowStateName),
    /// The state is already terminal; nothing left to do.
    Done,
}

fn route(status: WorkflowStateName) -> RouteDecision {
    use WorkflowStateName::*;
    match status {
        CapabilityDiscoveryComplete => RouteDecision::Continue(NodeKind::AgentDecision),
        ProposalObtained            => RouteDecision::Continue(NodeKind::PolicyValidation),
        PolicyApproved               => RouteDecision::Continue(NodeKind::ApprovalCheck),
        PolicyRejected               => RouteDecision::Continue(NodeKind::ErrorHandler),
        ApprovalSkipped              => RouteDecision::Continue(NodeKind::ResultProcessing),
        AwaitingApproval             => RouteDecision::Continue(NodeKind::ApprovalWorkflow),
        ApprovalRejected             => RouteDecision::Continue(NodeKind::ErrorHandler),
        ApprovalComplete             => RouteDecision::Continue(NodeKind::ResultProcessing),
        ResultsProcessed             => RouteDecision::Continue(NodeKind::CompletionCheck),
        ExecutionFailed              => RouteDecision::Continue(NodeKind::CompletionCheck),
        TaskComplete                 => RouteDecision::Continue(NodeKind::ApprovalResolution),
        TaskIncomplete               => RouteDecision::Continue(NodeKind::ApprovalResolution),
        ApprovalResolved             => RouteDecision::Finalize(Succeeded),
        Succeeded | Failed | Rejected | Cancelled => RouteDecision::Done,
    }
}

/// Wires L1-L3/C1-C4/E1 together and drives the nine-node graph described
/// in §4.1. Holds no per-run state of its own — all of it lives in
/// `state_store`, so the orchestrator itself is cheap to share via `Arc`.
pub struct Orchestrator {
    capability_registry: Arc<CapabilityRegistry>,
    model_backend:       Arc<dyn ModelBackendClient>,
    tool_catalog_client: Arc<dyn ToolCatalogClient>,
    approval_manager:    Arc<ApprovalManager>,
    state_store:         Arc<WorkflowStateStore>,
    executor:            Arc<WorkflowExecutor>,
    agent_cache:         Arc<AgentCache>,
    runtime_config:      Arc<RuntimeConfig>,
    policy_engines:      RwLock<HashMap<String, Arc<PolicyEngine>>>,
}

impl Orchestrator {
    pub fn new(
        capability_registry: Arc<CapabilityRegistry>,
        model_backend: Arc<dyn ModelBackendClient>,
        tool_catalog_client: Arc<dyn ToolCatalogClient>,
        runtime_config: Arc<RuntimeConfig>,
    ) -> Self {
        Self {
            capability_registry,
            model_backend,
            tool_catalog_client,
            approval_manager: Arc::new(ApprovalManager::new()),
            state_store: Arc::new(WorkflowStateStore::new()),
            executor: Arc::new(WorkflowExecutor::new(
                runtime_config.max_retries,
                runtime_config.retry_delay(),
                runtime_config.overall_timeout(),
            )),
            agent_cache: Arc::new(AgentCache::new()),
            runtime_config,
            policy_engines: RwLock::new(HashMap::new()),
        }
    }

    /// Lazily builds (and memoizes) the per-role Policy Engine. Counters
    /// inside `ToolPolicy` are process-local per role, so the same engine
    /// must be reused across runs for `max_executions` to mean anything.
    fn policy_for_role(&self, agent_role: &str) -> Arc<PolicyEngine> {
        if let Some(engine) = self.policy_engines.read().unwrap().get(agent_role) {
            return Arc::clone(engine);
        }
        let role_config = self.runtime_config.role(agent_role);
        let engine = Arc::new(PolicyEngine::from_config(&role_config, &self.runtime_config));
        self.policy_engines.write().unwrap().insert(agent_role.to_string(), Arc::clone(&engine));
        engine
    }

    /// Creates a new run, executes `capability_discovery`, then drives the
    /// graph until a terminal state or `AWAITING_APPROVAL`.
    pub async fn run(&self, context: ExecutionContext) -> WorkflowState {
        let run_id = uuid::Uuid::new_v4().to_string();
        let state = WorkflowState::new(&run_id, context);
        self.state_store.put(state.clone());

        let state = nodes::capability_discovery(self, state).await;
        let state = self.state_store.update(&run_id, |_| state).expect("just-created run must exist");

        self.drive(run_id).await.unwrap_or(state)
    }

    pub async fn approve(&self, approval_id: &str, approver: &str, reason: &str) -> Result<WorkflowState, OrchestratorError> {
        let request = self.approval_manager.get(approval_id)
            .ok_or_else(|| OrchestratorError::UnknownApproval(approval_id.to_string()))?;
        self.approval_manager.approve(approval_id, approver, reason);
        self.drive(request.run_id).await
    }

    pub async fn reject(&self, approval_id: &str, approver: &str, reason: &str) -> Result<WorkflowState, OrchestratorError> {
        let request = self.approval_manager.get(approval_id)
            .ok_or_else(|| OrchestratorError::UnknownApproval(approval_id.to_string()))?;
        self.approval_manager.reject(approval_id, approver, reason);
        self.drive(request.run_id).await
    }

    /// Cancels pending approvals for the run and forces it terminal.
    /// No-op on an already-terminal run, per §4.1's numeric policy.
    pub async fn cancel(&self, run_id: &str, reason: &str) -> Result<WorkflowState, OrchestratorError> {
        let current = self.state_store.get(run_id).ok_or_else(|| OrchestratorError::UnknownRun(run_id.to_string()))?;
        if current.is_terminal() {
            return Ok(current);
        }

        self.approval_manager.cancel_run(run_id);
        self.state_store.update(run_id, |mut state| {
            state.status = crate::types::WorkflowStatus::with_error(
                WorkflowStateName::Cancelled, "run cancelled", reason.to_string(),
            );
            state.updated_at = chrono::Utc::now();
            state
        })
    }

    pub fn status(&self, run_id: &str) -> Option<WorkflowState> {
        self.state_store.get(run_id)
    }

    /// Runs the router loop: call the node the current status routes to,
    /// install the result, repeat until terminal or suspended.
    async fn drive(&self, run_id: String) -> Result<WorkflowState, OrchestratorError> {
        loop {
            let state = self.state_store.get(&run_id).ok_or_else(|| OrchestratorError::UnknownRun(run_id.clone()))?;

            match route(state.status.state) {
                RouteDecision::Done => return Ok(state),
                RouteDecision::Finalize(terminal) => {
                    return self.state_store.update(&run_id, |mut s| {
                        s.status = crate::types::WorkflowStatus::new(terminal, "run succeeded");
                        s.updated_at = chrono::Utc::now();
                        s
                    });
                }
                RouteDecision::Continue(kind) => {
                    let next = match kind {
                        NodeKind::AgentDecision      => nodes::agent_decision(self, state).await,
                        NodeKind::PolicyValidation   => nodes::policy_validation(self, state).await,
                        NodeKind::ApprovalCheck      => nodes::approval_check(self, state).await,
                        NodeKind::ApprovalWorkflow   => nodes::approval_workflow(self, state).await,
                        NodeKind::ResultProcessing   => nodes::result_processing(self, state).await,
                        NodeKind::CompletionCheck    => nodes::completion_check(self, state).await,
                        NodeKind::ApprovalResolution => nodes::approval_resolution(self, state).await,
                        NodeKind::ErrorHandler       => nodes::error_handler(self, state).await,
                    };

                    // approval_workflow is the only node that can return
                    // control unchanged (still AWAITING_APPROVAL) — that's
                    // the suspension point, not a routing bug.
                    let still_suspended = kind == NodeKind::ApprovalWorkflow
                        && next.status.state == WorkflowStateName::AwaitingApproval;

                    let stored = self.state_store.update(&run_id, |_| next)?;
                    if still_suspended {
                        return Ok(stored);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticToolCatalogClient;
    use crate::llm::MockModelBackend;
    use crate::types::{ActionProposal, ToolDescriptor};

    fn descriptor(name: &str) -> ToolDescriptor {
        ToolDescriptor { name: name.to_string(), description: String::new(), server: "t".to_string(), parameters: serde_json::json!({}), returns: None, tags: vec![] }
    }

    fn proposal(action: &str) -> ActionProposal {
        ActionProposal { action: action.to_string(), parameters: Default::default(), reason: "because".to_string(), expected_result: None, usage: None }
    }

    fn make_orchestrator(backend: MockModelBackend, catalog: StaticToolCatalogClient) -> Orchestrator {
        let catalog = Arc::new(catalog);
        Orchestrator::new(
            Arc::new(CapabilityRegistry::new(catalog.clone())),
            Arc::new(backend),
            catalog,
            Arc::new(RuntimeConfig::default()),
        )
    }

    #[tokio::test]
    async fn run_without_approval_reaches_succeeded() {
        let catalog = StaticToolCatalogClient::new().register(descriptor("read_file"), |_| Ok(serde_json::json!({"ok": true})));
        let backend = MockModelBackend::new(vec![Ok(proposal("read_file"))]);
        let orchestrator = make_orchestrator(backend, catalog);

        let state = orchestrator.run(ExecutionContext::new("read a file", "reader", "user-1")).await;
        assert_eq!(state.status.state, WorkflowStateName::Succeeded);
        assert!(state.last_execution().unwrap().outcome.ok);
    }

    #[tokio::test]
    async fn run_suspends_when_approval_required_then_resumes() {
        let catalog = StaticToolCatalogClient::new().register(descriptor("deploy_prod"), |_| Ok(serde_json::json!({"deployed": true})));
        let backend = MockModelBackend::new(vec![Ok(proposal("deploy_prod"))]);

        let mut role_config = crate::config::AgentRoleConfig::default();
        role_config.high_risk_tools = vec!["deploy_prod".to_string()];
        let mut runtime = RuntimeConfig::default();
        runtime.roles.insert("deployer".to_string(), role_config);

        let catalog = Arc::new(catalog);
        let orchestrator = Orchestrator::new(
            Arc::new(CapabilityRegistry::new(catalog.clone())),
            Arc::new(backend),
            catalog,
            Arc::new(runtime),
        );

        let state = orchestrator.run(ExecutionContext::new("deploy it", "deployer", "user-1")).await;
        assert_eq!(state.status.state, WorkflowStateName::AwaitingApproval);
        assert_eq!(state.approvals.len(), 1);

        let resolved = orchestrator.approve(&state.approvals[0], "ops-lead", "looks good").await.unwrap();
        assert_eq!(resolved.status.state, WorkflowStateName::Succeeded);
    }

    #[tokio::test]
    async fn policy_rejection_routes_to_failed() {
        let catalog = StaticToolCatalogClient::new();
        let backend = MockModelBackend::new(vec![Ok(proposal("ghost_tool"))]);
        let orchestrator = make_orchestrator(backend, catalog);

        let state = orchestrator.run(ExecutionContext::new("do something", "role", "user-1")).await;
        assert_eq!(state.status.state, WorkflowStateName::Failed);
    }

    #[tokio::test]
    async fn rejected_approval_routes_to_rejected_terminal() {
        let catalog = StaticToolCatalogClient::new().register(descriptor("deploy_prod"), |_| Ok(serde_json::json!({})));
        let backend = MockModelBackend::new(vec![Ok(proposal("deploy_prod"))]);

        let mut role_config = crate::config::AgentRoleConfig::default();
        role_config.require_approval_for_all = true;
        let mut runtime = RuntimeConfig::default();
        runtime.roles.insert("deployer".to_string(), role_config);

        let catalog = Arc::new(catalog);
        let orchestrator = Orchestrator::new(
            Arc::new(CapabilityRegistry::new(catalog.clone())),
            Arc::new(backend),
            catalog,
            Arc::new(runtime),
        );

        let state = orchestrator.run(ExecutionContext::new("deploy it", "deployer", "user-1")).await;
        let approval_id = state.approvals[0].clone();

        let resolved = orchestrator.reject(&approval_id, "ops-lead", "too risky").await.unwrap();
        assert_eq!(resolved.status.state, WorkflowStateName::Rejected);
    }

    #[tokio::test]
    async fn cancel_is_idempotent_on_terminal_run() {
        let catalog = StaticToolCatalogClient::new().register(descriptor("read_file"), |_| Ok(serde_json::json!({"ok": true})));
        let backend = MockModelBackend::new(vec![Ok(proposal("read_file"))]);
        let orchestrator = make_orchestrator(backend, catalog);

        let state = orchestrator.run(ExecutionContext::new("read a file", "reader", "user-1")).await;
        assert_eq!(state.status.state, WorkflowStateName::Succeeded);

        let cancelled = orchestrator.cancel(&state.run_id, "too late").await.unwrap();
        assert_eq!(cancelled.status.state, WorkflowStateName::Succeeded);
    }
}
