use crate::error::OrchestratorError;
use crate::policy::PolicyDecision;
use crate::types::{
    DecisionRecord, ExecutionOutcome, ExecutionRecord, WorkflowState, WorkflowStateName,
    WorkflowStatus,
};

use super::Orchestrator;

fn touch(mut state: WorkflowState) -> WorkflowState {
    state.updated_at = chrono::Utc::now();
    state
}

/// Discovers the role-filtered tool catalog and writes it onto the state.
/// Grounded on §4.1's `capability_discovery` contract: an empty catalog is
/// a legitimate outcome, only a hard client error fails the node.
pub async fn capability_discovery(orchestrator: &Orchestrator, mut state: WorkflowState) -> WorkflowState {
    match orchestrator.capability_registry.discover().await {
        Ok(_) => {
            state = orchestrator.capability_registry.update_workflow_state(state).await;
            state.status = WorkflowStatus::new(WorkflowStateName::CapabilityDiscoveryComplete, "capability discovery complete");
            touch(state)
        }
        Err(e) => {
            state.status = WorkflowStatus::with_error(WorkflowStateName::Failed, "capability discovery failed", e.to_string());
            touch(state)
        }
    }
}

/// Obtains (or lazily builds) the role's agent handle and asks the model
/// backend for a structured proposal.
pub async fn agent_decision(orchestrator: &Orchestrator, mut state: WorkflowState) -> WorkflowState {
    let role_config = orchestrator.runtime_config.role(&state.context.agent_role);
    let handle = orchestrator.agent_cache.get_or_build(&state.context.agent_role, &role_config);
    let catalog = state.available_capabilities.clone().unwrap_or_default();

    let result = orchestrator.model_backend.propose(
        &handle.agent_role,
        &handle.config.prompt_template_id,
        &state.context,
        &catalog,
        &handle.config.model,
    ).await;

    match result {
        Ok(proposal) => {
            state.decisions.push(DecisionRecord { timestamp: chrono::Utc::now(), proposal: proposal.clone() });
            state.current_proposal = Some(proposal);
            state.status = WorkflowStatus::new(WorkflowStateName::ProposalObtained, "proposal obtained from model backend");
            touch(state)
        }
        Err(e) => {
            state.status = WorkflowStatus::with_error(
                WorkflowStateName::Failed,
                "model backend failed to produce a proposal",
                OrchestratorError::ProposalParseError(e).to_string(),
            );
            touch(state)
        }
    }
}

/// Validates the current proposal against the Policy Engine for the role.
pub async fn policy_validation(orchestrator: &Orchestrator, mut state: WorkflowState) -> WorkflowState {
    let Some(proposal) = state.current_proposal.clone() else {
        state.status = WorkflowStatus::with_error(WorkflowStateName::Failed, "policy validation attempted with no proposal", "missing current_proposal");
        return touch(state);
    };
    let catalog = state.available_capabilities.clone().unwrap_or_default();
    let policy = orchestrator.policy_for_role(&state.context.agent_role);

    match policy.validate(&proposal, &state.context, &catalog) {
        PolicyDecision::Allowed => {
            policy.tool.record_execution(&proposal.action);
            state.status = WorkflowStatus::new(WorkflowStateName::PolicyApproved, "policy approved the proposal");
        }
        denial => {
            let reason = describe_denial(&denial);
            state.status = WorkflowStatus::with_error(WorkflowStateName::PolicyRejected, "policy rejected the proposal", reason);
        }
    }
    touch(state)
}

fn describe_denial(decision: &PolicyDecision) -> String {
    match decision {
        PolicyDecision::Allowed => unreachable!("describe_denial called on an allowed decision"),
        PolicyDecision::DeniedByToolPolicy(r) => format!("DENIED_BY_TOOL_POLICY: {}", r),
        PolicyDecision::DeniedByRole(r) => format!("DENIED_BY_ROLE: {}", r),
        PolicyDecision::DeniedByLimit(r) => format!("DENIED_BY_LIMIT: {}", r),
        PolicyDecision::DeniedBySafety(r) => format!("DENIED_BY_SAFETY: {}", r),
    }
}

/// Decides whether the proposed action requires a human approval gate.
pub async fn approval_check(orchestrator: &Orchestrator, mut state: WorkflowState) -> WorkflowState {
    let Some(proposal) = state.current_proposal.clone() else {
        state.status = WorkflowStatus::with_error(WorkflowStateName::Failed, "approval check attempted with no proposal", "missing current_proposal");
        return touch(state);
    };
    let policy = orchestrator.policy_for_role(&state.context.agent_role);

    if policy.requires_approval(&proposal.action) {
        let Some(tool) = state.available_capabilities.as_ref().and_then(|c| c.get(&proposal.action).cloned())
            .or_else(|| Some(crate::types::ToolDescriptor {
                name: proposal.action.clone(), description: String::new(), server: "unknown".to_string(),
                parameters: serde_json::json!({}), returns: None, tags: vec![],
            }))
        else { unreachable!() };

        let request = orchestrator.approval_manager.create(
            state.run_id.clone(), tool, state.context.clone(), orchestrator.runtime_config.approval_timeout(),
        );
        state.approvals.push(request.approval_id);
        state.status = WorkflowStatus::new(WorkflowStateName::AwaitingApproval, "awaiting human approval");
    } else {
        state.status = WorkflowStatus::new(WorkflowStateName::ApprovalSkipped, "no approval required for this action");
    }
    touch(state)
}

/// The suspension point. Only ever advances the graph once every
/// approval attached to the run has left the PENDING state.
pub async fn approval_workflow(orchestrator: &Orchestrator, mut state: WorkflowState) -> WorkflowState {
    let requests: Vec<_> = state.approvals.iter()
        .filter_map(|id| orchestrator.approval_manager.get(id))
        .collect();

    if requests.iter().any(|r| r.status == crate::approval::ApprovalStatus::Pending) {
        state.status = WorkflowStatus::new(WorkflowStateName::AwaitingApproval, "awaiting human approval");
        return touch(state);
    }

    let rejected = requests.iter().find(|r| matches!(
        r.status, crate::approval::ApprovalStatus::Rejected | crate::approval::ApprovalStatus::Expired
    ));

    if let Some(r) = rejected {
        let reason = r.resolution_reason.clone().unwrap_or_else(|| "rejected".to_string());
        state.status = WorkflowStatus::with_error(WorkflowStateName::ApprovalRejected, "approval was rejected", reason);
    } else {
        state.status = WorkflowStatus::new(WorkflowStateName::ApprovalComplete, "all approvals resolved");
    }
    touch(state)
}

/// Executes the proposed action against the tool catalog client under a
/// per-action timeout, recording the outcome regardless of success.
pub async fn result_processing(orchestrator: &Orchestrator, mut state: WorkflowState) -> WorkflowState {
    let Some(proposal) = state.current_proposal.clone() else {
        state.status = WorkflowStatus::with_error(WorkflowStateName::Failed, "result processing attempted with no proposal", "missing current_proposal");
        return touch(state);
    };

    let client = orchestrator.tool_catalog_client.clone();
    let action = proposal.action.clone();
    let parameters = proposal.parameters.clone();

    // Guaranteed-release discipline per §4.3/§5: every `begin_execution` on
    // entry is matched by exactly one `end_execution` on exit, regardless of
    // the tool's outcome (success, error, or timeout).
    let policy = orchestrator.policy_for_role(&state.context.agent_role);
    policy.safety.begin_execution();

    let step = orchestrator.executor.execute_capability(
        action.clone(),
        Some(orchestrator.runtime_config.tool_timeout()),
        async move {
            client.execute_tool(&action, &parameters).await.map_err(|e| e.to_string())
        },
    ).await;

    policy.safety.end_execution();

    let outcome = match step.result {
        Some(outcome) => outcome,
        None => ExecutionOutcome { ok: false, data: None, error: step.error.clone() },
    };

    let failed = !outcome.ok;
    state.executions.push(ExecutionRecord { timestamp: chrono::Utc::now(), action: proposal.action.clone(), outcome });

    state.status = if failed {
        WorkflowStatus::with_error(WorkflowStateName::ExecutionFailed, "tool execution failed", step.error.unwrap_or_default())
    } else {
        WorkflowStatus::new(WorkflowStateName::ResultsProcessed, "tool execution completed")
    };
    touch(state)
}

/// Decides whether the run's work is complete based on the latest
/// execution record; always advances toward `approval_resolution`.
pub async fn completion_check(_orchestrator: &Orchestrator, mut state: WorkflowState) -> WorkflowState {
    let completed = state.last_execution().map(|e| e.outcome.ok).unwrap_or(false);
    state.status = if completed {
        WorkflowStatus::new(WorkflowStateName::TaskComplete, "task completed successfully")
    } else {
        WorkflowStatus::new(WorkflowStateName::TaskIncomplete, "task did not complete successfully")
    };
    touch(state)
}

/// Aggregates the run's approvals one last time; any rejection fails the
/// run, otherwise the run is ready to finalize as succeeded.
pub async fn approval_resolution(orchestrator: &Orchestrator, mut state: WorkflowState) -> WorkflowState {
    let stats = orchestrator.approval_manager.stats(&state.run_id);
    if stats.rejected > 0 || stats.expired > 0 {
        state.status = WorkflowStatus::with_error(
            WorkflowStateName::ApprovalRejected, "one or more approvals were rejected",
            format!("rejected={} expired={}", stats.rejected, stats.expired),
        );
    } else {
        state.status = WorkflowStatus::new(WorkflowStateName::ApprovalResolved, "approvals resolved, run succeeded");
    }
    touch(state)
}

/// Sink node: folds the triggering cause into a terminal FAILED/REJECTED
/// status and appends a final error-execution record.
pub async fn error_handler(_orchestrator: &Orchestrator, mut state: WorkflowState) -> WorkflowState {
    let cause = state.status.clone();
    let terminal = match cause.state {
        WorkflowStateName::ApprovalRejected => WorkflowStateName::Rejected,
        _ => WorkflowStateName::Failed,
    };

    state.executions.push(ExecutionRecord {
        timestamp: chrono::Utc::now(),
        action: "error_handler".to_string(),
        outcome: ExecutionOutcome { ok: false, data: None, error: cause.error.clone().or_else(|| Some(cause.message.clone())) },
    });

    state.status = WorkflowStatus::with_error(
        terminal, cause.message.clone(), cause.error.unwrap_or_else(|| cause.message.clone()),
    );
    touch(state)
}
