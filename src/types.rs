use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Arbitrary keyed payload carried across the orchestrator boundary —
/// tool parameters, context metadata, prompt variables, extracted facts.
pub type Payload = HashMap<String, serde_json::Value>;

/// Immutable description of a unit of work handed to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub task_description: String,
    pub agent_role:        String,
    pub user_id:           String,
    pub metadata:          Payload,
}

impl ExecutionContext {
    pub fn new(
        task_description: impl Into<String>,
        agent_role:        impl Into<String>,
        user_id:           impl Into<String>,
    ) -> Self {
        Self {
            task_description: task_description.into(),
            agent_role:        agent_role.into(),
            user_id:           user_id.into(),
            metadata:          Payload::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Payload) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A structured action proposed by the model backend for a given context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionProposal {
    pub action:          String,
    pub parameters:      Payload,
    pub reason:          String,
    pub expected_result: Option<String>,
    pub usage:           Option<crate::budget::TokenUsage>,
}

/// A single entry in the tool catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name:        String,
    pub description: String,
    pub server:       String,
    pub parameters:  serde_json::Value,
    pub returns:      Option<serde_json::Value>,
    pub tags:         Vec<String>,
}

/// The catalog of tools currently available to an agent role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolCatalog {
    tools: Vec<ToolDescriptor>,
}

impl ToolCatalog {
    pub fn new(tools: Vec<ToolDescriptor>) -> Self {
        Self { tools }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

/// The outcome of handing a proposal to the tool catalog client for execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub ok:   bool,
    pub data:  Option<serde_json::Value>,
    pub error: Option<String>,
}

/// Named states a workflow run can be in. Distinct from the teacher's
/// open-ended `State(String)` — the orchestrator's graph is fixed, so a
/// closed enum lets routing be a plain `match`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowStateName {
    CapabilityDiscoveryComplete,
    ProposalObtained,
    PolicyApproved,
    PolicyRejected,
    ApprovalSkipped,
    AwaitingApproval,
    ApprovalRejected,
    ApprovalComplete,
    ResultsProcessed,
    ExecutionFailed,
    TaskComplete,
    TaskIncomplete,
    ApprovalResolved,
    Succeeded,
    Failed,
    Rejected,
    Cancelled,
}

impl WorkflowStateName {
    /// Terminal states end the run: no further node may run against it.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Rejected | Self::Cancelled)
    }
}

impl std::fmt::Display for WorkflowStateName {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStatus {
    pub state:   WorkflowStateName,
    pub message: String,
    pub error:   Option<String>,
}

impl WorkflowStatus {
    pub fn new(state: WorkflowStateName, message: impl Into<String>) -> Self {
        Self { state, message: message.into(), error: None }
    }

    pub fn with_error(state: WorkflowStateName, message: impl Into<String>, error: impl Into<String>) -> Self {
        Self { state, message: message.into(), error: Some(error.into()) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub timestamp: DateTime<Utc>,
    pub proposal:  ActionProposal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub timestamp: DateTime<Utc>,
    pub action:    String,
    pub outcome:   ExecutionOutcome,
}

/// Reference to an approval owned by the run it was created for. The
/// workflow state holds only the id — the Approval Manager is the sole
/// owner of the full `ApprovalRequest` value.
pub type ApprovalRef = String;

/// The single coherent state object threaded through the nine-node graph.
///
/// Updates are always functional: a node receives a value, never a
/// mutable reference into the store, and returns a successor that the
/// store installs atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub run_id: String,
    pub status: WorkflowStatus,
    pub context: ExecutionContext,
    pub current_proposal: Option<ActionProposal>,
    pub available_capabilities: Option<ToolCatalog>,
    pub decisions:  Vec<DecisionRecord>,
    pub executions: Vec<ExecutionRecord>,
    pub approvals:  Vec<ApprovalRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowState {
    pub fn new(run_id: impl Into<String>, context: ExecutionContext) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.into(),
            status: WorkflowStatus::new(WorkflowStateName::CapabilityDiscoveryComplete, "created"),
            context,
            current_proposal: None,
            available_capabilities: None,
            decisions:  Vec::new(),
            executions: Vec::new(),
            approvals:  Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.state.is_terminal()
    }

    pub fn last_execution(&self) -> Option<&ExecutionRecord> {
        self.executions.last()
    }
}
