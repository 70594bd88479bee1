pub mod agent_cache;
pub mod approval;
pub mod budget;
pub mod capability;
pub mod catalog;
pub mod checking_point;
pub mod checking_points;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod executor;
pub mod llm;
pub mod mcp;
pub mod orchestrator;
pub mod policy;
pub mod scheduler;
pub mod state_store;
pub mod types;

// Convenience re-exports at crate root
pub use approval::{ApprovalManager, ApprovalRequest, ApprovalStatus};
pub use capability::CapabilityRegistry;
pub use checking_point::{CheckingPoint, CheckingPointRegistry};
pub use error::OrchestratorError;
pub use orchestrator::Orchestrator;
pub use scheduler::Scheduler;
pub use types::{ExecutionContext, WorkflowState, WorkflowStateName};
