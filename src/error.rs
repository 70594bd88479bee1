use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("capability discovery failed: {0}")]
    CapabilityDiscoveryFailed(String),

    #[error("model backend returned an unparseable proposal: {0}")]
    ProposalParseError(String),

    #[error("policy rejected the proposal ({kind}): {reason}")]
    PolicyRejected { kind: &'static str, reason: String },

    #[error("approval rejected for run {run_id}: {reason}")]
    ApprovalRejected { run_id: String, reason: String },

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("unknown run: {0}")]
    UnknownRun(String),

    #[error("unknown approval: {0}")]
    UnknownApproval(String),

    #[error("approval {0} is not pending")]
    ApprovalNotPending(String),

    #[error("model backend error: {0}")]
    ModelBackendError(String),

    #[error("tool catalog error: {0}")]
    CatalogError(String),

    #[error("checkpoint store error: {0}")]
    CheckpointError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl OrchestratorError {
    /// Error-kind tag used in §7's propagation contract — preserved as a
    /// stable string so callers can match on it without downcasting.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CapabilityDiscoveryFailed(_) => "CAPABILITY_DISCOVERY_FAILED",
            Self::ProposalParseError(_)        => "PROPOSAL_PARSE_ERROR",
            Self::PolicyRejected { .. }        => "POLICY_REJECTED",
            Self::ApprovalRejected { .. }      => "APPROVAL_REJECTED",
            Self::ExecutionFailed(_)           => "EXECUTION_FAILED",
            Self::UnknownRun(_)                => "UNKNOWN_RUN",
            Self::UnknownApproval(_)           => "UNKNOWN_APPROVAL",
            Self::ApprovalNotPending(_)        => "APPROVAL_NOT_PENDING",
            Self::ModelBackendError(_)         => "MODEL_BACKEND_ERROR",
            Self::CatalogError(_)              => "CATALOG_ERROR",
            Self::CheckpointError(_)           => "CHECKPOINT_ERROR",
            Self::ConfigError(_)               => "CONFIG_ERROR",
            Self::InternalError(_)             => "INTERNAL_ERROR",
        }
    }
}
