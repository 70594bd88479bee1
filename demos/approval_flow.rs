//! Demonstrates a run that hits a high-risk tool, suspends at
//! AWAITING_APPROVAL, and resumes to SUCCEEDED once a human approves it.
//!
//! ```bash
//! cargo run --example approval_flow
//! ```

use agentsm::capability::CapabilityRegistry;
use agentsm::catalog::StaticToolCatalogClient;
use agentsm::config::{AgentRoleConfig, RuntimeConfig};
use agentsm::llm::MockModelBackend;
use agentsm::orchestrator::Orchestrator;
use agentsm::types::{ActionProposal, ExecutionContext, ToolDescriptor};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let catalog = StaticToolCatalogClient::new().register(
        ToolDescriptor {
            name: "deploy_prod".to_string(),
            description: "Deploy the current build to production".to_string(),
            server: "demo".to_string(),
            parameters: serde_json::json!({}),
            returns: None,
            tags: vec!["high-risk".to_string()],
        },
        |_args| Ok(serde_json::json!({"deployed": true})),
    );
    let catalog = Arc::new(catalog);

    let backend = MockModelBackend::new(vec![Ok(ActionProposal {
        action: "deploy_prod".to_string(),
        parameters: Default::default(),
        reason: "tests are green, shipping the release".to_string(),
        expected_result: None,
        usage: None,
    })]);

    let mut role_config = AgentRoleConfig::default();
    role_config.high_risk_tools = vec!["deploy_prod".to_string()];
    let mut runtime_config = RuntimeConfig::default();
    runtime_config.roles.insert("deployer".to_string(), role_config);

    let orchestrator = Orchestrator::new(
        Arc::new(CapabilityRegistry::new(catalog.clone())),
        Arc::new(backend),
        catalog,
        Arc::new(runtime_config),
    );

    let state = orchestrator
        .run(ExecutionContext::new("Deploy the latest build", "deployer", "demo-user"))
        .await;
    println!("after run: {:?} (approvals: {:?})", state.status.state, state.approvals);

    let approval_id = state.approvals.first().expect("deploy_prod is high-risk, an approval must be pending").clone();
    let resolved = orchestrator.approve(&approval_id, "ops-lead", "looks good, ship it").await?;
    println!("after approve: {:?}", resolved.status.state);

    Ok(())
}
