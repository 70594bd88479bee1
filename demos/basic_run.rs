//! Minimal single-run demo: a mock model backend proposes one tool call,
//! policy allows it with no approval gate, the run reaches SUCCEEDED.
//!
//! ```bash
//! cargo run --example basic_run
//! ```

use agentsm::capability::CapabilityRegistry;
use agentsm::catalog::StaticToolCatalogClient;
use agentsm::config::RuntimeConfig;
use agentsm::llm::MockModelBackend;
use agentsm::orchestrator::Orchestrator;
use agentsm::types::{ActionProposal, ExecutionContext};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let catalog = StaticToolCatalogClient::new().register(
        agentsm::types::ToolDescriptor {
            name: "search_docs".to_string(),
            description: "Search internal documentation".to_string(),
            server: "demo".to_string(),
            parameters: serde_json::json!({"type": "object", "properties": {"query": {"type": "string"}}}),
            returns: None,
            tags: vec![],
        },
        |_args| Ok(serde_json::json!({"results": ["Paris is the capital of France"]})),
    );
    let catalog = Arc::new(catalog);

    let backend = MockModelBackend::new(vec![Ok(ActionProposal {
        action: "search_docs".to_string(),
        parameters: Default::default(),
        reason: "need to look up the capital of France".to_string(),
        expected_result: None,
        usage: None,
    })]);

    let orchestrator = Orchestrator::new(
        Arc::new(CapabilityRegistry::new(catalog.clone())),
        Arc::new(backend),
        catalog,
        Arc::new(RuntimeConfig::default()),
    );

    let state = orchestrator
        .run(ExecutionContext::new("What is the capital of France?", "researcher", "demo-user"))
        .await;

    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}
