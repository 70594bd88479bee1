//! Demonstrates the Scheduler running one tick over a checking-point
//! registry: an overdue task is detected and dispatched to the
//! orchestrator as a new run.
//!
//! ```bash
//! cargo run --example scheduler_demo
//! ```

use agentsm::capability::CapabilityRegistry;
use agentsm::catalog::StaticToolCatalogClient;
use agentsm::checking_point::{CheckingPointRegistry, MonitoringDatum, MonitoringDatumType};
use agentsm::checking_points::{StaticDataSource, TrackerOverdueCheckingPoint};
use agentsm::config::RuntimeConfig;
use agentsm::llm::MockModelBackend;
use agentsm::orchestrator::Orchestrator;
use agentsm::scheduler::Scheduler;
use agentsm::types::{ActionProposal, Payload};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut payload = Payload::new();
    payload.insert("status".to_string(), serde_json::Value::String("open".to_string()));
    payload.insert("due_at".to_string(), serde_json::Value::String("2020-01-01T00:00:00Z".to_string()));
    let datum = MonitoringDatum {
        id: "task-42".to_string(),
        kind: MonitoringDatumType::Task,
        source: "tracker".to_string(),
        payload,
        timestamp: chrono::Utc::now(),
    };

    let registry = Arc::new(CheckingPointRegistry::new());
    registry.register(Arc::new(TrackerOverdueCheckingPoint::new(Arc::new(StaticDataSource::new(vec![datum])))));

    let catalog = Arc::new(StaticToolCatalogClient::new());
    let backend = MockModelBackend::new(vec![Ok(ActionProposal {
        action: "escalate_overdue_task".to_string(),
        parameters: Default::default(),
        reason: "escalating to the on-call triager".to_string(),
        expected_result: None,
        usage: None,
    })]);
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(CapabilityRegistry::new(catalog.clone())),
        Arc::new(backend),
        catalog,
        Arc::new(RuntimeConfig::default()),
    ));

    let scheduler = Scheduler::new(registry, orchestrator, 16, 4);
    let report = scheduler.tick().await;
    println!("{:#?}", report);

    Ok(())
}
