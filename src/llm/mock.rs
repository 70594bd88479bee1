use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use std::sync::Mutex;

use crate::llm::ModelBackendClient;
use crate::types::{ActionProposal, ExecutionContext, ToolCatalog};

/// A scripted model backend — returns a fixed sequence of proposals,
/// used by orchestrator and scheduler tests in place of a real provider.
pub struct MockModelBackend {
    proposals: Mutex<Vec<Result<ActionProposal, String>>>,
    call_log:  Mutex<Vec<String>>,
}

impl MockModelBackend {
    pub fn new(proposals: Vec<Result<ActionProposal, String>>) -> Self {
        Self { proposals: Mutex::new(proposals), call_log: Mutex::new(Vec::new()) }
    }

    pub fn call_count(&self) -> usize {
        self.call_log.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelBackendClient for MockModelBackend {
    async fn propose(
        &self,
        agent_role: &str,
        _prompt_template_id: &str,
        _context: &ExecutionContext,
        _catalog: &ToolCatalog,
        _model: &str,
    ) -> Result<ActionProposal, String> {
        self.call_log.lock().unwrap().push(agent_role.to_string());
        let mut proposals = self.proposals.lock().unwrap();
        if proposals.is_empty() {
            return Err("MockModelBackend: no more programmed proposals".to_string());
        }
        proposals.remove(0)
    }

    fn propose_stream<'a>(
        &'a self,
        _agent_role: &'a str,
        _prompt_template_id: &'a str,
        _context: &'a ExecutionContext,
        _catalog: &'a ToolCatalog,
        _model: &'a str,
    ) -> BoxStream<'a, Result<String, String>> {
        stream::empty().boxed()
    }
}
