use crate::types::{ActionProposal, ExecutionContext, ToolCatalog};
use async_trait::async_trait;
use futures::stream::BoxStream;

mod openai;
mod anthropic;
mod mock;
mod retry;

pub use openai::OpenAiBackend;
pub use anthropic::AnthropicBackend;
pub use mock::MockModelBackend;
pub use retry::RetryingModelBackend;

/// The boundary between the orchestrator's `agent_decision` node and a
/// concrete LLM provider. Implementations own their own HTTP client and
/// provider-specific request/response shapes; they return only the
/// structured proposal the orchestrator understands.
///
/// # Contract
/// - Must be `Send + Sync` — held behind `Arc<dyn ModelBackendClient>`.
/// - `propose` builds the tool schema from `catalog`, the system prompt
///   from `agent_role` + `prompt_template_id`, and the user message from
///   `context.task_description`.
/// - Returns `Err(String)` only for unrecoverable failures (auth failure,
///   network failure after retries, or a response that cannot be
///   interpreted as an `ActionProposal`). Ordinary "the model chose not
///   to call a tool" is still `Ok` — it surfaces as a proposal whose
///   `action` names a no-op/finish tool, per the agent role's prompt.
#[async_trait]
pub trait ModelBackendClient: Send + Sync {
    async fn propose(
        &self,
        agent_role: &str,
        prompt_template_id: &str,
        context: &ExecutionContext,
        catalog: &ToolCatalog,
        model: &str,
    ) -> Result<ActionProposal, String>;

    /// Streams raw text chunks for interactive, non-orchestrator use —
    /// the orchestrator itself only ever consumes the completed
    /// proposal from `propose`.
    fn propose_stream<'a>(
        &'a self,
        agent_role: &'a str,
        prompt_template_id: &'a str,
        context: &'a ExecutionContext,
        catalog: &'a ToolCatalog,
        model: &'a str,
    ) -> BoxStream<'a, Result<String, String>>;
}
