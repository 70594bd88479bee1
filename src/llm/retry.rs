use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

use crate::llm::ModelBackendClient;
use crate::types::{ActionProposal, ExecutionContext, ToolCatalog};

/// Wraps any `ModelBackendClient` with exponential back-off on transient
/// failures. This sits outside the orchestrator's own node-level retry
/// discipline (nodes never retry — see the Workflow Executor) and exists
/// purely to smooth over provider-side rate limits and blips.
pub struct RetryingModelBackend {
    inner:       Arc<dyn ModelBackendClient>,
    max_retries: u32,
}

impl RetryingModelBackend {
    pub fn new(inner: Arc<dyn ModelBackendClient>, max_retries: u32) -> Self {
        Self { inner, max_retries }
    }

    fn is_auth_error(err: &str) -> bool {
        let lower = err.to_lowercase();
        lower.contains("401") || lower.contains("403")
            || lower.contains("authentication") || lower.contains("unauthorized")
            || lower.contains("forbidden") || lower.contains("invalid api key")
    }

    fn is_rate_limit_error(err: &str) -> bool {
        let lower = err.to_lowercase();
        lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests")
    }
}

#[async_trait]
impl ModelBackendClient for RetryingModelBackend {
    async fn propose(
        &self,
        agent_role: &str,
        prompt_template_id: &str,
        context: &ExecutionContext,
        catalog: &ToolCatalog,
        model: &str,
    ) -> Result<ActionProposal, String> {
        let mut last_err = String::new();
        let mut rate_limited = false;

        for attempt in 0..=self.max_retries {
            match self.inner.propose(agent_role, prompt_template_id, context, catalog, model).await {
                Ok(proposal) => return Ok(proposal),
                Err(e) if Self::is_auth_error(&e) => {
                    tracing::error!(error = %e, "model backend auth error — not retrying");
                    return Err(e);
                }
                Err(e) => {
                    last_err = e.clone();
                    rate_limited |= Self::is_rate_limit_error(&e);

                    if attempt < self.max_retries {
                        let base_wait = if Self::is_rate_limit_error(&e) { 5 } else { 1 };
                        let wait_secs = std::cmp::min(base_wait << attempt, 60);
                        tracing::warn!(
                            attempt = attempt + 1, max = self.max_retries, wait_s = wait_secs,
                            error = %e, "model backend transient error — retrying",
                        );
                        tokio::time::sleep(std::time::Duration::from_secs(wait_secs)).await;
                    }
                }
            }
        }

        let prefix = if rate_limited { "model backend rate limit exceeded" } else { "model backend failed" };
        Err(format!("{} after {} retries — last error: {}", prefix, self.max_retries, last_err))
    }

    fn propose_stream<'a>(
        &'a self,
        agent_role: &'a str,
        prompt_template_id: &'a str,
        context: &'a ExecutionContext,
        catalog: &'a ToolCatalog,
        model: &'a str,
    ) -> BoxStream<'a, Result<String, String>> {
        // Retrying mid-stream would lose accumulated state; fall back to
        // a single pass-through, matching the teacher's own rationale.
        self.inner.propose_stream(agent_role, prompt_template_id, context, catalog, model)
    }
}
