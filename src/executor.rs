use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult<T> {
    pub step:     String,
    pub status:   StepStatus,
    pub attempts: u32,
    pub result:   Option<T>,
    pub error:    Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityResult<T> {
    pub capability: String,
    pub status:     CapabilityStatus,
    pub result:     Option<T>,
    pub error:      Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapabilityStatus {
    Success,
    Timeout,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelResult<T> {
    pub status:  ParallelStatus,
    pub results: HashMap<String, Result<T, String>>,
    pub error:   Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParallelStatus {
    Success,
    Timeout,
    Error,
}

/// Generic retry + timeout + parallel-fan-out primitive, used both by
/// the orchestrator's own nodes and by the Scheduler.
///
/// Grounded line-for-line on `executor.py`'s `WorkflowExecutor`:
/// `tokio::time::timeout` stands in for `asyncio.wait_for`, and
/// `futures::future::join_all` over wrapped futures stands in for
/// `asyncio.gather(..., return_exceptions=True)`. The retry delay is
/// constant, matching the Python original, not exponential — the
/// exponential-backoff wrapper lives one layer up, in the model
/// backend's own retry wrapper.
pub struct WorkflowExecutor {
    pub max_retries:         u32,
    pub retry_delay:         Duration,
    pub default_timeout:     Duration,
}

impl WorkflowExecutor {
    pub fn new(max_retries: u32, retry_delay: Duration, default_timeout: Duration) -> Self {
        Self { max_retries, retry_delay, default_timeout }
    }

    pub async fn execute_step<T, F, Fut>(
        &self,
        step_name: impl Into<String>,
        timeout: Option<Duration>,
        mut func: F,
    ) -> StepResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, String>>,
    {
        let step = step_name.into();
        let timeout = timeout.unwrap_or(self.default_timeout);
        let mut last_error = String::new();

        for attempt in 0..self.max_retries {
            match tokio::time::timeout(timeout, func()).await {
                Ok(Ok(result)) => {
                    return StepResult { step, status: StepStatus::Success, attempts: attempt + 1, result: Some(result), error: None };
                }
                Ok(Err(e)) => {
                    last_error = e;
                }
                Err(_) => {
                    last_error = format!("step '{}' timed out after {:?}", step, timeout);
                }
            }

            if attempt + 1 < self.max_retries {
                tracing::warn!(step = %step, attempt = attempt + 1, error = %last_error, "step failed — retrying");
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        StepResult { step, status: StepStatus::Failed, attempts: self.max_retries, result: None, error: Some(last_error) }
    }

    pub async fn execute_capability<T, Fut>(
        &self,
        capability_name: impl Into<String>,
        timeout: Option<Duration>,
        func: Fut,
    ) -> CapabilityResult<T>
    where
        Fut: Future<Output = Result<T, String>>,
    {
        let capability = capability_name.into();
        let timeout = timeout.unwrap_or(self.default_timeout);

        match tokio::time::timeout(timeout, func).await {
            Ok(Ok(result)) => CapabilityResult { capability, status: CapabilityStatus::Success, result: Some(result), error: None },
            Ok(Err(e))     => CapabilityResult { capability, status: CapabilityStatus::Error, result: None, error: Some(e) },
            Err(_)         => CapabilityResult {
                capability, status: CapabilityStatus::Timeout, result: None,
                error: Some(format!("capability timed out after {:?}", timeout)),
            },
        }
    }

    pub async fn execute_parallel<T, Fut>(
        &self,
        tasks: HashMap<String, Fut>,
        timeout: Option<Duration>,
    ) -> ParallelResult<T>
    where
        Fut: Future<Output = Result<T, String>>,
    {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let (names, futures): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();

        match tokio::time::timeout(timeout, futures::future::join_all(futures)).await {
            Ok(outcomes) => {
                // Every task's outcome — success or failure — lands in
                // `results` under its own key, the way `asyncio.gather(...,
                // return_exceptions=True)` places the exception object
                // itself as that item's result rather than dropping it.
                let results: HashMap<String, Result<T, String>> = names.into_iter().zip(outcomes).collect();
                ParallelResult { status: ParallelStatus::Success, results, error: None }
            }
            Err(_) => ParallelResult {
                status: ParallelStatus::Timeout, results: HashMap::new(),
                error: Some(format!("parallel execution timed out after {:?}", timeout)),
            },
        }
    }
}

impl Default for WorkflowExecutor {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5), Duration::from_secs(300))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn execute_step_retries_then_succeeds() {
        let executor = WorkflowExecutor::new(3, Duration::from_millis(1), Duration::from_secs(1));
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);

        let result = executor.execute_step("flaky", None, move || {
            let calls = Arc::clone(&calls_clone);
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 { Err("not yet".to_string()) } else { Ok(42) }
            }
        }).await;

        assert_eq!(result.status, StepStatus::Success);
        assert_eq!(result.result, Some(42));
        assert_eq!(result.attempts, 3);
    }

    #[tokio::test]
    async fn execute_step_exhausts_retries() {
        let executor = WorkflowExecutor::new(2, Duration::from_millis(1), Duration::from_secs(1));
        let result: StepResult<()> = executor.execute_step("always_fails", None, || async { Err("nope".to_string()) }).await;
        assert_eq!(result.status, StepStatus::Failed);
        assert_eq!(result.attempts, 2);
    }

    #[tokio::test]
    async fn execute_capability_times_out() {
        let executor = WorkflowExecutor::new(1, Duration::from_millis(1), Duration::from_secs(1));
        let result: CapabilityResult<()> = executor.execute_capability(
            "slow",
            Some(Duration::from_millis(5)),
            async { tokio::time::sleep(Duration::from_secs(10)).await; Ok(()) },
        ).await;
        assert_eq!(result.status, CapabilityStatus::Timeout);
    }

    #[tokio::test]
    async fn execute_parallel_reports_both_successes_and_failures_as_outcomes() {
        let executor = WorkflowExecutor::default();
        let mut tasks: HashMap<String, _> = HashMap::new();
        tasks.insert("a".to_string(), Box::pin(async { Ok::<i32, String>(1) }) as std::pin::Pin<Box<dyn Future<Output = Result<i32, String>> + Send>>);
        tasks.insert("b".to_string(), Box::pin(async { Err::<i32, String>("boom".to_string()) }));

        let result = executor.execute_parallel(tasks, None).await;
        assert_eq!(result.status, ParallelStatus::Success);
        assert_eq!(result.results.len(), 2);
        assert_eq!(result.results.get("a"), Some(&Ok(1)));
        assert_eq!(result.results.get("b"), Some(&Err("boom".to_string())));
    }
}
