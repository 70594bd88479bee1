use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use crate::checking_point::{
    apply_stop_on_match, AIAction, CheckResult, CheckingPoint, CheckingPointConfig,
    CheckingPointRegistry, MonitoringDatum,
};
use crate::orchestrator::Orchestrator;
use crate::types::ExecutionContext;

#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub points_run:         usize,
    pub datums_evaluated:   usize,
    pub actions_dispatched: usize,
    pub actions_dropped:    usize,
    pub errors:             Vec<(String, String)>,
}

/// Drives enabled checking points on their own per-point schedule and
/// turns `should_act` results into Orchestrator runs.
///
/// Grounded on §4.7: per-point polling interval, a fetch-rate limit, a
/// bounded queue between evaluation and dispatch (backpressure), and
/// per-point isolation — one point's fetch/evaluate failure is recorded
/// and does not stop the cycle for the others.
pub struct Scheduler {
    registry:         Arc<CheckingPointRegistry>,
    orchestrator:     Arc<Orchestrator>,
    last_run:         RwLock<HashMap<String, Instant>>,
    fetch_timestamps: Mutex<HashMap<String, VecDeque<Instant>>>,
    queue_capacity:   usize,
    concurrency_cap:  usize,
    dropped_total:    AtomicU64,
}

impl Scheduler {
    pub fn new(
        registry: Arc<CheckingPointRegistry>,
        orchestrator: Arc<Orchestrator>,
        queue_capacity: usize,
        concurrency_cap: usize,
    ) -> Self {
        Self {
            registry,
            orchestrator,
            last_run: RwLock::new(HashMap::new()),
            fetch_timestamps: Mutex::new(HashMap::new()),
            queue_capacity,
            concurrency_cap,
            dropped_total: AtomicU64::new(0),
        }
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped_total.load(Ordering::SeqCst)
    }

    fn point_due(&self, config: &CheckingPointConfig) -> bool {
        match self.last_run.read().unwrap().get(&config.name) {
            Some(last) => last.elapsed() >= config.poll_interval,
            None => true,
        }
    }

    /// Returns true (and records a fetch) if `config`'s per-minute fetch
    /// budget is not yet exhausted; otherwise the caller must defer the
    /// point to the next tick.
    fn try_consume_fetch_budget(&self, config: &CheckingPointConfig) -> bool {
        let mut timestamps = self.fetch_timestamps.lock().unwrap();
        let entry = timestamps.entry(config.name.clone()).or_default();
        let cutoff = Instant::now() - Duration::from_secs(60);
        while matches!(entry.front(), Some(t) if *t < cutoff) {
            entry.pop_front();
        }
        if entry.len() as u32 >= config.max_fetches_per_minute {
            return false;
        }
        entry.push_back(Instant::now());
        true
    }

    /// Runs one dispatch cycle over every enabled, due checking point.
    ///
    /// Fetch/evaluate happens per point first; the resulting hits are then
    /// grouped by `MonitoringDatum::id` so that, per §4.6, points competing
    /// for the same datum are ranked by descending `priority` and a
    /// `should_act && stop_on_match` hit suppresses every lower-priority
    /// point's hit on that same datum before any action is dispatched.
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();
        let (tx, mut rx) = tokio::sync::mpsc::channel::<AIAction>(self.queue_capacity);

        struct Hit {
            point:  Arc<dyn CheckingPoint>,
            config: CheckingPointConfig,
            datum:  MonitoringDatum,
            result: CheckResult,
        }
        let mut by_datum: HashMap<String, Vec<Hit>> = HashMap::new();

        for point in self.registry.filter(|c| c.enabled) {
            let config = point.config().clone();

            if !self.point_due(&config) {
                continue;
            }
            if !self.try_consume_fetch_budget(&config) {
                tracing::warn!(point = %config.name, "fetch rate limit exceeded, deferring to next tick");
                continue;
            }
            self.last_run.write().unwrap().insert(config.name.clone(), Instant::now());
            report.points_run += 1;

            let items = match tokio::time::timeout(config.timeout, point.fetch_data()).await {
                Ok(Ok(items)) => items,
                Ok(Err(e)) => {
                    tracing::error!(point = %config.name, error = %e, "checking point fetch failed");
                    report.errors.push((config.name.clone(), e));
                    continue;
                }
                Err(_) => {
                    let msg = format!("fetch timed out after {:?}", config.timeout);
                    tracing::error!(point = %config.name, "{}", msg);
                    report.errors.push((config.name.clone(), msg));
                    continue;
                }
            };

            for item in items {
                if !point.can_handle(&item) {
                    continue;
                }
                let result = point.evaluate(&item);
                report.datums_evaluated += 1;
                by_datum.entry(item.id.clone()).or_default().push(Hit {
                    point: Arc::clone(&point),
                    config: config.clone(),
                    datum: item,
                    result,
                });
            }
        }

        for (_datum_id, hits) in by_datum {
            let ranked: Vec<(CheckingPointConfig, CheckResult)> = hits.iter()
                .map(|h| (h.config.clone(), h.result.clone()))
                .collect();
            let surviving: HashSet<String> = apply_stop_on_match(ranked)
                .into_iter()
                .map(|(config, _)| config.name)
                .collect();

            for hit in hits.into_iter().filter(|h| surviving.contains(&h.config.name)) {
                if !hit.result.should_act {
                    continue;
                }

                for immediate in hit.point.get_actions(&hit.datum, &hit.result) {
                    tracing::info!(point = %hit.config.name, action = %immediate.kind, "immediate action");
                }

                for action in hit.point.get_after_process(&hit.datum, &hit.result) {
                    match tx.try_send(action) {
                        Ok(()) => {}
                        Err(_) => {
                            report.actions_dropped += 1;
                            self.dropped_total.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                }
            }
        }

        drop(tx);

        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.concurrency_cap.max(1)));
        let mut dispatches = Vec::new();
        while let Some(action) = rx.recv().await {
            report.actions_dispatched += 1;
            let orchestrator = Arc::clone(&self.orchestrator);
            let semaphore = Arc::clone(&semaphore);
            dispatches.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                orchestrator.run(action_to_context(action)).await;
            }));
        }
        for handle in dispatches {
            let _ = handle.await;
        }

        report
    }
}

fn action_to_context(action: AIAction) -> ExecutionContext {
    ExecutionContext::new(
        format!("[{}] {}", action.checking_point_name, action.name),
        action.agent_role,
        "scheduler",
    ).with_metadata(action.parameters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticToolCatalogClient;
    use crate::capability::CapabilityRegistry;
    use crate::checking_points::{StaticDataSource, TrackerUrgentCheckingPoint};
    use crate::config::RuntimeConfig;
    use crate::llm::MockModelBackend;
    use crate::types::{ActionProposal, Payload};

    fn make_orchestrator() -> Arc<Orchestrator> {
        let catalog = Arc::new(StaticToolCatalogClient::new());
        let backend = MockModelBackend::new(vec![Ok(ActionProposal {
            action: "noop".to_string(), parameters: Default::default(), reason: "t".to_string(), expected_result: None, usage: None,
        })]);
        Arc::new(Orchestrator::new(
            Arc::new(CapabilityRegistry::new(catalog.clone())),
            Arc::new(backend),
            catalog,
            Arc::new(RuntimeConfig::default()),
        ))
    }

    #[tokio::test]
    async fn tick_dispatches_actions_for_matching_datum() {
        let mut payload = Payload::new();
        payload.insert("priority".to_string(), serde_json::Value::String("urgent".to_string()));
        let source = Arc::new(StaticDataSource::new(vec![crate::checking_point::MonitoringDatum {
            id: "t-1".to_string(), kind: crate::checking_point::MonitoringDatumType::Task,
            source: "tracker".to_string(), payload, timestamp: chrono::Utc::now(),
        }]));

        let registry = Arc::new(CheckingPointRegistry::new());
        registry.register(Arc::new(TrackerUrgentCheckingPoint::new(source)));

        let scheduler = Scheduler::new(registry, make_orchestrator(), 16, 4);
        let report = scheduler.tick().await;

        assert_eq!(report.points_run, 1);
        assert_eq!(report.datums_evaluated, 1);
        assert_eq!(report.actions_dispatched, 1);
        assert_eq!(report.actions_dropped, 0);
    }

    #[tokio::test]
    async fn second_tick_within_interval_is_skipped() {
        let source = Arc::new(StaticDataSource::new(vec![]));
        let registry = Arc::new(CheckingPointRegistry::new());
        registry.register(Arc::new(TrackerUrgentCheckingPoint::new(source)));

        let scheduler = Scheduler::new(registry, make_orchestrator(), 16, 4);
        let first = scheduler.tick().await;
        let second = scheduler.tick().await;

        assert_eq!(first.points_run, 1);
        assert_eq!(second.points_run, 0);
    }

    /// A fixture point that always matches a fixed datum id, under a
    /// caller-chosen config. Used to pin down priority/stop_on_match
    /// behavior without depending on the tracker points' own thresholds.
    struct FixedPoint {
        config: crate::checking_point::CheckingPointConfig,
        datum_id: String,
        action_name: String,
    }

    #[async_trait::async_trait]
    impl crate::checking_point::CheckingPoint for FixedPoint {
        fn config(&self) -> &crate::checking_point::CheckingPointConfig { &self.config }

        async fn fetch_data(&self) -> Result<Vec<crate::checking_point::MonitoringDatum>, String> {
            Ok(vec![crate::checking_point::MonitoringDatum {
                id: self.datum_id.clone(),
                kind: crate::checking_point::MonitoringDatumType::Task,
                source: "shared".to_string(),
                payload: Payload::new(),
                timestamp: chrono::Utc::now(),
            }])
        }

        fn can_handle(&self, _datum: &crate::checking_point::MonitoringDatum) -> bool { true }

        fn evaluate(&self, _datum: &crate::checking_point::MonitoringDatum) -> crate::checking_point::CheckResult {
            crate::checking_point::CheckResult {
                checking_point_name: self.config.name.clone(),
                checking_point_type: self.config.point_type,
                result_type: crate::checking_point::CheckResultType::Match,
                should_act: true,
                confidence: 1.0,
                reason: "fixture always matches".to_string(),
                context: Payload::new(),
                suggested_actions: vec![],
                evaluation_duration: Duration::from_millis(1),
                error_message: None,
            }
        }

        fn get_after_process(&self, _datum: &crate::checking_point::MonitoringDatum, _result: &crate::checking_point::CheckResult) -> Vec<AIAction> {
            vec![AIAction {
                name: self.action_name.clone(),
                workflow_name: "default".to_string(),
                checking_point_name: self.config.name.clone(),
                timeout: self.config.timeout,
                prompt_template_id: "default".to_string(),
                agent_role: "triager".to_string(),
                approval_required: false,
                approval_timeout: self.config.approval_timeout,
                priority: self.config.priority,
                parameters: Payload::new(),
            }]
        }
    }

    #[tokio::test]
    async fn higher_priority_stop_on_match_suppresses_lower_priority_point_on_same_datum() {
        let mut high = crate::checking_point::CheckingPointConfig::new("high", crate::checking_point::CheckingPointType::Custom);
        high.priority = 9;
        high.stop_on_match = true;
        let mut low = crate::checking_point::CheckingPointConfig::new("low", crate::checking_point::CheckingPointType::Custom);
        low.priority = 1;

        let registry = Arc::new(CheckingPointRegistry::new());
        registry.register(Arc::new(FixedPoint { config: high, datum_id: "shared-1".to_string(), action_name: "from_high".to_string() }));
        registry.register(Arc::new(FixedPoint { config: low, datum_id: "shared-1".to_string(), action_name: "from_low".to_string() }));

        let scheduler = Scheduler::new(registry, make_orchestrator(), 16, 4);
        let report = scheduler.tick().await;

        assert_eq!(report.points_run, 2);
        assert_eq!(report.datums_evaluated, 2);
        // The low-priority point's hit on the same datum is suppressed by
        // the high-priority point's stop_on_match, so only one action
        // ever reaches the dispatch queue.
        assert_eq!(report.actions_dispatched, 1);
    }
}
