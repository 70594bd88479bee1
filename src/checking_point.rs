use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use crate::types::Payload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckingPointType {
    TrackerUrgent,
    TrackerOverdue,
    TrackerSmartAssignment,
    ChatBotMention,
    ChatHelpRequest,
    ChatVipUser,
    EmailAlert,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitoringDatumType {
    Task,
    ChatMessage,
    Email,
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringDatum {
    pub id:        String,
    pub kind:      MonitoringDatumType,
    pub source:    String,
    pub payload:   Payload,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckResultType {
    Match,
    NoMatch,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub checking_point_name: String,
    pub checking_point_type: CheckingPointType,
    pub result_type:         CheckResultType,
    pub should_act:           bool,
    pub confidence:           f64,
    pub reason:               String,
    pub context:              Payload,
    pub suggested_actions:    Vec<String>,
    pub evaluation_duration:  Duration,
    pub error_message:        Option<String>,
}

/// The Scheduler's request to the Orchestrator, emitted from a checking
/// point's `get_after_process`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AIAction {
    pub name:                 String,
    pub workflow_name:        String,
    pub checking_point_name:  String,
    pub timeout:              Duration,
    pub prompt_template_id:   String,
    pub agent_role:           String,
    pub approval_required:    bool,
    pub approval_timeout:     Duration,
    pub priority:             u8,
    pub parameters:           Payload,
}

/// A side-effectful notification/tag the checking point wants fired
/// immediately, independent of whether the Orchestrator gets involved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImmediateAction {
    pub kind:       String,
    pub parameters: Payload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckingPointConfig {
    pub name:                String,
    pub point_type:          CheckingPointType,
    pub enabled:              bool,
    pub priority:             u8,
    pub stop_on_match:        bool,
    pub ai_workflow_enabled:  bool,
    pub prompt_template_id:   Option<String>,
    pub agent_role:           Option<String>,
    pub timeout:              Duration,
    pub approval_required:    bool,
    pub approval_timeout:     Duration,
    pub poll_interval:        Duration,
    pub max_fetches_per_minute: u32,
    pub params:               Payload,
}

impl CheckingPointConfig {
    pub fn new(name: impl Into<String>, point_type: CheckingPointType) -> Self {
        Self {
            name: name.into(),
            point_type,
            enabled: true,
            priority: 5,
            stop_on_match: false,
            ai_workflow_enabled: true,
            prompt_template_id: None,
            agent_role: None,
            timeout: Duration::from_secs(30),
            approval_required: false,
            approval_timeout: Duration::from_secs(3600),
            poll_interval: Duration::from_secs(60),
            max_fetches_per_minute: 10,
            params: Payload::new(),
        }
    }
}

/// A polymorphic monitor: fetches data from some external source,
/// evaluates it, and proposes actions. Concrete implementations are
/// grounded on §4.6's four-hook contract.
#[async_trait]
pub trait CheckingPoint: Send + Sync {
    fn config(&self) -> &CheckingPointConfig;

    async fn fetch_data(&self) -> Result<Vec<MonitoringDatum>, String>;

    fn evaluate(&self, datum: &MonitoringDatum) -> CheckResult;

    fn can_handle(&self, datum: &MonitoringDatum) -> bool;

    fn get_actions(&self, _datum: &MonitoringDatum, _result: &CheckResult) -> Vec<ImmediateAction> {
        Vec::new()
    }

    fn get_after_process(&self, datum: &MonitoringDatum, result: &CheckResult) -> Vec<AIAction>;

    /// Convenience combinator described in §4.6 — fetch then evaluate
    /// every item this point can handle. The Scheduler itself drives
    /// fetch/evaluate independently so it can parallelize across points;
    /// this exists for direct/manual invocation and tests.
    async fn fetch_and_evaluate(&self) -> Result<Vec<(MonitoringDatum, CheckResult)>, String> {
        if !self.config().enabled {
            return Ok(Vec::new());
        }
        let items = self.fetch_data().await?;
        Ok(items.into_iter()
            .filter(|item| self.can_handle(item))
            .map(|item| {
                let result = self.evaluate(&item);
                (item, result)
            })
            .collect())
    }
}

/// Registry of known checking-point instances, keyed by name and type.
/// Grounded on the teacher's preference for explicit registration over
/// implicit/magic auto-discovery — concrete points are handed to
/// `register` rather than relying on constructor-time side effects,
/// which Rust has no equivalent of.
pub struct CheckingPointRegistry {
    by_name: RwLock<HashMap<String, std::sync::Arc<dyn CheckingPoint>>>,
}

impl CheckingPointRegistry {
    pub fn new() -> Self {
        Self { by_name: RwLock::new(HashMap::new()) }
    }

    pub fn register(&self, point: std::sync::Arc<dyn CheckingPoint>) {
        let name = point.config().name.clone();
        self.by_name.write().unwrap().insert(name, point);
    }

    pub fn get_by_name(&self, name: &str) -> Option<std::sync::Arc<dyn CheckingPoint>> {
        self.by_name.read().unwrap().get(name).cloned()
    }

    pub fn get_by_type(&self, point_type: CheckingPointType) -> Vec<std::sync::Arc<dyn CheckingPoint>> {
        self.by_name.read().unwrap().values()
            .filter(|p| p.config().point_type == point_type)
            .cloned()
            .collect()
    }

    pub fn get_all(&self) -> Vec<std::sync::Arc<dyn CheckingPoint>> {
        self.by_name.read().unwrap().values().cloned().collect()
    }

    pub fn filter(&self, predicate: impl Fn(&CheckingPointConfig) -> bool) -> Vec<std::sync::Arc<dyn CheckingPoint>> {
        self.by_name.read().unwrap().values()
            .filter(|p| predicate(p.config()))
            .cloned()
            .collect()
    }
}

impl Default for CheckingPointRegistry {
    fn default() -> Self { Self::new() }
}

/// Sorts the results of evaluating a single datum against several points
/// by descending priority, truncating after the first `should_act &&
/// stop_on_match`, per §4.6's ordering rule.
pub fn apply_stop_on_match(
    mut ranked: Vec<(CheckingPointConfig, CheckResult)>,
) -> Vec<(CheckingPointConfig, CheckResult)> {
    ranked.sort_by(|a, b| b.0.priority.cmp(&a.0.priority));
    let mut out = Vec::with_capacity(ranked.len());
    for (config, result) in ranked {
        let stop = result.should_act && config.stop_on_match;
        out.push((config, result));
        if stop {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct AlwaysMatch {
        config: CheckingPointConfig,
    }

    #[async_trait]
    impl CheckingPoint for AlwaysMatch {
        fn config(&self) -> &CheckingPointConfig { &self.config }

        async fn fetch_data(&self) -> Result<Vec<MonitoringDatum>, String> {
            Ok(vec![MonitoringDatum {
                id: "1".to_string(), kind: MonitoringDatumType::Task, source: "tracker".to_string(),
                payload: Payload::new(), timestamp: chrono::Utc::now(),
            }])
        }

        fn evaluate(&self, _datum: &MonitoringDatum) -> CheckResult {
            CheckResult {
                checking_point_name: self.config.name.clone(),
                checking_point_type: self.config.point_type,
                result_type: CheckResultType::Match,
                should_act: true,
                confidence: 1.0,
                reason: "always".to_string(),
                context: Payload::new(),
                suggested_actions: vec![],
                evaluation_duration: Duration::from_millis(1),
                error_message: None,
            }
        }

        fn can_handle(&self, _datum: &MonitoringDatum) -> bool { true }

        fn get_after_process(&self, _datum: &MonitoringDatum, _result: &CheckResult) -> Vec<AIAction> {
            vec![AIAction {
                name: "follow_up".to_string(), workflow_name: "default".to_string(),
                checking_point_name: self.config.name.clone(), timeout: Duration::from_secs(30),
                prompt_template_id: "default".to_string(), agent_role: "triager".to_string(),
                approval_required: false, approval_timeout: Duration::from_secs(3600),
                priority: 5, parameters: Payload::new(),
            }]
        }
    }

    #[tokio::test]
    async fn fetch_and_evaluate_produces_should_act_result() {
        let point = AlwaysMatch { config: CheckingPointConfig::new("urgent", CheckingPointType::TrackerUrgent) };
        let results = point.fetch_and_evaluate().await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].1.should_act);
    }

    #[test]
    fn registry_lookup_by_name_and_type() {
        let registry = CheckingPointRegistry::new();
        registry.register(Arc::new(AlwaysMatch { config: CheckingPointConfig::new("urgent", CheckingPointType::TrackerUrgent) }));

        assert!(registry.get_by_name("urgent").is_some());
        assert_eq!(registry.get_by_type(CheckingPointType::TrackerUrgent).len(), 1);
        assert_eq!(registry.get_by_type(CheckingPointType::ChatVipUser).len(), 0);
    }

    #[test]
    fn stop_on_match_truncates_lower_priority_points() {
        let high = CheckingPointConfig { priority: 9, stop_on_match: true, ..CheckingPointConfig::new("high", CheckingPointType::TrackerUrgent) };
        let low = CheckingPointConfig { priority: 1, ..CheckingPointConfig::new("low", CheckingPointType::TrackerOverdue) };

        let matched = CheckResult {
            checking_point_name: "high".to_string(), checking_point_type: CheckingPointType::TrackerUrgent,
            result_type: CheckResultType::Match, should_act: true, confidence: 1.0, reason: "t".to_string(),
            context: Payload::new(), suggested_actions: vec![], evaluation_duration: Duration::from_millis(1), error_message: None,
        };
        let unmatched = CheckResult { should_act: false, ..matched.clone() };

        let ranked = apply_stop_on_match(vec![(low, unmatched), (high, matched)]);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].0.name, "high");
    }
}
