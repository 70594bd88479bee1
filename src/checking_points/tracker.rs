use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::checking_point::{
    AIAction, CheckResult, CheckResultType, CheckingPoint, CheckingPointConfig, CheckingPointType,
    ImmediateAction, MonitoringDatum,
};
use crate::types::Payload;

use super::DataSource;

/// Flags a task whose `priority` field is `urgent` or `critical`.
pub struct TrackerUrgentCheckingPoint {
    config: CheckingPointConfig,
    source: Arc<dyn DataSource>,
}

impl TrackerUrgentCheckingPoint {
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        let mut config = CheckingPointConfig::new("tracker-urgent", CheckingPointType::TrackerUrgent);
        config.priority = 8;
        Self { config, source }
    }

    fn priority_of(datum: &MonitoringDatum) -> Option<String> {
        datum.payload.get("priority").and_then(|v| v.as_str()).map(str::to_string)
    }
}

#[async_trait]
impl CheckingPoint for TrackerUrgentCheckingPoint {
    fn config(&self) -> &CheckingPointConfig { &self.config }

    async fn fetch_data(&self) -> Result<Vec<MonitoringDatum>, String> {
        self.source.poll().await
    }

    fn can_handle(&self, datum: &MonitoringDatum) -> bool {
        datum.kind == crate::checking_point::MonitoringDatumType::Task
    }

    fn evaluate(&self, datum: &MonitoringDatum) -> CheckResult {
        let started = std::time::Instant::now();
        let priority = Self::priority_of(datum);
        let urgent = matches!(priority.as_deref(), Some("urgent") | Some("critical"));

        let mut context = Payload::new();
        if let Some(p) = &priority {
            context.insert("priority".to_string(), serde_json::Value::String(p.clone()));
        }

        CheckResult {
            checking_point_name: self.config.name.clone(),
            checking_point_type: self.config.point_type,
            result_type: if urgent { CheckResultType::Match } else { CheckResultType::NoMatch },
            should_act: urgent,
            confidence: if urgent { 0.95 } else { 0.0 },
            reason: format!("task priority is {:?}", priority),
            context,
            suggested_actions: if urgent { vec!["notify_owner".to_string()] } else { vec![] },
            evaluation_duration: started.elapsed(),
            error_message: None,
        }
    }

    fn get_actions(&self, datum: &MonitoringDatum, result: &CheckResult) -> Vec<ImmediateAction> {
        if !result.should_act { return Vec::new(); }
        let mut parameters = Payload::new();
        parameters.insert("task_id".to_string(), serde_json::Value::String(datum.id.clone()));
        vec![ImmediateAction { kind: "tag_urgent".to_string(), parameters }]
    }

    fn get_after_process(&self, datum: &MonitoringDatum, result: &CheckResult) -> Vec<AIAction> {
        if !result.should_act { return Vec::new(); }
        let mut parameters = Payload::new();
        parameters.insert("task_id".to_string(), serde_json::Value::String(datum.id.clone()));
        vec![AIAction {
            name: "triage_urgent_task".to_string(),
            workflow_name: "tracker_triage".to_string(),
            checking_point_name: self.config.name.clone(),
            timeout: self.config.timeout,
            prompt_template_id: self.config.prompt_template_id.clone().unwrap_or_else(|| "default".to_string()),
            agent_role: self.config.agent_role.clone().unwrap_or_else(|| "triager".to_string()),
            approval_required: self.config.approval_required,
            approval_timeout: self.config.approval_timeout,
            priority: self.config.priority,
            parameters,
        }]
    }
}

/// Flags a task whose `due_at` timestamp is in the past and not yet done.
pub struct TrackerOverdueCheckingPoint {
    config: CheckingPointConfig,
    source: Arc<dyn DataSource>,
}

impl TrackerOverdueCheckingPoint {
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        let config = CheckingPointConfig::new("tracker-overdue", CheckingPointType::TrackerOverdue);
        Self { config, source }
    }

    fn is_overdue(datum: &MonitoringDatum) -> bool {
        let done = datum.payload.get("status").and_then(|v| v.as_str()) == Some("done");
        if done { return false; }
        datum.payload.get("due_at")
            .and_then(|v| v.as_str())
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|due| due.with_timezone(&chrono::Utc) < chrono::Utc::now())
            .unwrap_or(false)
    }
}

#[async_trait]
impl CheckingPoint for TrackerOverdueCheckingPoint {
    fn config(&self) -> &CheckingPointConfig { &self.config }

    async fn fetch_data(&self) -> Result<Vec<MonitoringDatum>, String> {
        self.source.poll().await
    }

    fn can_handle(&self, datum: &MonitoringDatum) -> bool {
        datum.kind == crate::checking_point::MonitoringDatumType::Task
    }

    fn evaluate(&self, datum: &MonitoringDatum) -> CheckResult {
        let started = std::time::Instant::now();
        let overdue = Self::is_overdue(datum);

        CheckResult {
            checking_point_name: self.config.name.clone(),
            checking_point_type: self.config.point_type,
            result_type: if overdue { CheckResultType::Match } else { CheckResultType::NoMatch },
            should_act: overdue,
            confidence: if overdue { 0.9 } else { 0.0 },
            reason: if overdue { "task is past its due date".to_string() } else { "task is on schedule".to_string() },
            context: Payload::new(),
            suggested_actions: if overdue { vec!["escalate".to_string()] } else { vec![] },
            evaluation_duration: started.elapsed(),
            error_message: None,
        }
    }

    fn get_after_process(&self, datum: &MonitoringDatum, result: &CheckResult) -> Vec<AIAction> {
        if !result.should_act { return Vec::new(); }
        let mut parameters = Payload::new();
        parameters.insert("task_id".to_string(), serde_json::Value::String(datum.id.clone()));
        vec![AIAction {
            name: "escalate_overdue_task".to_string(),
            workflow_name: "tracker_triage".to_string(),
            checking_point_name: self.config.name.clone(),
            timeout: self.config.timeout,
            prompt_template_id: self.config.prompt_template_id.clone().unwrap_or_else(|| "default".to_string()),
            agent_role: self.config.agent_role.clone().unwrap_or_else(|| "triager".to_string()),
            approval_required: self.config.approval_required,
            approval_timeout: self.config.approval_timeout,
            priority: self.config.priority,
            parameters,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checking_point::MonitoringDatumType;
    use crate::checking_points::StaticDataSource;

    fn task(id: &str, payload: Payload) -> MonitoringDatum {
        MonitoringDatum { id: id.to_string(), kind: MonitoringDatumType::Task, source: "tracker".to_string(), payload, timestamp: chrono::Utc::now() }
    }

    #[tokio::test]
    async fn urgent_point_matches_urgent_priority() {
        let mut payload = Payload::new();
        payload.insert("priority".to_string(), serde_json::Value::String("urgent".to_string()));
        let source = Arc::new(StaticDataSource::new(vec![task("t-1", payload)]));
        let point = TrackerUrgentCheckingPoint::new(source);

        let results = point.fetch_and_evaluate().await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].1.should_act);
        assert_eq!(point.get_after_process(&results[0].0, &results[0].1).len(), 1);
    }

    #[tokio::test]
    async fn overdue_point_ignores_completed_task() {
        let mut payload = Payload::new();
        payload.insert("status".to_string(), serde_json::Value::String("done".to_string()));
        payload.insert("due_at".to_string(), serde_json::Value::String("2000-01-01T00:00:00Z".to_string()));
        let source = Arc::new(StaticDataSource::new(vec![task("t-2", payload)]));
        let point = TrackerOverdueCheckingPoint::new(source);

        let results = point.fetch_and_evaluate().await.unwrap();
        assert!(!results[0].1.should_act);
    }
}
