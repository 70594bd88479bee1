use async_trait::async_trait;
use std::sync::Arc;

use crate::checking_point::{
    AIAction, CheckResult, CheckResultType, CheckingPoint, CheckingPointConfig, CheckingPointType,
    ImmediateAction, MonitoringDatum, MonitoringDatumType,
};
use crate::types::Payload;

use super::DataSource;

/// Flags a chat message that @-mentions the configured bot handle.
pub struct ChatBotMentionCheckingPoint {
    config:    CheckingPointConfig,
    source:    Arc<dyn DataSource>,
    bot_handle: String,
}

impl ChatBotMentionCheckingPoint {
    pub fn new(source: Arc<dyn DataSource>, bot_handle: impl Into<String>) -> Self {
        let config = CheckingPointConfig::new("chat-bot-mention", CheckingPointType::ChatBotMention);
        Self { config, source, bot_handle: bot_handle.into() }
    }

    fn mentions_bot(&self, datum: &MonitoringDatum) -> bool {
        datum.payload.get("text")
            .and_then(|v| v.as_str())
            .map(|text| text.contains(&self.bot_handle))
            .unwrap_or(false)
    }
}

#[async_trait]
impl CheckingPoint for ChatBotMentionCheckingPoint {
    fn config(&self) -> &CheckingPointConfig { &self.config }

    async fn fetch_data(&self) -> Result<Vec<MonitoringDatum>, String> {
        self.source.poll().await
    }

    fn can_handle(&self, datum: &MonitoringDatum) -> bool {
        datum.kind == MonitoringDatumType::ChatMessage
    }

    fn evaluate(&self, datum: &MonitoringDatum) -> CheckResult {
        let started = std::time::Instant::now();
        let mentioned = self.mentions_bot(datum);

        CheckResult {
            checking_point_name: self.config.name.clone(),
            checking_point_type: self.config.point_type,
            result_type: if mentioned { CheckResultType::Match } else { CheckResultType::NoMatch },
            should_act: mentioned,
            confidence: if mentioned { 1.0 } else { 0.0 },
            reason: if mentioned { format!("message mentions {}", self.bot_handle) } else { "no mention".to_string() },
            context: Payload::new(),
            suggested_actions: if mentioned { vec!["respond".to_string()] } else { vec![] },
            evaluation_duration: started.elapsed(),
            error_message: None,
        }
    }

    fn get_actions(&self, datum: &MonitoringDatum, result: &CheckResult) -> Vec<ImmediateAction> {
        if !result.should_act { return Vec::new(); }
        let mut parameters = Payload::new();
        parameters.insert("message_id".to_string(), serde_json::Value::String(datum.id.clone()));
        vec![ImmediateAction { kind: "mark_seen".to_string(), parameters }]
    }

    fn get_after_process(&self, datum: &MonitoringDatum, result: &CheckResult) -> Vec<AIAction> {
        if !result.should_act { return Vec::new(); }
        let mut parameters = Payload::new();
        parameters.insert("message_id".to_string(), serde_json::Value::String(datum.id.clone()));
        if let Some(text) = datum.payload.get("text") {
            parameters.insert("text".to_string(), text.clone());
        }
        vec![AIAction {
            name: "respond_to_mention".to_string(),
            workflow_name: "chat_response".to_string(),
            checking_point_name: self.config.name.clone(),
            timeout: self.config.timeout,
            prompt_template_id: self.config.prompt_template_id.clone().unwrap_or_else(|| "default".to_string()),
            agent_role: self.config.agent_role.clone().unwrap_or_else(|| "support_agent".to_string()),
            approval_required: self.config.approval_required,
            approval_timeout: self.config.approval_timeout,
            priority: self.config.priority,
            parameters,
        }]
    }
}

/// Flags any message from a user tagged `is_vip` in its payload, raising
/// the priority and requiring approval before the orchestrator responds.
pub struct ChatVipUserCheckingPoint {
    config: CheckingPointConfig,
    source: Arc<dyn DataSource>,
}

impl ChatVipUserCheckingPoint {
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        let mut config = CheckingPointConfig::new("chat-vip-user", CheckingPointType::ChatVipUser);
        config.priority = 9;
        config.stop_on_match = true;
        config.approval_required = true;
        Self { config, source }
    }

    fn is_vip(datum: &MonitoringDatum) -> bool {
        datum.payload.get("is_vip").and_then(|v| v.as_bool()).unwrap_or(false)
    }
}

#[async_trait]
impl CheckingPoint for ChatVipUserCheckingPoint {
    fn config(&self) -> &CheckingPointConfig { &self.config }

    async fn fetch_data(&self) -> Result<Vec<MonitoringDatum>, String> {
        self.source.poll().await
    }

    fn can_handle(&self, datum: &MonitoringDatum) -> bool {
        datum.kind == MonitoringDatumType::ChatMessage
    }

    fn evaluate(&self, datum: &MonitoringDatum) -> CheckResult {
        let started = std::time::Instant::now();
        let vip = Self::is_vip(datum);

        CheckResult {
            checking_point_name: self.config.name.clone(),
            checking_point_type: self.config.point_type,
            result_type: if vip { CheckResultType::Match } else { CheckResultType::NoMatch },
            should_act: vip,
            confidence: if vip { 1.0 } else { 0.0 },
            reason: if vip { "message is from a VIP user".to_string() } else { "not a VIP user".to_string() },
            context: Payload::new(),
            suggested_actions: if vip { vec!["priority_response".to_string()] } else { vec![] },
            evaluation_duration: started.elapsed(),
            error_message: None,
        }
    }

    fn get_after_process(&self, datum: &MonitoringDatum, result: &CheckResult) -> Vec<AIAction> {
        if !result.should_act { return Vec::new(); }
        let mut parameters = Payload::new();
        parameters.insert("message_id".to_string(), serde_json::Value::String(datum.id.clone()));
        vec![AIAction {
            name: "respond_to_vip".to_string(),
            workflow_name: "chat_response".to_string(),
            checking_point_name: self.config.name.clone(),
            timeout: self.config.timeout,
            prompt_template_id: self.config.prompt_template_id.clone().unwrap_or_else(|| "default".to_string()),
            agent_role: self.config.agent_role.clone().unwrap_or_else(|| "support_agent".to_string()),
            approval_required: self.config.approval_required,
            approval_timeout: self.config.approval_timeout,
            priority: self.config.priority,
            parameters,
        }]
    }
}
