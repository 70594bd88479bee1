mod tracker;
mod chat;

pub use tracker::{TrackerOverdueCheckingPoint, TrackerUrgentCheckingPoint};
pub use chat::{ChatBotMentionCheckingPoint, ChatVipUserCheckingPoint};

use async_trait::async_trait;

use crate::checking_point::MonitoringDatum;

/// The thing a concrete checking point pulls items from — a ClickUp/Jira
/// client, a Slack client, an email inbox poller. Kept generic so the
/// same point implementation can be exercised in tests against a fake.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn poll(&self) -> Result<Vec<MonitoringDatum>, String>;
}

/// A fixed in-memory source, for tests and demos.
pub struct StaticDataSource {
    items: Vec<MonitoringDatum>,
}

impl StaticDataSource {
    pub fn new(items: Vec<MonitoringDatum>) -> Self {
        Self { items }
    }
}

#[async_trait]
impl DataSource for StaticDataSource {
    async fn poll(&self) -> Result<Vec<MonitoringDatum>, String> {
        Ok(self.items.clone())
    }
}
