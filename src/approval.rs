use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::types::{ExecutionContext, ToolDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
    Cancelled,
}

impl ApprovalStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub approval_id: String,
    pub run_id:       String,
    pub tool:         ToolDescriptor,
    pub context:      ExecutionContext,
    pub status:       ApprovalStatus,
    pub created_at:   DateTime<Utc>,
    pub expires_at:   DateTime<Utc>,
    pub resolved_at:       Option<DateTime<Utc>>,
    pub resolved_by:       Option<String>,
    pub resolution_reason: Option<String>,
}

impl ApprovalRequest {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == ApprovalStatus::Pending && now >= self.expires_at
    }
}

/// Thread-safe approval store keyed by `approval_id`, with a secondary
/// `run_id → [approval_id]` index. Expiration is checked lazily — only
/// on access — per the teacher's generally lazy, pull-based style
/// (e.g. `ToolRegistry::execute` rather than background validation),
/// and per `approval_manager.py`'s documented `get_pending` behavior.
pub struct ApprovalManager {
    requests: Mutex<HashMap<String, ApprovalRequest>>,
    by_run:   Mutex<HashMap<String, Vec<String>>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApprovalStats {
    pub pending:   usize,
    pub approved:  usize,
    pub rejected:  usize,
    pub expired:   usize,
    pub cancelled: usize,
}

impl ApprovalManager {
    pub fn new() -> Self {
        Self { requests: Mutex::new(HashMap::new()), by_run: Mutex::new(HashMap::new()) }
    }

    pub fn create(
        &self,
        run_id: impl Into<String>,
        tool: ToolDescriptor,
        context: ExecutionContext,
        timeout: std::time::Duration,
    ) -> ApprovalRequest {
        let run_id = run_id.into();
        let now = Utc::now();
        let request = ApprovalRequest {
            approval_id: uuid::Uuid::new_v4().to_string(),
            run_id: run_id.clone(),
            tool,
            context,
            status: ApprovalStatus::Pending,
            created_at: now,
            expires_at: now + ChronoDuration::from_std(timeout).unwrap_or(ChronoDuration::hours(1)),
            resolved_at: None,
            resolved_by: None,
            resolution_reason: None,
        };

        self.requests.lock().unwrap().insert(request.approval_id.clone(), request.clone());
        self.by_run.lock().unwrap().entry(run_id).or_default().push(request.approval_id.clone());
        request
    }

    fn lazily_expire(request: &mut ApprovalRequest) {
        if request.is_expired(Utc::now()) {
            request.status = ApprovalStatus::Expired;
            request.resolved_at = Some(Utc::now());
            request.resolution_reason = Some("expired".to_string());
        }
    }

    pub fn get(&self, approval_id: &str) -> Option<ApprovalRequest> {
        let mut requests = self.requests.lock().unwrap();
        let request = requests.get_mut(approval_id)?;
        Self::lazily_expire(request);
        Some(request.clone())
    }

    pub fn get_by_run(&self, run_id: &str) -> Vec<ApprovalRequest> {
        let ids = self.by_run.lock().unwrap().get(run_id).cloned().unwrap_or_default();
        ids.into_iter().filter_map(|id| self.get(&id)).collect()
    }

    pub fn get_pending(&self, run_id: &str) -> Vec<ApprovalRequest> {
        self.get_by_run(run_id).into_iter().filter(|r| r.status == ApprovalStatus::Pending).collect()
    }

    fn resolve(
        &self,
        approval_id: &str,
        approver: &str,
        reason: &str,
        outcome: ApprovalStatus,
    ) -> bool {
        let mut requests = self.requests.lock().unwrap();
        let Some(request) = requests.get_mut(approval_id) else { return false };
        Self::lazily_expire(request);
        if request.status != ApprovalStatus::Pending {
            return false;
        }
        request.status = outcome;
        request.resolved_at = Some(Utc::now());
        request.resolved_by = Some(approver.to_string());
        request.resolution_reason = Some(reason.to_string());
        true
    }

    pub fn approve(&self, approval_id: &str, approver: &str, reason: &str) -> bool {
        self.resolve(approval_id, approver, reason, ApprovalStatus::Approved)
    }

    pub fn reject(&self, approval_id: &str, approver: &str, reason: &str) -> bool {
        self.resolve(approval_id, approver, reason, ApprovalStatus::Rejected)
    }

    /// Transitions every still-pending approval for `run_id` to
    /// `Cancelled`. Returns how many were affected.
    pub fn cancel_run(&self, run_id: &str) -> usize {
        let pending = self.get_pending(run_id);
        let mut count = 0;
        for request in pending {
            if self.resolve(&request.approval_id, "system", "run cancelled", ApprovalStatus::Cancelled) {
                count += 1;
            }
        }
        count
    }

    pub fn stats(&self, run_id: &str) -> ApprovalStats {
        let mut stats = ApprovalStats::default();
        for request in self.get_by_run(run_id) {
            match request.status {
                ApprovalStatus::Pending   => stats.pending += 1,
                ApprovalStatus::Approved  => stats.approved += 1,
                ApprovalStatus::Rejected  => stats.rejected += 1,
                ApprovalStatus::Expired   => stats.expired += 1,
                ApprovalStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    pub fn clear_run(&self, run_id: &str) {
        if let Some(ids) = self.by_run.lock().unwrap().remove(run_id) {
            let mut requests = self.requests.lock().unwrap();
            for id in ids {
                requests.remove(&id);
            }
        }
    }
}

impl Default for ApprovalManager {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> ToolDescriptor {
        ToolDescriptor { name: "deploy".to_string(), description: String::new(), server: "t".to_string(), parameters: serde_json::json!({}), returns: None, tags: vec![] }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("task", "role", "user")
    }

    #[test]
    fn approve_then_duplicate_approve_is_noop() {
        let manager = ApprovalManager::new();
        let request = manager.create("run-1", tool(), ctx(), std::time::Duration::from_secs(60));

        assert!(manager.approve(&request.approval_id, "alice", "looks fine"));
        assert!(!manager.approve(&request.approval_id, "bob", "too late"));

        let stored = manager.get(&request.approval_id).unwrap();
        assert_eq!(stored.status, ApprovalStatus::Approved);
        assert_eq!(stored.resolved_by, Some("alice".to_string()));
    }

    #[test]
    fn expired_approval_is_lazily_detected() {
        let manager = ApprovalManager::new();
        let request = manager.create("run-1", tool(), ctx(), std::time::Duration::from_millis(1));
        std::thread::sleep(std::time::Duration::from_millis(5));

        assert!(manager.get_pending("run-1").is_empty());
        let stored = manager.get(&request.approval_id).unwrap();
        assert_eq!(stored.status, ApprovalStatus::Expired);
    }

    #[test]
    fn cancel_run_cancels_only_pending() {
        let manager = ApprovalManager::new();
        let a = manager.create("run-1", tool(), ctx(), std::time::Duration::from_secs(60));
        let b = manager.create("run-1", tool(), ctx(), std::time::Duration::from_secs(60));
        manager.approve(&a.approval_id, "alice", "ok");

        let cancelled = manager.cancel_run("run-1");
        assert_eq!(cancelled, 1);

        let stats = manager.stats("run-1");
        assert_eq!(stats.approved, 1);
        assert_eq!(stats.cancelled, 1);
        let _ = b;
    }
}
