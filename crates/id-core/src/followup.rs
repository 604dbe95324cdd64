// SPDX-License-Identifier: MIT OR Apache-2.0
//! Persistent per-pull-request follow-up task records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::webhook::REQUIRED_ACTION_CHECKLIST;

/// Lifecycle state of a follow-up task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Still awaiting closure-gate conditions.
    Open,
    /// Closure gate passed; task is done.
    Closed,
}

/// A single entry in a task's append-only event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    /// Webhook event name, e.g. `"issue_comment"`.
    pub event: String,
    /// Webhook action, e.g. `"created"`.
    pub action: String,
    /// Feedback source: `"review"`, `"review_comment"`, or `"pr_issue_comment"`.
    pub source: String,
    /// Login of the actor who triggered this event.
    pub sender: String,
    /// Timestamp this event was recorded.
    pub at: String,
}

/// A persistent record tracking outstanding PR review feedback.
///
/// Keyed in the store by `"<repo>#<pr_number>"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowupTask {
    /// Same as the store key.
    pub id: String,
    /// `"<owner>/<repo>"`.
    pub repo: String,
    /// Pull request number.
    pub pr_number: i64,
    /// Pull request title, as last observed.
    pub pr_title: String,
    /// Pull request web URL.
    pub pr_url: String,
    /// Currently-assigned role.
    #[serde(default)]
    pub role: String,
    /// Role assigned at creation time; never changed afterward.
    #[serde(default)]
    pub owner_role: String,
    /// Sticky-true: once a security-sensitive signal is observed, stays true.
    #[serde(default)]
    pub security_review_required: bool,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Creation timestamp; preserved across reopen.
    pub created_at: String,
    /// Last-mutated timestamp.
    pub updated_at: String,
    /// Set when `status == Closed`; `None` while open.
    pub closed_at: Option<String>,
    /// Ordered, de-duplicated permalinks of feedback comments/reviews.
    #[serde(default)]
    pub comment_permalinks: Vec<String>,
    /// Append-only log of every inbound feedback event.
    #[serde(default)]
    pub events: Vec<TaskEvent>,
    /// Labels last observed on the pull request.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Fixed three-item action checklist template.
    #[serde(default = "default_checklist")]
    pub required_action_checklist: Vec<String>,
    /// Monotonically incremented per non-duplicate inbound event.
    #[serde(default)]
    pub event_sequence: u64,
    /// `true` when the most recent inbound event repeated the last one.
    #[serde(default)]
    pub last_event_duplicate: bool,
    /// Stable identity of the last recorded event, used to detect repeats:
    /// `(source, comment_or_review_id)`. Absent on legacy records.
    #[serde(default)]
    pub last_event_key: Option<String>,
}

fn default_checklist() -> Vec<String> {
    REQUIRED_ACTION_CHECKLIST.iter().map(|s| s.to_string()).collect()
}

impl FollowupTask {
    /// Construct a brand-new task for `key`, at `now`, with every sticky
    /// field at its initial value.
    pub fn new(key: &str, repo: &str, pr_number: i64, pr_title: &str, pr_url: &str, now: &str) -> Self {
        Self {
            id: key.to_string(),
            repo: repo.to_string(),
            pr_number,
            pr_title: pr_title.to_string(),
            pr_url: pr_url.to_string(),
            role: String::new(),
            owner_role: String::new(),
            security_review_required: false,
            status: TaskStatus::Open,
            created_at: now.to_string(),
            updated_at: now.to_string(),
            closed_at: None,
            comment_permalinks: Vec::new(),
            events: Vec::new(),
            labels: Vec::new(),
            required_action_checklist: default_checklist(),
            event_sequence: 0,
            last_event_duplicate: false,
            last_event_key: None,
        }
    }
}

/// Persisted follow-up store: `review_followups.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FollowupStore {
    /// Tasks keyed by `"<repo>#<pr_number>"`.
    #[serde(default)]
    pub tasks: BTreeMap<String, FollowupTask>,
}

impl FollowupStore {
    /// Parse from on-disk JSON text, yielding an empty store on any parse
    /// failure or non-object top-level value.
    pub fn from_json_str(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_starts_open_with_zero_sequence() {
        let t = FollowupTask::new("a/b#1", "a/b", 1, "t", "u", "2026-01-01T00:00:00Z");
        assert_eq!(t.status, TaskStatus::Open);
        assert!(t.closed_at.is_none());
        assert_eq!(t.event_sequence, 0);
        assert_eq!(t.required_action_checklist.len(), 3);
    }

    #[test]
    fn malformed_store_json_yields_empty_default() {
        let store = FollowupStore::from_json_str("{not json");
        assert!(store.tasks.is_empty());
    }

    #[test]
    fn round_trips_through_json() {
        let t = FollowupTask::new("a/b#1", "a/b", 1, "t", "u", "2026-01-01T00:00:00Z");
        let mut store = FollowupStore::default();
        store.tasks.insert(t.id.clone(), t);
        let json = serde_json::to_string(&store).unwrap();
        let parsed = FollowupStore::from_json_str(&json);
        assert_eq!(parsed.tasks.len(), 1);
    }
}
