// SPDX-License-Identifier: MIT OR Apache-2.0
//! Inbound webhook payload shapes. Only the fields the dispatcher reads are
//! modeled; unknown fields are ignored by serde's default behavior.

use serde::Deserialize;

/// `X-GitHub-Event` values the receiver accepts.
pub const EVENTS_ALLOWED: &[&str] = &[
    "issues",
    "pull_request_review",
    "pull_request_review_comment",
    "issue_comment",
];

/// Allowed `action` values for `issues` events.
pub const ISSUE_ACTIONS_ALLOWED: &[&str] = &["opened", "edited", "labeled", "reopened"];

/// Allowed `action` values for PR-feedback events.
pub const FEEDBACK_ACTIONS_ALLOWED: &[&str] = &["created", "edited", "submitted"];

/// Hard-coded fallback role when no routing config and no default role apply.
pub const CTRL_CORE_SENTINEL: &str = "ctrl^core";

/// Fixed three-item checklist attached to every follow-up task.
pub const REQUIRED_ACTION_CHECKLIST: &[&str] = &[
    "Post acknowledgement in the PR thread.",
    "Push fix commit(s) that address each feedback item.",
    "Reply in-thread with addressed commit hash(es).",
];

/// A label as the forge represents it.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Label {
    /// Label name, e.g. `"security"`.
    #[serde(default)]
    pub name: String,
}

/// A repository reference.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Repository {
    /// `"<owner>/<repo>"`.
    pub full_name: Option<String>,
}

/// A sender actor reference.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Sender {
    /// Login name of the actor who triggered the event.
    #[serde(default)]
    pub login: String,
}

/// Marker object present on an `issues` payload's `pull_request` field when
/// the underlying "issue" is actually a pull request.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct IssuePrMarker {
    #[serde(default)]
    #[allow(dead_code)]
    pub url: String,
}

/// The `issue` object of an `issues` or `issue_comment` event.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Issue {
    /// Issue (or PR) number.
    pub number: Option<i64>,
    /// Issue title.
    #[serde(default)]
    pub title: String,
    /// Issue body (may be null in the forge payload).
    pub body: Option<String>,
    /// Web URL for the issue.
    #[serde(default)]
    pub html_url: String,
    /// Labels currently applied.
    #[serde(default)]
    pub labels: Vec<Label>,
    /// Present (non-null) only when this "issue" is actually a pull request.
    pub pull_request: Option<IssuePrMarker>,
    /// Last-updated timestamp, used for issue fingerprinting.
    #[serde(default)]
    pub updated_at: String,
}

/// The `pull_request` object of a `pull_request_review`/`pull_request_review_comment` event.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PullRequest {
    /// Pull request number.
    pub number: Option<i64>,
    /// Pull request title.
    #[serde(default)]
    pub title: String,
    /// Pull request body (may be null).
    pub body: Option<String>,
    /// Web URL for the pull request.
    #[serde(default)]
    pub html_url: String,
    /// Labels currently applied.
    #[serde(default)]
    pub labels: Vec<Label>,
    /// Last-updated timestamp, used as a fingerprint fallback.
    #[serde(default)]
    pub updated_at: String,
}

/// The `review` object of a `pull_request_review` event.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Review {
    /// Review body text.
    pub body: Option<String>,
    /// Permalink to the review.
    pub html_url: Option<String>,
    /// Timestamp the review was submitted.
    pub submitted_at: Option<String>,
    /// Review state: `APPROVED`, `CHANGES_REQUESTED`, `COMMENTED`, ...
    pub state: Option<String>,
    /// The reviewer.
    #[serde(default)]
    pub user: Sender,
}

/// The `comment` object of a `pull_request_review_comment`/`issue_comment` event.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Comment {
    /// Stable comment identity, used for the duplicate-event check.
    pub id: Option<i64>,
    /// Comment body text.
    pub body: Option<String>,
    /// Permalink to the comment.
    pub html_url: Option<String>,
    /// Creation timestamp.
    pub created_at: Option<String>,
    /// Last-updated timestamp.
    pub updated_at: Option<String>,
}

/// Top-level webhook delivery payload. Individual fields are `Option`al
/// because their presence is event-kind-dependent.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct WebhookPayload {
    /// The `action` field present on nearly every GitHub webhook payload.
    pub action: Option<String>,
    /// The originating repository.
    #[serde(default)]
    pub repository: Repository,
    /// Present on `issues` and `issue_comment` events.
    pub issue: Option<Issue>,
    /// Present on `pull_request_review` and `pull_request_review_comment` events.
    pub pull_request: Option<PullRequest>,
    /// Present on `pull_request_review` events.
    pub review: Option<Review>,
    /// Present on `pull_request_review_comment` and `issue_comment` events.
    pub comment: Option<Comment>,
    /// The actor who triggered the delivery.
    #[serde(default)]
    pub sender: Sender,
}

impl WebhookPayload {
    /// `true` when this `issue_comment` payload's enclosing issue is
    /// actually a pull request.
    pub fn is_pr_issue_comment(&self) -> bool {
        self.issue
            .as_ref()
            .map(|i| i.pull_request.is_some())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_allowed_matches_original_set() {
        assert_eq!(EVENTS_ALLOWED.len(), 4);
        assert!(EVENTS_ALLOWED.contains(&"issue_comment"));
    }

    #[test]
    fn deserializes_minimal_issues_payload() {
        let raw = r#"{
            "action": "opened",
            "repository": {"full_name": "fourmajor/hoopsmania"},
            "issue": {"number": 74, "title": "CI flake", "labels": [], "html_url": "https://x"}
        }"#;
        let payload: WebhookPayload = serde_json::from_str(raw).unwrap();
        assert_eq!(payload.action.as_deref(), Some("opened"));
        assert_eq!(
            payload.repository.full_name.as_deref(),
            Some("fourmajor/hoopsmania")
        );
        assert_eq!(payload.issue.unwrap().number, Some(74));
    }

    #[test]
    fn pr_issue_comment_detection() {
        let raw = r#"{
            "action": "created",
            "repository": {"full_name": "a/b"},
            "issue": {
                "number": 1, "title": "t", "labels": [], "html_url": "u",
                "pull_request": {"url": "https://api.github.com/x"}
            },
            "comment": {"id": 1, "body": "hi", "html_url": "u#c1"}
        }"#;
        let payload: WebhookPayload = serde_json::from_str(raw).unwrap();
        assert!(payload.is_pr_issue_comment());
    }

    #[test]
    fn non_pr_issue_comment_detection() {
        let raw = r#"{
            "action": "created",
            "repository": {"full_name": "a/b"},
            "issue": {"number": 1, "title": "t", "labels": [], "html_url": "u"},
            "comment": {"id": 1, "body": "hi", "html_url": "u#c1"}
        }"#;
        let payload: WebhookPayload = serde_json::from_str(raw).unwrap();
        assert!(!payload.is_pr_issue_comment());
    }
}
