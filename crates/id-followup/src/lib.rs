// SPDX-License-Identifier: MIT OR Apache-2.0
//! PR-feedback follow-up task lifecycle: create/update on inbound feedback,
//! attempt closure once the review-threads + checks + security gates pass.

#![deny(unsafe_code)]

use id_core::{DispatcherConfig, DispatcherError, FollowupTask, RoutingConfig, TaskEvent, TaskStatus, WebhookPayload};
use id_forge::ForgeOps;
use id_routing::{is_security_sensitive, normalize_role, route_pr_feedback, PrForRouting};
use id_state::FollowupStateStore;

/// Feedback extracted from a PR-review/PR-review-comment/PR-issue-comment
/// webhook event.
#[derive(Debug, Clone)]
pub struct PrFeedback {
    /// `"<owner>/<repo>"`.
    pub repo: String,
    /// Pull request number.
    pub pr_number: i64,
    /// Pull request title.
    pub pr_title: String,
    /// Pull request web URL.
    pub pr_url: String,
    /// Lowercased labels currently on the pull request.
    pub labels: Vec<String>,
    /// Pull request body.
    pub body: String,
    /// Permalink to the comment/review, if present.
    pub permalink: Option<String>,
    /// The feedback text itself (comment or review body).
    pub feedback_body: String,
    /// `"review"`, `"review_comment"`, or `"pr_issue_comment"`.
    pub source: String,
    /// Login of the actor who left the feedback.
    pub sender: String,
    /// Stable identity used to detect a repeated delivery of the same
    /// comment/review (`"<source>:<permalink>"`).
    pub event_identity: String,
}

/// Extract PR-feedback from a webhook payload, or `None` if `evt` isn't a
/// recognized feedback kind or lacks a pull request number.
pub fn extract_pr_feedback(payload: &WebhookPayload, evt: &str) -> Option<PrFeedback> {
    let repo = payload.repository.full_name.clone()?;

    let (pr_number, pr_title, pr_url, labels, body, permalink, feedback_body, source) = match evt {
        "pull_request_review" => {
            let pr = payload.pull_request.as_ref()?;
            let number = pr.number?;
            let review = payload.review.as_ref();
            (
                number,
                pr.title.clone(),
                pr.html_url.clone(),
                pr.labels.iter().map(|l| l.name.to_lowercase()).collect::<Vec<_>>(),
                pr.body.clone().unwrap_or_default(),
                review.and_then(|r| r.html_url.clone()),
                review.and_then(|r| r.body.clone()).unwrap_or_default(),
                "review".to_string(),
            )
        }
        "pull_request_review_comment" => {
            let pr = payload.pull_request.as_ref()?;
            let number = pr.number?;
            let comment = payload.comment.as_ref();
            (
                number,
                pr.title.clone(),
                pr.html_url.clone(),
                pr.labels.iter().map(|l| l.name.to_lowercase()).collect::<Vec<_>>(),
                pr.body.clone().unwrap_or_default(),
                comment.and_then(|c| c.html_url.clone()),
                comment.and_then(|c| c.body.clone()).unwrap_or_default(),
                "review_comment".to_string(),
            )
        }
        "issue_comment" => {
            if !payload.is_pr_issue_comment() {
                return None;
            }
            let issue = payload.issue.as_ref()?;
            let number = issue.number?;
            let comment = payload.comment.as_ref();
            (
                number,
                issue.title.clone(),
                issue.html_url.clone(),
                issue.labels.iter().map(|l| l.name.to_lowercase()).collect::<Vec<_>>(),
                issue.body.clone().unwrap_or_default(),
                comment.and_then(|c| c.html_url.clone()),
                comment.and_then(|c| c.body.clone()).unwrap_or_default(),
                "pr_issue_comment".to_string(),
            )
        }
        _ => return None,
    };

    let pr_title = if pr_title.is_empty() {
        format!("PR #{pr_number}")
    } else {
        pr_title
    };
    let event_identity = format!("{source}:{}", permalink.clone().unwrap_or_default());
    let sender = if payload.sender.login.is_empty() {
        "unknown".to_string()
    } else {
        payload.sender.login.clone()
    };

    Some(PrFeedback {
        repo,
        pr_number,
        pr_title,
        pr_url,
        labels,
        body,
        permalink,
        feedback_body,
        source,
        sender,
        event_identity,
    })
}

/// Create or refresh the follow-up task for `payload`'s pull request.
///
/// Returns the persisted task and whether it was newly created. `pr_file_paths`
/// must already be fetched (via [`ForgeOps::pr_file_paths`]) by the caller.
pub async fn create_or_update_followup(
    payload: &WebhookPayload,
    evt: &str,
    store: &FollowupStateStore,
    config: &DispatcherConfig,
    routing: &RoutingConfig,
    pr_file_paths: &[String],
    now: &str,
) -> Result<(FollowupTask, bool), DispatcherError> {
    let feedback = extract_pr_feedback(payload, evt).ok_or(DispatcherError::NotPrFeedback)?;
    let key = format!("{}#{}", feedback.repo, feedback.pr_number);

    let pr_for_routing = PrForRouting {
        labels: &feedback.labels,
        title: &feedback.pr_title,
        body: &feedback.body,
        file_paths: pr_file_paths,
    };
    let routed_role = route_pr_feedback(&pr_for_routing, routing);
    let role = normalize_role(Some(&routed_role), routing, true);
    let security_hit = is_security_sensitive(
        &feedback.labels,
        pr_file_paths,
        &config.security_sensitive_labels,
        &config.security_sensitive_paths,
    );

    let mut is_new = false;
    let task = store
        .upsert(&key, |existing| {
            let mut task = existing.unwrap_or_else(|| {
                is_new = true;
                FollowupTask::new(&key, &feedback.repo, feedback.pr_number, &feedback.pr_title, &feedback.pr_url, now)
            });

            task.pr_title = feedback.pr_title.clone();
            task.pr_url = feedback.pr_url.clone();
            task.labels = feedback.labels.clone();
            task.role = role.clone();
            if is_new {
                task.owner_role = role.clone();
            }
            if security_hit {
                task.security_review_required = true;
            }
            task.status = TaskStatus::Open;
            task.closed_at = None;

            if let Some(permalink) = &feedback.permalink {
                if !task.comment_permalinks.contains(permalink) {
                    task.comment_permalinks.push(permalink.clone());
                }
            }

            if task.last_event_key.as_deref() == Some(feedback.event_identity.as_str()) {
                task.last_event_duplicate = true;
            } else {
                task.last_event_duplicate = false;
                task.event_sequence += 1;
                task.last_event_key = Some(feedback.event_identity.clone());
            }

            task.events.push(TaskEvent {
                event: evt.to_string(),
                action: payload.action.clone().unwrap_or_default(),
                source: feedback.source.clone(),
                sender: feedback.sender.clone(),
                at: now.to_string(),
            });
            task.updated_at = now.to_string();

            task
        })
        .await
        .map_err(|source| DispatcherError::PersistenceFailed {
            path: key.clone(),
            reason: source.to_string(),
        })?;

    Ok((task, is_new))
}

/// Attempt to close `task`: requires every review thread resolved, checks
/// green, and — when `security_review_required` and the task doesn't carry
/// the override label — the designated security reviewer's latest review to
/// be `APPROVED`.
pub async fn attempt_close_followup(
    task: &FollowupTask,
    store: &FollowupStateStore,
    forge: &dyn ForgeOps,
    config: &DispatcherConfig,
    now: &str,
) -> (bool, String) {
    let threads_ok = forge.all_threads_resolved(&task.repo, task.pr_number).await;
    let checks_ok = forge.checks_green(&task.repo, task.pr_number).await;

    let override_label = config.security_override_label.to_lowercase();
    let has_override = task.labels.iter().any(|l| l.to_lowercase() == override_label);

    let security_ok = if task.security_review_required && !has_override {
        let state = forge
            .latest_security_review_state(&task.repo, task.pr_number, &config.locktrace_reviewer_login)
            .await;
        state.as_deref() == Some("APPROVED")
    } else {
        true
    };

    if threads_ok == Some(true) && checks_ok == Some(true) && security_ok {
        let now = now.to_string();
        let result = store
            .update_existing(&task.id, move |t| {
                t.status = TaskStatus::Closed;
                t.closed_at = Some(now.clone());
                t.updated_at = now.clone();
            })
            .await;
        if result.is_ok() {
            return (true, "all review threads resolved and checks green".to_string());
        }
    }

    let mut reasons = Vec::new();
    if threads_ok != Some(true) {
        reasons.push("review threads still unresolved or unavailable".to_string());
    }
    if checks_ok != Some(true) {
        reasons.push("checks not green or unavailable".to_string());
    }
    if task.security_review_required && !has_override && !security_ok {
        reasons.push("locktrace approval required".to_string());
    }
    (false, reasons.join("; "))
}
