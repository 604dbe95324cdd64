// SPDX-License-Identifier: MIT OR Apache-2.0
//! Webhook delivery replay and ingress/event-subscription auditing.
//!
//! These are operator tools, not part of the always-on receiver: replay
//! nudges GitHub to redeliver recent failed webhook deliveries, the ingress
//! checker surfaces a burst of 5xx deliveries, and the event verifier
//! confirms a repository's webhook is subscribed to every event the
//! receiver depends on.

#![deny(unsafe_code)]

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use id_core::EVENTS_ALLOWED;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::warn;

/// Webhook event subscriptions the receiver requires to function.
pub const REQUIRED_EVENTS: &[&str] = &[
    "issues",
    "issue_comment",
    "pull_request_review",
    "pull_request_review_comment",
];

const REST_TIMEOUT: Duration = Duration::from_secs(20);

/// One entry from `GET /repos/{owner}/{repo}/hooks/{hook_id}/deliveries`.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryRecord {
    /// Delivery ID, used to request a redelivery attempt.
    pub id: i64,
    /// `X-GitHub-Event` value for this delivery.
    pub event: String,
    /// Webhook action, if applicable.
    pub action: Option<String>,
    /// HTTP status code the receiver returned for this delivery.
    pub status_code: i64,
    /// When GitHub attempted this delivery.
    pub delivered_at: String,
    /// `true` if this delivery is itself a manually-triggered redelivery.
    #[serde(default)]
    pub redelivery: bool,
}

fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|t| t.with_timezone(&Utc))
}

/// Select the delivery IDs eligible for replay: non-2xx, not themselves a
/// redelivery, for an event the receiver still accepts, and delivered
/// within `lookback_hours` of `now`. At most `max` IDs are returned,
/// keeping the most recent when more are eligible.
pub fn select_failed_deliveries_for_replay(
    deliveries: &[DeliveryRecord],
    now: DateTime<Utc>,
    lookback_hours: i64,
    max: usize,
) -> Vec<i64> {
    let cutoff = now - ChronoDuration::hours(lookback_hours);

    let mut eligible: Vec<&DeliveryRecord> = deliveries
        .iter()
        .filter(|d| d.status_code != 200)
        .filter(|d| !d.redelivery)
        .filter(|d| EVENTS_ALLOWED.contains(&d.event.as_str()))
        .filter(|d| parse_ts(&d.delivered_at).map(|t| t >= cutoff).unwrap_or(false))
        .collect();

    eligible.sort_by(|a, b| a.delivered_at.cmp(&b.delivered_at));

    let start = eligible.len().saturating_sub(max);
    eligible[start..].iter().map(|d| d.id).collect()
}

/// Minimal GitHub REST client for the replay/audit tools. Distinct from
/// `id-forge`'s `ForgeOps`, since these hit hook/delivery endpoints the
/// receiver itself never needs.
pub struct GithubApi {
    client: reqwest::Client,
    token: String,
}

impl GithubApi {
    /// Construct a client authenticating with `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: token.into(),
        }
    }

    async fn get(&self, path: &str) -> anyhow::Result<Value> {
        let resp = self
            .client
            .get(format!("https://api.github.com{path}"))
            .timeout(REST_TIMEOUT)
            .header("Accept", "application/vnd.github+json")
            .header("Authorization", format!("Bearer {}", self.token))
            .header("X-GitHub-Api-Version", "2022-11-28")
            .send()
            .await?;
        if !resp.status().is_success() {
            anyhow::bail!("GET {path} failed: {}", resp.status());
        }
        Ok(resp.json().await?)
    }

    async fn patch(&self, path: &str, body: &Value) -> anyhow::Result<Value> {
        let resp = self
            .client
            .patch(format!("https://api.github.com{path}"))
            .timeout(REST_TIMEOUT)
            .header("Accept", "application/vnd.github+json")
            .header("Authorization", format!("Bearer {}", self.token))
            .header("X-GitHub-Api-Version", "2022-11-28")
            .json(body)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("PATCH {path} failed: {status} {text}");
        }
        Ok(resp.json().await?)
    }

    async fn post(&self, path: &str, body: &Value) -> anyhow::Result<()> {
        let resp = self
            .client
            .post(format!("https://api.github.com{path}"))
            .timeout(REST_TIMEOUT)
            .header("Accept", "application/vnd.github+json")
            .header("Authorization", format!("Bearer {}", self.token))
            .header("X-GitHub-Api-Version", "2022-11-28")
            .json(body)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("POST {path} failed: {status} {text}");
        }
        Ok(())
    }

    /// List recent webhook deliveries for `hook_id`.
    pub async fn list_hook_deliveries(&self, owner: &str, repo: &str, hook_id: i64) -> anyhow::Result<Vec<DeliveryRecord>> {
        let value = self
            .get(&format!("/repos/{owner}/{repo}/hooks/{hook_id}/deliveries?per_page=100"))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Request that GitHub redeliver `delivery_id`.
    pub async fn redeliver(&self, owner: &str, repo: &str, hook_id: i64, delivery_id: i64) -> anyhow::Result<()> {
        self.post(
            &format!("/repos/{owner}/{repo}/hooks/{hook_id}/deliveries/{delivery_id}/attempts"),
            &json!({}),
        )
        .await
    }

    /// Fetch every webhook configured on `owner/repo`.
    pub async fn list_hooks(&self, owner: &str, repo: &str) -> anyhow::Result<Vec<Value>> {
        let value = self.get(&format!("/repos/{owner}/{repo}/hooks")).await?;
        Ok(value.as_array().cloned().unwrap_or_default())
    }

    /// Update `hook_id`'s subscribed events.
    pub async fn patch_hook_events(&self, owner: &str, repo: &str, hook_id: i64, events: &[String]) -> anyhow::Result<()> {
        self.patch(
            &format!("/repos/{owner}/{repo}/hooks/{hook_id}"),
            &json!({"events": events, "active": true}),
        )
        .await?;
        Ok(())
    }

    /// Post an alert comment on an issue.
    pub async fn post_comment(&self, owner: &str, repo: &str, issue_number: i64, body: &str) -> anyhow::Result<()> {
        self.post(&format!("/repos/{owner}/{repo}/issues/{issue_number}/comments"), &json!({"body": body}))
            .await
    }
}

/// Replay up to `max` failed deliveries on `owner/repo`'s `hook_id` from the
/// last `lookback_hours`. Returns a JSON summary matching the original
/// tool's `{ok, replayed, skipped, ...}` shape.
pub async fn replay_failed_deliveries(
    api: &GithubApi,
    owner: &str,
    repo: &str,
    hook_id: i64,
    lookback_hours: i64,
    max: usize,
) -> anyhow::Result<Value> {
    let deliveries = api.list_hook_deliveries(owner, repo, hook_id).await?;
    let selected = select_failed_deliveries_for_replay(&deliveries, Utc::now(), lookback_hours, max);

    let mut replayed = Vec::new();
    let mut failed = Vec::new();
    for id in &selected {
        match api.redeliver(owner, repo, hook_id, *id).await {
            Ok(()) => replayed.push(*id),
            Err(err) => {
                warn!(delivery_id = id, error = %err, "redelivery request failed");
                failed.push(json!({"id": id, "error": err.to_string()}));
            }
        }
    }

    Ok(json!({
        "ok": failed.is_empty(),
        "repo": format!("{owner}/{repo}"),
        "hook_id": hook_id,
        "considered": deliveries.len(),
        "replayed": replayed,
        "failed": failed,
    }))
}

/// Scan `hook_id`'s recent deliveries for 5xx responses within
/// `lookback_minutes`, optionally posting an alert comment to `alert_issue`.
pub async fn check_webhook_ingress(
    api: &GithubApi,
    owner: &str,
    repo: &str,
    hook_id: i64,
    lookback_minutes: i64,
    alert_issue: Option<i64>,
) -> anyhow::Result<Value> {
    let deliveries = api.list_hook_deliveries(owner, repo, hook_id).await?;
    let cutoff = Utc::now() - ChronoDuration::minutes(lookback_minutes);

    let recent: Vec<&DeliveryRecord> = deliveries
        .iter()
        .filter(|d| parse_ts(&d.delivered_at).map(|t| t >= cutoff).unwrap_or(false))
        .collect();
    let failed: Vec<&&DeliveryRecord> = recent.iter().filter(|d| d.status_code >= 500).collect();

    if !failed.is_empty() {
        if let Some(issue) = alert_issue {
            let lines: Vec<String> = failed
                .iter()
                .take(20)
                .map(|d| {
                    format!(
                        "- id `{}` `{}/{}` status `{}` at `{}` redelivery=`{}`",
                        d.id,
                        d.event,
                        d.action.as_deref().unwrap_or(""),
                        d.status_code,
                        d.delivered_at,
                        d.redelivery,
                    )
                })
                .collect();
            let body = format!(
                "AI Employee: pipewire\n\n\
                 Webhook ingress alert: detected 5xx deliveries in monitoring window.\n\n\
                 - repo: `{owner}/{repo}`\n\
                 - hook id: `{hook_id}`\n\
                 - lookback: `{lookback_minutes}m`\n\
                 - failures: `{}`\n\n\
                 Recent failed deliveries:\n{}",
                failed.len(),
                lines.join("\n"),
            );
            api.post_comment(owner, repo, issue, &body).await?;
        }
    }

    Ok(json!({
        "repo": format!("{owner}/{repo}"),
        "hook_id": hook_id,
        "lookback_minutes": lookback_minutes,
        "checked_recent": recent.len(),
        "failed_5xx": failed.iter().map(|d| json!({
            "id": d.id,
            "event": d.event,
            "action": d.action,
            "status_code": d.status_code,
            "delivered_at": d.delivered_at,
            "redelivery": d.redelivery,
        })).collect::<Vec<_>>(),
    }))
}

/// Outcome of a webhook event-subscription check.
#[derive(Debug, serde::Serialize)]
pub struct EventVerifyOutcome {
    /// ID of the matched webhook.
    pub hook_id: i64,
    /// Its configured delivery URL.
    pub url: String,
    /// Events it's currently subscribed to.
    pub current_events: Vec<String>,
    /// Required events it's missing, if any.
    pub missing: Vec<String>,
    /// `true` if `--apply` patched the hook to add the missing events.
    pub patched: bool,
}

/// Find a repository's webhook (by ID, URL substring, or uniquely by being
/// the only hook configured) and verify it's subscribed to every event the
/// receiver needs, optionally patching it to add what's missing.
pub async fn verify_webhook_events(
    api: &GithubApi,
    owner: &str,
    repo: &str,
    hook_id: Option<i64>,
    url_contains: Option<&str>,
    apply: bool,
) -> anyhow::Result<EventVerifyOutcome> {
    let hooks = api.list_hooks(owner, repo).await?;

    let selected = if let Some(id) = hook_id {
        hooks.iter().find(|h| h.get("id").and_then(Value::as_i64) == Some(id))
    } else if let Some(needle) = url_contains {
        hooks.iter().find(|h| {
            h.get("config")
                .and_then(|c| c.get("url"))
                .and_then(Value::as_str)
                .unwrap_or("")
                .contains(needle)
        })
    } else if hooks.len() == 1 {
        hooks.first()
    } else {
        None
    };

    let Some(hook) = selected else {
        anyhow::bail!("could not uniquely select webhook; pass --hook-id or --url-contains");
    };

    let hook_id = hook.get("id").and_then(Value::as_i64).unwrap_or_default();
    let url = hook
        .get("config")
        .and_then(|c| c.get("url"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let current: BTreeSet<String> = hook
        .get("events")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    let required: BTreeSet<String> = REQUIRED_EVENTS.iter().map(|s| s.to_string()).collect();
    let missing: Vec<String> = required.difference(&current).cloned().collect();

    let mut patched = false;
    if !missing.is_empty() && apply {
        let combined: Vec<String> = current.union(&required).cloned().collect();
        api.patch_hook_events(owner, repo, hook_id, &combined).await?;
        patched = true;
    }

    Ok(EventVerifyOutcome {
        hook_id,
        url,
        current_events: current.into_iter().collect(),
        missing,
        patched,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery(id: i64, event: &str, status_code: i64, redelivery: bool, delivered_at: &str) -> DeliveryRecord {
        DeliveryRecord {
            id,
            event: event.to_string(),
            action: None,
            status_code,
            delivered_at: delivered_at.to_string(),
            redelivery,
        }
    }

    #[test]
    fn filters_success_redelivery_old_and_irrelevant_events() {
        let now: DateTime<Utc> = "2026-02-26T00:30:00Z".parse().unwrap();
        let deliveries = vec![
            delivery(1, "issue_comment", 503, false, "2026-02-26T00:17:54.410Z"),
            delivery(2, "issue_comment", 200, false, "2026-02-26T00:18:54.410Z"),
            delivery(3, "ping", 503, false, "2026-02-26T00:18:54.410Z"),
            delivery(4, "pull_request_review", 503, true, "2026-02-26T00:18:54.410Z"),
            delivery(5, "issues", 503, false, "2000-01-01T00:00:00.000Z"),
        ];
        let selected = select_failed_deliveries_for_replay(&deliveries, now, 24, 25);
        assert_eq!(selected, vec![1]);
    }

    #[test]
    fn applies_max_limit_keeping_most_recent() {
        let now: DateTime<Utc> = "2026-02-26T01:00:00Z".parse().unwrap();
        let deliveries = vec![
            delivery(10, "issue_comment", 503, false, "2026-02-26T00:10:00.000Z"),
            delivery(11, "issue_comment", 503, false, "2026-02-26T00:11:00.000Z"),
            delivery(12, "issue_comment", 503, false, "2026-02-26T00:12:00.000Z"),
        ];
        let selected = select_failed_deliveries_for_replay(&deliveries, now, 24 * 365 * 10, 2);
        assert_eq!(selected, vec![11, 12]);
    }

    #[test]
    fn empty_input_selects_nothing() {
        let now = Utc::now();
        assert!(select_failed_deliveries_for_replay(&[], now, 24, 25).is_empty());
    }
}
