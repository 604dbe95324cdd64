// SPDX-License-Identifier: MIT OR Apache-2.0
//! The webhook HTTP receiver: signature check, event/action filtering,
//! two-layer dedup, routing, and the issue/PR-feedback dispatch paths.

#![deny(unsafe_code)]

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::{SecondsFormat, Utc};
use id_core::{
    verify_signature, DispatcherConfig, RoutingConfig, WebhookPayload, CTRL_CORE_SENTINEL,
    FEEDBACK_ACTIONS_ALLOWED, ISSUE_ACTIONS_ALLOWED,
};
use id_dispatch::{dispatch_ok, extract_dispatch_marker, render_hook, run_hook, HookTask};
use id_followup::{attempt_close_followup, create_or_update_followup, extract_pr_feedback};
use id_forge::ForgeOps;
use id_routing::{fingerprint, normalize_role, route_issue};
use id_state::{DuplicateKind, FollowupStateStore, ProcessedStateStore};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Shared state for every request handler.
pub struct AppState {
    /// Runtime configuration.
    pub config: DispatcherConfig,
    /// Two-layer delivery/fingerprint dedup store.
    pub processed: ProcessedStateStore,
    /// Per-pull-request follow-up task store.
    pub followups: FollowupStateStore,
    /// Forge REST/GraphQL capability, injected so tests can fake it.
    pub forge: Arc<dyn ForgeOps>,
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn tail(s: &str, n: usize) -> &str {
    if s.len() <= n {
        return s;
    }
    let mut idx = s.len() - n;
    while !s.is_char_boundary(idx) {
        idx += 1;
    }
    &s[idx..]
}

/// A handler-level error, carrying the status code and JSON body to report.
pub struct ApiError {
    status: StatusCode,
    body: Value,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, body: json!({"ok": false, "error": message.into()}) }
    }

    /// For error paths that need to report more than a single message (e.g.
    /// the PR-feedback dispatch-failure body, which carries diagnostics).
    fn with_body(status: StatusCode, body: Value) -> Self {
        Self { status, body }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn ignored(reason: impl Into<String>) -> Json<Value> {
    Json(json!({"ok": true, "ignored": reason.into()}))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or("")
}

/// Build the Axum router with every daemon route.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/github/webhook", post(github_webhook))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    Json(json!({"ok": true}))
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({"ok": false, "error": "not found"})))
}

async fn github_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let evt = header_str(&headers, "x-github-event").to_string();
    let delivery = header_str(&headers, "x-github-delivery").to_string();
    let sig = header_str(&headers, "x-hub-signature-256").to_string();

    if !id_core::EVENTS_ALLOWED.contains(&evt.as_str()) {
        return Ok(ignored(format!("event {evt}")));
    }

    if !verify_signature(&body, &sig, &state.config.webhook_secret) {
        return Err(ApiError::new(StatusCode::UNAUTHORIZED, "bad signature"));
    }

    let payload: WebhookPayload = serde_json::from_slice(&body)
        .map_err(|_| ApiError::new(StatusCode::BAD_REQUEST, "invalid payload json"))?;
    let action = payload.action.clone().unwrap_or_default();

    let allowed_actions: &[&str] = if evt == "issues" { ISSUE_ACTIONS_ALLOWED } else { FEEDBACK_ACTIONS_ALLOWED };
    if !allowed_actions.contains(&action.as_str()) {
        return Ok(ignored(format!("action {action}")));
    }

    if evt == "issue_comment" && !payload.is_pr_issue_comment() {
        return Ok(ignored("issue_comment on non-PR issue".to_string()));
    }

    let fp = fingerprint(&payload, &evt);
    match state.processed.is_duplicate(&delivery, &fp).await {
        DuplicateKind::Delivery => return Ok(ignored("duplicate delivery".to_string())),
        DuplicateKind::Fingerprint => return Ok(ignored("duplicate payload".to_string())),
        DuplicateKind::None => {}
    }

    let routing = RoutingConfig::load(&state.config.routing_file)
        .map_err(|err| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    if evt == "issues" {
        handle_issue_event(&state, &payload, &routing, &action, &delivery, &fp).await
    } else {
        handle_pr_feedback_event(&state, &payload, &routing, &evt, &action, &delivery, &fp).await
    }
}

async fn handle_issue_event(
    state: &AppState,
    payload: &WebhookPayload,
    routing: &RoutingConfig,
    action: &str,
    delivery: &str,
    fp: &str,
) -> Result<Json<Value>, ApiError> {
    let (Some(issue), Some(repo)) = (payload.issue.as_ref(), payload.repository.full_name.clone()) else {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "missing issue/repo"));
    };

    let (mut role, mut confident, mut reason) = route_issue(issue, routing);

    let labels: HashSet<String> = issue.labels.iter().map(|l| l.name.to_lowercase()).collect();
    if !state.config.force_triage_label.is_empty() && labels.contains(&state.config.force_triage_label) {
        role = routing.default_role.clone().unwrap_or_else(|| CTRL_CORE_SENTINEL.to_string());
        confident = false;
        reason = format!("forced triage via label `{}`", state.config.force_triage_label);
    }

    let mut should_auto_execute = confident;
    if state.config.auto_execute_only_on_opened && action != "opened" {
        should_auto_execute = false;
        if reason == "single confident role match" {
            reason = "confident match but auto-exec restricted to action=opened".to_string();
        }
    }
    if !state.config.auto_execute_new_issues {
        should_auto_execute = false;
        reason = "auto-execution disabled by AUTO_EXECUTE_NEW_ISSUES".to_string();
    }

    let effective_role = if should_auto_execute {
        role.clone()
    } else {
        normalize_role(routing.default_role.as_deref(), routing, false)
    };

    let number = issue.number.unwrap_or_default();
    let mut cmd = String::new();
    let mut exit_code: Option<i32> = None;
    let mut stdout = String::new();
    let mut stderr = String::new();
    let mut marker: Option<Value> = None;
    let mut ran = false;

    if action == "opened" || should_auto_execute {
        ran = true;
        let context = json!({
            "task_id": format!("{repo}#{number}"),
            "route_reason": reason,
            "route_confident": confident,
            "auto_executed": should_auto_execute,
        });
        let task = HookTask {
            role: effective_role.clone(),
            repo: repo.clone(),
            task_kind: "issue".to_string(),
            task_number: number.to_string(),
            task_title: issue.title.replace('\n', " "),
            task_url: issue.html_url.clone(),
            context_json: context.to_string(),
        };
        match render_hook(&task, &state.config.hook_cmd, id_core::DEFAULT_HOOK_CMD) {
            Ok(rendered) => {
                cmd = rendered;
                match run_hook(&cmd, Duration::from_secs(state.config.hook_timeout_secs)).await {
                    Ok(outcome) => {
                        exit_code = outcome.exit_code;
                        stdout = outcome.stdout;
                        stderr = outcome.stderr;
                        marker = extract_dispatch_marker(&stdout);
                    }
                    Err(err) => {
                        warn!(repo, number, error = %err, "failed to spawn dispatch hook");
                        stderr = err.to_string();
                    }
                }
            }
            Err(err) => {
                return Err(ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()));
            }
        }
    }

    let marker_line = if ran {
        match &marker {
            Some(m) => format!(
                "- downstream: `{}` run=`{}` target=`{}:{}`",
                m.get("status").and_then(Value::as_str).unwrap_or("unknown"),
                m.get("run_id").and_then(Value::as_str).unwrap_or(""),
                m.get("target_kind").and_then(Value::as_str).unwrap_or(""),
                m.get("target").and_then(Value::as_str).unwrap_or(""),
            ),
            None => "- downstream: `missing-marker`".to_string(),
        }
    } else {
        "- downstream: `not-triggered`".to_string()
    };

    let status_word = match action {
        "opened" => "start",
        "edited" | "labeled" | "reopened" => "update",
        _ => "done",
    };
    let dispatch_exit = if ran {
        exit_code.map(|c| c.to_string()).unwrap_or_else(|| "skipped".to_string())
    } else {
        "skipped".to_string()
    };
    let summary = format!(
        "\u{1f916} Issue router {status_word}.\n\
         - AI Employee: **{effective_role}**\n\
         - action: `{action}`\n\
         - routing: `{reason}`\n\
         - auto-executed: `{}`\n\
         - dispatcher exit: `{dispatch_exit}`\n\
         {marker_line}\n",
        should_auto_execute,
    );
    state.forge.post_comment(&repo, number, &summary).await;

    state
        .processed
        .mark_processed(delivery, fp)
        .await
        .map_err(|err| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    Ok(Json(json!({
        "ok": true,
        "repo": repo,
        "issue": number,
        "role": effective_role,
        "routing_reason": reason,
        "auto_executed": should_auto_execute,
        "command": cmd,
        "exit": exit_code,
        "stdout": tail(&stdout, 1000),
        "stderr": tail(&stderr, 1000),
    })))
}

async fn handle_pr_feedback_event(
    state: &AppState,
    payload: &WebhookPayload,
    routing: &RoutingConfig,
    evt: &str,
    action: &str,
    delivery: &str,
    fp: &str,
) -> Result<Json<Value>, ApiError> {
    let Some(preview) = extract_pr_feedback(payload, evt) else {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "payload is not PR feedback"));
    };

    let file_paths = state.forge.pr_file_paths(&preview.repo, preview.pr_number).await;

    let now = now_iso();
    let (task, is_new) =
        create_or_update_followup(payload, evt, &state.followups, &state.config, routing, &file_paths, &now)
            .await
            .map_err(|err| ApiError::new(StatusCode::BAD_REQUEST, err.to_string()))?;

    let context = json!({
        "task_id": task.id,
        "repo": task.repo,
        "pr_number": task.pr_number,
        "pr_url": task.pr_url,
        "comment_permalinks": task.comment_permalinks,
        "required_action_checklist": task.required_action_checklist,
        "closure_gate": "Close only when all review threads are resolved/answered and checks are green.",
    });
    let hook_task = HookTask {
        role: task.role.clone(),
        repo: task.repo.clone(),
        task_kind: "pr-followup".to_string(),
        task_number: task.pr_number.to_string(),
        task_title: format!("PR followup: {}", task.pr_title),
        task_url: task.pr_url.clone(),
        context_json: context.to_string(),
    };
    let cmd = render_hook(&hook_task, &state.config.hook_cmd, id_core::DEFAULT_HOOK_CMD)
        .map_err(|err| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    let (exit_code, stdout, stderr, marker) =
        match run_hook(&cmd, Duration::from_secs(state.config.hook_timeout_secs)).await {
            Ok(outcome) => {
                let marker = extract_dispatch_marker(&outcome.stdout);
                (outcome.exit_code, outcome.stdout, outcome.stderr, marker)
            }
            Err(err) => (None, String::new(), err.to_string(), None),
        };

    if !dispatch_ok(exit_code, marker.as_ref()) {
        return Err(ApiError::with_body(
            StatusCode::BAD_GATEWAY,
            json!({
                "ok": false,
                "event": evt,
                "action": action,
                "followup": task,
                "error": "dispatch failed; event left unacknowledged for safe retry",
                "dispatch_exit": exit_code,
                "dispatch_marker": marker,
                "stdout": tail(&stdout, 600),
                "stderr": tail(&stderr, 600),
            }),
        ));
    }

    let (closed, close_reason) = attempt_close_followup(&task, &state.followups, state.forge.as_ref(), &state.config, &now).await;

    let progress = if closed {
        "done"
    } else if is_new {
        "start"
    } else {
        "update"
    };
    let record_message = format!(
        "\u{1f916} Review followup {progress}: `{}`\n\
         - AI Employee: **{}**\n\
         - comment permalinks tracked: `{}`\n\
         - required action checklist:\n\
         \u{20}\u{20}- [ ] post acknowledgement in PR thread\n\
         \u{20}\u{20}- [ ] push fix commit(s)\n\
         \u{20}\u{20}- [ ] reply with addressed commit hash(es)\n\
         - closure gate: {}\n\
         - dispatcher exit: `{:?}`\n",
        task.id,
        task.role,
        task.comment_permalinks.len(),
        if closed { "\u{2705} closed".to_string() } else { format!("\u{23f3} open ({close_reason})") },
        exit_code,
    );
    state.forge.post_comment(&task.repo, task.pr_number, &record_message).await;

    state
        .processed
        .mark_processed(delivery, fp)
        .await
        .map_err(|err| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    Ok(Json(json!({
        "ok": true,
        "event": evt,
        "action": action,
        "followup": task,
        "dispatch_exit": exit_code,
        "dispatch_marker": marker,
        "closure": {"closed": closed, "reason": close_reason},
        "stdout": tail(&stdout, 600),
        "stderr": tail(&stderr, 600),
    })))
}
