// SPDX-License-Identifier: MIT OR Apache-2.0
//! Environment-driven runtime configuration, mirroring the original script's
//! `os.getenv(...)` table one-for-one.

use std::path::PathBuf;

/// Default hook command template, used when `DISPATCH_HOOK_CMD` is unset and
/// when a legacy-configured template omits `{task_kind*}` for a PR follow-up.
pub const DEFAULT_HOOK_CMD: &str =
    "./automation/issue-dispatcher/dispatch_bridge.sh {role_q} {repo_q} {task_kind_q} {task_number_q} {task_title_q} {task_url_q} {context_json_q}";

/// Runtime configuration for the dispatcher daemon and replay tool.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Host the HTTP receiver binds to.
    pub bind_host: String,
    /// Port the HTTP receiver binds to.
    pub bind_port: u16,
    /// Path to the declarative routing rule-set file.
    pub routing_file: PathBuf,
    /// Directory holding the two persistent JSON stores.
    pub state_dir: PathBuf,
    /// Directory the append-only log file is written under.
    pub log_dir: PathBuf,
    /// Path to the append-only log file.
    pub log_file: PathBuf,
    /// Wall-clock timeout for the subprocess dispatch invoker.
    pub hook_timeout_secs: u64,
    /// Whether newly-opened issues may be auto-dispatched at all.
    pub auto_execute_new_issues: bool,
    /// Whether auto-dispatch is restricted to `action == "opened"`.
    pub auto_execute_only_on_opened: bool,
    /// Label that forces an issue back onto the default triage role.
    pub force_triage_label: String,
    /// Shared secret used to verify `X-Hub-Signature-256`.
    pub webhook_secret: String,
    /// Bearer token used for forge REST/GraphQL calls.
    pub forge_token: String,
    /// Base URL of the forge's REST API.
    pub forge_api_base: String,
    /// Command template rendered by the dispatch invoker.
    pub hook_cmd: String,
    /// Label that bypasses the security-reviewer closure gate.
    pub security_override_label: String,
    /// Labels that mark a PR as security-sensitive.
    pub security_sensitive_labels: Vec<String>,
    /// Path substrings that mark a PR as security-sensitive.
    pub security_sensitive_paths: Vec<String>,
    /// Login of the designated security reviewer.
    pub locktrace_reviewer_login: String,
    /// Lookback window, in hours, for the replay tool's eligibility filter.
    pub replay_lookback_hours: i64,
    /// Maximum number of deliveries the replay tool will re-post in one run.
    pub replay_max: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            bind_host: "127.0.0.1".into(),
            bind_port: 8787,
            routing_file: PathBuf::from(".openclaw/issue-routing.yaml"),
            state_dir: PathBuf::from(".openclaw/state"),
            log_dir: PathBuf::from(".openclaw/state"),
            log_file: PathBuf::from(".openclaw/state/issue-dispatcher.log"),
            hook_timeout_secs: 45,
            auto_execute_new_issues: true,
            auto_execute_only_on_opened: true,
            force_triage_label: "dispatch:triage".into(),
            webhook_secret: String::new(),
            forge_token: String::new(),
            forge_api_base: "https://api.github.com".into(),
            hook_cmd: DEFAULT_HOOK_CMD.into(),
            security_override_label: "security-review:override".into(),
            security_sensitive_labels: vec!["security".into(), "security-sensitive".into()],
            security_sensitive_paths: vec!["auth/".into(), "secrets/".into(), "security/".into()],
            locktrace_reviewer_login: "locktrace".into(),
            replay_lookback_hours: 24,
            replay_max: 25,
        }
    }
}

impl DispatcherConfig {
    /// Load configuration from the process environment, falling back to
    /// [`Default::default`] for any unset variable.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = env_str("DISPATCHER_HOST") {
            cfg.bind_host = v;
        }
        if let Some(v) = env_parsed::<u16>("DISPATCHER_PORT") {
            cfg.bind_port = v;
        }
        if let Some(v) = env_str("ROUTING_FILE") {
            cfg.routing_file = PathBuf::from(v);
        }
        if let Some(v) = env_str("STATE_DIR") {
            cfg.state_dir = PathBuf::from(v);
        }
        cfg.log_dir = env_str("DISPATCHER_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| cfg.state_dir.clone());
        cfg.log_file = env_str("DISPATCHER_LOG_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| cfg.log_dir.join("issue-dispatcher.log"));
        if let Some(v) = env_parsed::<u64>("DISPATCH_HOOK_TIMEOUT_SEC") {
            cfg.hook_timeout_secs = v;
        }
        cfg.auto_execute_new_issues = env_bool("AUTO_EXECUTE_NEW_ISSUES", cfg.auto_execute_new_issues);
        cfg.auto_execute_only_on_opened =
            env_bool("AUTO_EXECUTE_ONLY_ON_OPENED", cfg.auto_execute_only_on_opened);
        if let Some(v) = env_str("FORCE_TRIAGE_LABEL") {
            cfg.force_triage_label = v.trim().to_lowercase();
        }
        if let Some(v) = env_str("GITHUB_WEBHOOK_SECRET") {
            cfg.webhook_secret = v;
        }
        if let Some(v) = env_str("GITHUB_TOKEN") {
            cfg.forge_token = v;
        }
        if let Some(v) = env_str("GITHUB_API_URL") {
            cfg.forge_api_base = v;
        }
        if let Some(v) = env_str("DISPATCH_HOOK_CMD") {
            cfg.hook_cmd = v;
        }
        if let Some(v) = env_str("SECURITY_REVIEW_OVERRIDE_LABEL") {
            cfg.security_override_label = v;
        }
        if let Some(v) = env_list("SECURITY_SENSITIVE_LABELS") {
            cfg.security_sensitive_labels = v;
        }
        if let Some(v) = env_list("SECURITY_SENSITIVE_PATHS") {
            cfg.security_sensitive_paths = v;
        }
        if let Some(v) = env_str("LOCKTRACE_REVIEWER_LOGIN") {
            cfg.locktrace_reviewer_login = v;
        }
        if let Some(v) = env_parsed::<i64>("FAILED_DELIVERY_LOOKBACK_HOURS") {
            cfg.replay_lookback_hours = v;
        }
        if let Some(v) = env_parsed::<usize>("MAX_FAILED_DELIVERY_REPLAYS") {
            cfg.replay_max = v;
        }

        cfg
    }
}

fn env_str(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_str(key).and_then(|v| v.parse().ok())
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => !matches!(v.to_lowercase().as_str(), "0" | "false" | "no"),
        Err(_) => default,
    }
}

fn env_list(key: &str) -> Option<Vec<String>> {
    env_str(key).map(|v| {
        v.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}
