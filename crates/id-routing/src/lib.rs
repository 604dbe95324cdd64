// SPDX-License-Identifier: MIT OR Apache-2.0
//! Declarative routing of issues and PR-feedback to named roles, plus the
//! content fingerprinter used for duplicate suppression.

#![deny(unsafe_code)]

use id_core::{Issue, RoutingConfig, WebhookPayload, CTRL_CORE_SENTINEL};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    let h = haystack.to_lowercase();
    needles.iter().any(|n| h.contains(&n.to_lowercase()))
}

/// Every role name mentioned anywhere in the routing config: the two
/// defaults plus every rule's `role`.
pub fn known_roles(config: &RoutingConfig) -> HashSet<String> {
    let mut roles = HashSet::new();
    for candidate in [&config.default_role, &config.default_pr_role] {
        if let Some(v) = candidate {
            let trimmed = v.trim();
            if !trimmed.is_empty() {
                roles.insert(trimmed.to_string());
            }
        }
    }
    for rule in &config.rules {
        if let Some(role) = &rule.role {
            let trimmed = role.trim();
            if !trimmed.is_empty() {
                roles.insert(trimmed.to_string());
            }
        }
    }
    for rule in &config.pr_rules {
        if let Some(role) = &rule.role {
            let trimmed = role.trim();
            if !trimmed.is_empty() {
                roles.insert(trimmed.to_string());
            }
        }
    }
    roles
}

/// Resolve a candidate role against the known-role set, falling back to the
/// appropriate default and, failing that, to the hard-coded sentinel.
pub fn normalize_role(candidate: Option<&str>, config: &RoutingConfig, is_pr: bool) -> String {
    let candidate = candidate.unwrap_or("").trim();
    let known = known_roles(config);

    if !candidate.is_empty() && (known.is_empty() || known.contains(candidate)) {
        return candidate.to_string();
    }

    let fallback = if is_pr {
        config.default_pr_role.as_deref()
    } else {
        config.default_role.as_deref()
    }
    .unwrap_or("")
    .trim();

    if !fallback.is_empty() {
        return fallback.to_string();
    }

    CTRL_CORE_SENTINEL.to_string()
}

fn match_issue_roles(issue: &Issue, config: &RoutingConfig) -> Vec<String> {
    let labels: HashSet<String> = issue
        .labels
        .iter()
        .map(|l| l.name.to_lowercase())
        .filter(|n| !n.is_empty())
        .collect();
    let title = &issue.title;
    let body = issue.body.as_deref().unwrap_or("");

    let mut matched = Vec::new();
    for rule in &config.rules {
        let Some(role) = rule.role.as_deref().filter(|r| !r.is_empty()) else {
            continue;
        };

        let any_labels: Vec<String> = rule.any_labels.iter().map(|s| s.to_lowercase()).collect();
        if !any_labels.is_empty() && any_labels.iter().any(|l| labels.contains(l)) {
            matched.push(role.to_string());
            continue;
        }
        if !rule.title_contains.is_empty() && contains_any(title, &rule.title_contains) {
            matched.push(role.to_string());
            continue;
        }
        if !rule.body_contains.is_empty() && contains_any(body, &rule.body_contains) {
            matched.push(role.to_string());
            continue;
        }
    }
    matched
}

/// Route an issue to a role.
///
/// Returns `(role, confident, reason)`. See `id-core`'s spec documentation
/// for the exact decision table; this mirrors it verbatim.
pub fn route_issue(issue: &Issue, config: &RoutingConfig) -> (String, bool, String) {
    let default_role = normalize_role(config.default_role.as_deref(), config, false);
    let matched = match_issue_roles(issue, config);

    let mut unique: Vec<String> = matched.into_iter().collect::<HashSet<_>>().into_iter().collect();
    unique.sort();

    if unique.is_empty() {
        return (
            normalize_role(Some(&default_role), config, false),
            false,
            "no routing rule matched".to_string(),
        );
    }

    if unique.len() > 1 {
        return (
            default_role,
            false,
            format!("ambiguous role matches: {}", unique.join(", ")),
        );
    }

    let chosen = normalize_role(Some(&unique[0]), config, false);
    if chosen == default_role {
        return (default_role, false, "matched default triage role".to_string());
    }

    (chosen, true, "single confident role match".to_string())
}

/// Minimal PR shape needed for routing: title, body, labels, and (fetched
/// separately via the forge client) changed file paths.
pub struct PrForRouting<'a> {
    /// Case-insensitive label names.
    pub labels: &'a [String],
    /// PR title.
    pub title: &'a str,
    /// PR body.
    pub body: &'a str,
    /// Changed file paths, as fetched from the forge.
    pub file_paths: &'a [String],
}

/// Route PR-feedback to a role: the first matching `pr_rules` entry wins,
/// else `default_pr_role`.
pub fn route_pr_feedback(pr: &PrForRouting<'_>, config: &RoutingConfig) -> String {
    let labels: HashSet<String> = pr.labels.iter().map(|l| l.to_lowercase()).collect();

    for rule in &config.pr_rules {
        let any_labels: Vec<String> = rule.any_labels.iter().map(|s| s.to_lowercase()).collect();
        let any_paths: Vec<String> = rule.any_paths.iter().map(|s| s.to_lowercase()).collect();

        if !any_labels.is_empty() && any_labels.iter().any(|l| labels.contains(l)) {
            return normalize_role(rule.role.as_deref(), config, true);
        }
        if !any_paths.is_empty()
            && pr
                .file_paths
                .iter()
                .any(|fp| any_paths.iter().any(|p| fp.to_lowercase().contains(p)))
        {
            return normalize_role(rule.role.as_deref(), config, true);
        }
        if !rule.title_contains.is_empty() && contains_any(pr.title, &rule.title_contains) {
            return normalize_role(rule.role.as_deref(), config, true);
        }
        if !rule.body_contains.is_empty() && contains_any(pr.body, &rule.body_contains) {
            return normalize_role(rule.role.as_deref(), config, true);
        }
    }

    normalize_role(config.default_pr_role.as_deref(), config, true)
}

/// Whether a PR is security-sensitive: carries a security-sensitive label
/// or touches a security-sensitive path.
pub fn is_security_sensitive(
    labels: &[String],
    file_paths: &[String],
    sensitive_labels: &[String],
    sensitive_paths: &[String],
) -> bool {
    let lower_labels: HashSet<String> = labels.iter().map(|l| l.to_lowercase()).collect();
    let label_hit = sensitive_labels
        .iter()
        .any(|l| lower_labels.contains(&l.to_lowercase()));
    let path_hit = file_paths.iter().any(|fp| {
        let lower = fp.to_lowercase();
        sensitive_paths.iter().any(|p| lower.contains(&p.to_lowercase()))
    });
    label_hit || path_hit
}

/// Deterministic SHA-256 hex digest over a stable string composed from the
/// event kind and its identity-bearing fields.
pub fn fingerprint(payload: &WebhookPayload, evt: &str) -> String {
    let repo = payload.repository.full_name.as_deref().unwrap_or("");
    let action = payload.action.as_deref().unwrap_or("");

    let raw = if evt == "issues" {
        let issue = payload.issue.as_ref();
        let number = issue.and_then(|i| i.number).map(|n| n.to_string()).unwrap_or_default();
        let updated_at = issue.map(|i| i.updated_at.as_str()).unwrap_or("");
        format!("{evt}:{repo}:{number}:{action}:{updated_at}")
    } else {
        let pr_number = payload
            .pull_request
            .as_ref()
            .and_then(|pr| pr.number)
            .or_else(|| payload.issue.as_ref().and_then(|i| i.number))
            .map(|n| n.to_string())
            .unwrap_or_default();
        let updated_at = payload
            .review
            .as_ref()
            .and_then(|r| r.submitted_at.clone())
            .or_else(|| payload.comment.as_ref().and_then(|c| c.updated_at.clone()))
            .or_else(|| payload.comment.as_ref().and_then(|c| c.created_at.clone()))
            .or_else(|| payload.pull_request.as_ref().map(|pr| pr.updated_at.clone()))
            .unwrap_or_default();
        let permalink = payload
            .review
            .as_ref()
            .and_then(|r| r.html_url.clone())
            .or_else(|| payload.comment.as_ref().and_then(|c| c.html_url.clone()))
            .unwrap_or_default();
        format!("{evt}:{repo}:{pr_number}:{action}:{updated_at}:{permalink}")
    };

    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use id_core::{IssueRule, Label, PrRule};
    use proptest::prelude::*;

    fn routing_config() -> RoutingConfig {
        RoutingConfig {
            default_role: Some("ctrl^core".into()),
            default_pr_role: None,
            rules: vec![
                IssueRule {
                    any_labels: vec![],
                    title_contains: vec!["ci".into(), "infra".into(), "deploy".into()],
                    body_contains: vec![],
                    role: Some("pipewire".into()),
                },
                IssueRule {
                    any_labels: vec![],
                    title_contains: vec!["ui".into(), "frontend".into()],
                    body_contains: vec![],
                    role: Some("neonflux".into()),
                },
                IssueRule {
                    any_labels: vec![],
                    title_contains: vec!["docs".into(), "readme".into()],
                    body_contains: vec![],
                    role: Some("docdrip".into()),
                },
            ],
            pr_rules: vec![],
        }
    }

    fn issue(title: &str, labels: &[&str], body: &str) -> Issue {
        Issue {
            number: Some(74),
            title: title.to_string(),
            body: Some(body.to_string()),
            html_url: "https://github.com/fourmajor/hoopsmania/issues/74".into(),
            labels: labels.iter().map(|n| Label { name: n.to_string() }).collect(),
            pull_request: None,
            updated_at: String::new(),
        }
    }

    #[test]
    fn confident_issue_route() {
        let config = routing_config();
        let iss = issue("Test: CI pipeline flake validation", &[], "");
        let (role, confident, reason) = route_issue(&iss, &config);
        assert_eq!(role, "pipewire");
        assert!(confident);
        assert_eq!(reason, "single confident role match");
    }

    #[test]
    fn ambiguous_issue_route() {
        let config = routing_config();
        let iss = issue("CI + frontend orchestration", &[], "");
        let (role, confident, reason) = route_issue(&iss, &config);
        assert_eq!(role, "ctrl^core");
        assert!(!confident);
        assert_eq!(reason, "ambiguous role matches: neonflux, pipewire");
    }

    #[test]
    fn no_match_falls_back_to_default_with_reason() {
        let config = routing_config();
        let iss = issue("completely unrelated", &[], "");
        let (role, confident, reason) = route_issue(&iss, &config);
        assert_eq!(role, "ctrl^core");
        assert!(!confident);
        assert_eq!(reason, "no routing rule matched");
    }

    #[test]
    fn single_match_equal_to_default_is_not_confident() {
        let mut config = routing_config();
        config.default_role = Some("pipewire".into());
        let iss = issue("a ci failure", &[], "");
        let (role, confident, reason) = route_issue(&iss, &config);
        assert_eq!(role, "pipewire");
        assert!(!confident);
        assert_eq!(reason, "matched default triage role");
    }

    #[test]
    fn normalize_role_falls_back_to_ctrl_core_when_unset_or_unknown() {
        let config = RoutingConfig {
            default_role: Some(String::new()),
            default_pr_role: Some(String::new()),
            rules: vec![IssueRule {
                role: Some("pipewire".into()),
                ..Default::default()
            }],
            pr_rules: vec![PrRule {
                role: Some("neonflux".into()),
                ..Default::default()
            }],
        };
        assert_eq!(normalize_role(Some(""), &config, true), CTRL_CORE_SENTINEL);
        assert_eq!(normalize_role(Some("unknown-role"), &config, true), CTRL_CORE_SENTINEL);
    }

    #[test]
    fn route_pr_feedback_uses_default_when_no_rule_matches() {
        let config = RoutingConfig {
            default_role: None,
            default_pr_role: Some("ctrl^core".into()),
            rules: vec![],
            pr_rules: vec![PrRule {
                any_paths: vec!["backend/".into()],
                role: Some("Ghost|line".into()),
                ..Default::default()
            }],
        };
        let pr = PrForRouting {
            labels: &[],
            title: "chore",
            body: "",
            file_paths: &[],
        };
        assert_eq!(route_pr_feedback(&pr, &config), "ctrl^core");
    }

    #[test]
    fn route_pr_feedback_matches_path_rule() {
        let config = RoutingConfig {
            default_role: None,
            default_pr_role: Some("ctrl^core".into()),
            rules: vec![],
            pr_rules: vec![PrRule {
                any_paths: vec!["backend/".into()],
                role: Some("ghostline".into()),
                ..Default::default()
            }],
        };
        let file_paths = vec!["backend/api/server.rs".to_string()];
        let pr = PrForRouting {
            labels: &[],
            title: "chore",
            body: "",
            file_paths: &file_paths,
        };
        assert_eq!(route_pr_feedback(&pr, &config), "ghostline");
    }

    #[test]
    fn security_sensitive_detects_label_and_path() {
        let sensitive_labels = vec!["security".to_string()];
        let sensitive_paths = vec!["auth/".to_string()];
        assert!(is_security_sensitive(
            &["security".to_string()],
            &[],
            &sensitive_labels,
            &sensitive_paths
        ));
        assert!(is_security_sensitive(
            &[],
            &["auth/login.rs".to_string()],
            &sensitive_labels,
            &sensitive_paths
        ));
        assert!(!is_security_sensitive(
            &["chore".to_string()],
            &["README.md".to_string()],
            &sensitive_labels,
            &sensitive_paths
        ));
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let raw = r#"{
            "action": "opened",
            "repository": {"full_name": "a/b"},
            "issue": {"number": 1, "title": "t", "labels": [], "html_url": "u", "updated_at": "2026-01-01T00:00:00Z"}
        }"#;
        let payload: WebhookPayload = serde_json::from_str(raw).unwrap();
        let fp1 = fingerprint(&payload, "issues");
        let fp2 = fingerprint(&payload, "issues");
        assert_eq!(fp1, fp2);
        assert_eq!(fp1.len(), 64);
    }

    proptest! {
        #[test]
        fn route_issue_is_deterministic_across_runs(title in "[a-zA-Z ]{0,40}", has_ci in any::<bool>()) {
            let config = routing_config();
            let full_title = if has_ci { format!("ci {title}") } else { title };
            let iss = issue(&full_title, &[], "");
            let first = route_issue(&iss, &config);
            for _ in 0..5 {
                prop_assert_eq!(route_issue(&iss, &config), first.clone());
            }
        }
    }
}
