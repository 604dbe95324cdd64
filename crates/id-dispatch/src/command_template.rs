// SPDX-License-Identifier: MIT OR Apache-2.0
//! Hook command-template parsing and rendering.
//!
//! Templates are plain `{name}` placeholders (no nested braces, no format
//! specs) — `.format()`-equivalent, not a full template language.

use id_core::DispatcherError;
use std::collections::{BTreeSet, HashMap};

/// Canonical placeholder names, their shell-quoted `_q` variants, and the
/// legacy issue-era aliases still accepted for backward compatibility.
const SUPPORTED_HOOK_KEYS: &[&str] = &[
    "role",
    "repo",
    "task_kind",
    "task_number",
    "task_title",
    "task_url",
    "context_json",
    "issue_number",
    "issue_title",
    "issue_url",
    "role_q",
    "repo_q",
    "task_kind_q",
    "task_number_q",
    "task_title_q",
    "task_url_q",
    "context_json_q",
    "issue_number_q",
    "issue_title_q",
    "issue_url_q",
];

/// The values available to a single hook invocation.
#[derive(Debug, Clone)]
pub struct HookTask {
    /// Assigned role.
    pub role: String,
    /// `"<owner>/<repo>"`.
    pub repo: String,
    /// `"issue"` or `"pr-followup"`.
    pub task_kind: String,
    /// Issue or pull request number, as a string.
    pub task_number: String,
    /// Issue or pull request title.
    pub task_title: String,
    /// Issue or pull request web URL.
    pub task_url: String,
    /// Compact JSON blob of additional context.
    pub context_json: String,
}

/// Extract the `{name}` placeholders referenced by `template`, ignoring
/// `{{`/`}}` escapes and empty `{}` positional fields.
fn placeholders(template: &str) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    let mut chars = template.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c != '{' {
            continue;
        }
        if chars.peek().map(|&(_, n)| n) == Some('{') {
            chars.next();
            continue;
        }
        if let Some(end) = template[i + 1..].find('}') {
            let name = &template[i + 1..i + 1 + end];
            if !name.is_empty() {
                names.insert(name.to_string());
            }
            for _ in 0..=end {
                chars.next();
            }
        }
    }
    names
}

fn substitute(template: &str, values: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '{' && chars.peek().map(|&(_, n)| n) == Some('{') {
            chars.next();
            out.push('{');
            continue;
        }
        if c == '}' && chars.peek().map(|&(_, n)| n) == Some('}') {
            chars.next();
            out.push('}');
            continue;
        }
        if c != '{' {
            out.push(c);
            continue;
        }
        if let Some(end) = template[i + 1..].find('}') {
            let name = &template[i + 1..i + 1 + end];
            out.push_str(values.get(name).map(String::as_str).unwrap_or(""));
            for _ in 0..=end {
                chars.next();
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn merged_values(task: &HookTask) -> HashMap<String, String> {
    let mut values = HashMap::new();
    values.insert("role".into(), task.role.clone());
    values.insert("repo".into(), task.repo.clone());
    values.insert("task_kind".into(), task.task_kind.clone());
    values.insert("task_number".into(), task.task_number.clone());
    values.insert("task_title".into(), task.task_title.clone());
    values.insert("task_url".into(), task.task_url.clone());
    values.insert("context_json".into(), task.context_json.clone());
    // Legacy aliases for older hook templates.
    values.insert("issue_number".into(), task.task_number.clone());
    values.insert("issue_title".into(), task.task_title.clone());
    values.insert("issue_url".into(), task.task_url.clone());

    let base: Vec<(String, String)> = values.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    for (k, v) in base {
        values.insert(format!("{k}_q"), shell_words::quote(&v).into_owned());
    }
    values
}

/// Render `task` through `hook_cmd`.
///
/// For a `"pr-followup"` task whose configured `hook_cmd` predates the
/// `task_kind` placeholder, falls back to `default_hook_cmd` so older
/// `DISPATCH_HOOK_CMD` overrides keep working against the newer dispatch
/// context. Returns [`DispatcherError::UnsupportedPlaceholder`] if the
/// chosen template references a name outside [`SUPPORTED_HOOK_KEYS`].
pub fn render_hook(task: &HookTask, hook_cmd: &str, default_hook_cmd: &str) -> Result<String, DispatcherError> {
    let template = if task.task_kind == "pr-followup" {
        let fields = placeholders(hook_cmd);
        if !fields.contains("task_kind") && !fields.contains("task_kind_q") {
            default_hook_cmd
        } else {
            hook_cmd
        }
    } else {
        hook_cmd
    };

    let fields = placeholders(template);
    let supported: BTreeSet<&str> = SUPPORTED_HOOK_KEYS.iter().copied().collect();
    let unknown: Vec<String> = fields
        .iter()
        .filter(|f| !supported.contains(f.as_str()))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(DispatcherError::UnsupportedPlaceholder { names: unknown });
    }

    Ok(substitute(template, &merged_values(task)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(task_kind: &str) -> HookTask {
        HookTask {
            role: "pipewire".into(),
            repo: "fourmajor/hoopsmania".into(),
            task_kind: task_kind.into(),
            task_number: "103".into(),
            task_title: "PR followup".into(),
            task_url: "https://github.com/fourmajor/hoopsmania/pull/103".into(),
            context_json: "{}".into(),
        }
    }

    #[test]
    fn renders_default_template_with_quoted_fields() {
        let cmd = render_hook(
            &task("issue"),
            id_core::DEFAULT_HOOK_CMD,
            id_core::DEFAULT_HOOK_CMD,
        )
        .unwrap();
        assert!(cmd.contains("pipewire"));
        assert!(cmd.contains("103"));
    }

    #[test]
    fn legacy_issue_placeholders_are_supported() {
        let cmd = render_hook(
            &task("issue"),
            "./bridge.sh {role_q} {repo_q} {issue_number_q} {issue_title_q} {issue_url_q}",
            id_core::DEFAULT_HOOK_CMD,
        )
        .unwrap();
        assert!(cmd.contains("103"));
        assert!(cmd.contains("PR followup"));
    }

    #[test]
    fn unsupported_placeholder_is_rejected() {
        let err = render_hook(&task("issue"), "./bridge.sh {role_q} {bogus_q}", id_core::DEFAULT_HOOK_CMD)
            .unwrap_err();
        assert!(matches!(err, DispatcherError::UnsupportedPlaceholder { .. }));
    }

    #[test]
    fn pr_followup_falls_back_to_default_when_legacy_cmd_lacks_task_kind() {
        let legacy_hook_cmd = "./dispatch_bridge.sh {role_q} {repo_q} {issue_number_q}";
        let default_hook_cmd = "./dispatch_bridge.sh {role_q} {repo_q} {task_kind_q} {task_number_q}";
        let cmd = render_hook(&task("pr-followup"), legacy_hook_cmd, default_hook_cmd).unwrap();
        assert!(cmd.contains("pr-followup"));
        assert!(cmd.contains("103"));
    }

    #[test]
    fn pr_followup_uses_configured_cmd_when_it_already_has_task_kind() {
        let hook_cmd = "./custom.sh {role_q} {task_kind_q} {task_number_q}";
        let cmd = render_hook(&task("pr-followup"), hook_cmd, id_core::DEFAULT_HOOK_CMD).unwrap();
        assert!(cmd.starts_with("./custom.sh"));
    }

    #[test]
    fn escaped_braces_are_preserved_literally() {
        let cmd = render_hook(&task("issue"), "echo {{literal}} {role_q}", id_core::DEFAULT_HOOK_CMD).unwrap();
        assert!(cmd.contains("{literal}"));
    }
}
