// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shape of the declarative routing rule-set file (an external collaborator;
//! this crate only defines how it deserializes and loads).

use serde::Deserialize;
use std::path::Path;

use crate::error::DispatcherError;

/// A rule matching an issue to a role.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct IssueRule {
    /// Case-insensitive exact label match; any one hit selects this rule.
    #[serde(default)]
    pub any_labels: Vec<String>,
    /// Case-insensitive substring match against the issue title.
    #[serde(default)]
    pub title_contains: Vec<String>,
    /// Case-insensitive substring match against the issue body.
    #[serde(default)]
    pub body_contains: Vec<String>,
    /// Role to assign when this rule matches.
    pub role: Option<String>,
}

/// A rule matching a pull request to a role.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PrRule {
    /// Case-insensitive exact label match.
    #[serde(default)]
    pub any_labels: Vec<String>,
    /// Case-insensitive substring match against any changed file path.
    #[serde(default)]
    pub any_paths: Vec<String>,
    /// Case-insensitive substring match against the PR title.
    #[serde(default)]
    pub title_contains: Vec<String>,
    /// Case-insensitive substring match against the PR body.
    #[serde(default)]
    pub body_contains: Vec<String>,
    /// Role to assign when this rule matches.
    pub role: Option<String>,
}

/// The routing rule-set, loaded fresh per request per the original design
/// (the file is a small external collaborator, not cached).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RoutingConfig {
    /// Fallback role for issues with no confident rule match.
    #[serde(default)]
    pub default_role: Option<String>,
    /// Fallback role for PR-feedback with no rule match.
    #[serde(default)]
    pub default_pr_role: Option<String>,
    /// Ordered issue-routing rules; first match order is evaluation order,
    /// but all matches are collected before a decision is made (see
    /// `id-routing::route_issue`).
    #[serde(default)]
    pub rules: Vec<IssueRule>,
    /// Ordered PR-feedback routing rules; first match wins.
    #[serde(default)]
    pub pr_rules: Vec<PrRule>,
}

impl RoutingConfig {
    /// Load and parse the routing file from disk.
    ///
    /// Returns [`DispatcherError::RoutingFileMissing`] if the path does not
    /// exist, or [`DispatcherError::RoutingFileInvalid`] if it cannot be
    /// parsed as YAML.
    pub fn load(path: &Path) -> Result<Self, DispatcherError> {
        if !path.exists() {
            return Err(DispatcherError::RoutingFileMissing {
                path: path.display().to_string(),
            });
        }
        let raw = std::fs::read_to_string(path).map_err(|e| DispatcherError::RoutingFileInvalid {
            reason: e.to_string(),
        })?;
        serde_yaml::from_str(&raw).map_err(|e| DispatcherError::RoutingFileInvalid {
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_file_errors() {
        let err = RoutingConfig::load(Path::new("/nonexistent/issue-routing.yaml")).unwrap_err();
        assert!(matches!(err, DispatcherError::RoutingFileMissing { .. }));
    }

    #[test]
    fn parses_minimal_yaml() {
        let cfg: RoutingConfig = serde_yaml::from_str(
            "default_role: ctrl^core\nrules:\n  - title_contains: [ci]\n    role: pipewire\n",
        )
        .unwrap();
        assert_eq!(cfg.default_role.as_deref(), Some("ctrl^core"));
        assert_eq!(cfg.rules.len(), 1);
        assert_eq!(cfg.rules[0].role.as_deref(), Some("pipewire"));
    }

    #[test]
    fn empty_document_yields_defaults() {
        let cfg: RoutingConfig = serde_yaml::from_str("{}").unwrap();
        assert!(cfg.rules.is_empty());
        assert!(cfg.pr_rules.is_empty());
    }
}
