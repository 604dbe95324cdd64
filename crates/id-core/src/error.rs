// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error taxonomy for the issue-dispatcher service.

/// Errors surfaced by routing, persistence, and dispatch-template rendering.
///
/// HTTP-facing code (`id-daemon`) maps each variant to a status code once,
/// via `ApiError`, rather than string-matching messages.
#[derive(Debug, thiserror::Error)]
pub enum DispatcherError {
    /// The routing rule-set file does not exist on disk.
    #[error("routing file missing: {path}")]
    RoutingFileMissing {
        /// Path that was configured.
        path: String,
    },

    /// The routing rule-set file exists but could not be parsed.
    #[error("routing file invalid: {reason}")]
    RoutingFileInvalid {
        /// Human-readable parse failure detail.
        reason: String,
    },

    /// The inbound event/payload is not a recognized PR-feedback shape.
    #[error("payload is not PR feedback")]
    NotPrFeedback,

    /// The configured hook command template references an unsupported key.
    #[error("hook command template has unsupported placeholders: {names:?}")]
    UnsupportedPlaceholder {
        /// Sorted list of unknown placeholder names.
        names: Vec<String>,
    },

    /// A state file could not be written.
    #[error("failed to persist {path}: {reason}")]
    PersistenceFailed {
        /// Path that failed to write.
        path: String,
        /// Underlying failure detail.
        reason: String,
    },

    /// The inbound payload was missing a required `issue` or `repository` field.
    #[error("missing issue/repo in payload")]
    MissingIssueOrRepo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_placeholder_message_lists_names() {
        let err = DispatcherError::UnsupportedPlaceholder {
            names: vec!["foo".into(), "bar".into()],
        };
        assert!(err.to_string().contains("foo"));
        assert!(err.to_string().contains("bar"));
    }

    #[test]
    fn routing_file_missing_includes_path() {
        let err = DispatcherError::RoutingFileMissing {
            path: ".openclaw/issue-routing.yaml".into(),
        };
        assert!(err.to_string().contains(".openclaw/issue-routing.yaml"));
    }
}
