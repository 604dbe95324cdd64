// SPDX-License-Identifier: MIT OR Apache-2.0
//! Domain types, error taxonomy, and signed-payload verification shared by
//! every issue-dispatcher crate. If you only take one dependency, take this
//! one.

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod followup;
pub mod processed_state;
pub mod routing_config;
pub mod signature;
pub mod webhook;

pub use config::{DispatcherConfig, DEFAULT_HOOK_CMD};
pub use error::DispatcherError;
pub use followup::{FollowupStore, FollowupTask, TaskEvent, TaskStatus};
pub use processed_state::ProcessedState;
pub use routing_config::{IssueRule, PrRule, RoutingConfig};
pub use signature::verify_signature;
pub use webhook::{
    Comment, Issue, IssuePrMarker, Label, PullRequest, Repository, Review, Sender, WebhookPayload,
    CTRL_CORE_SENTINEL, EVENTS_ALLOWED, FEEDBACK_ACTIONS_ALLOWED, ISSUE_ACTIONS_ALLOWED,
    REQUIRED_ACTION_CHECKLIST,
};
