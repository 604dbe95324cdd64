// SPDX-License-Identifier: MIT OR Apache-2.0
//! Hook command rendering and subprocess dispatch invocation.

#![deny(unsafe_code)]

pub mod command_template;
pub mod invoke;

pub use command_template::{render_hook, HookTask};
pub use invoke::{dispatch_ok, extract_dispatch_marker, run_hook, HookOutcome};
