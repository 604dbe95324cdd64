// SPDX-License-Identifier: MIT OR Apache-2.0
//! Subprocess dispatch invocation: run a rendered hook command under a
//! shell, capture its output, and interpret its result marker.

use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// The marker line a hook script prints to report its outcome, e.g.
/// `OPENCLAW_DISPATCH_RESULT {"status":"ok"}`.
const MARKER_PREFIX: &str = "OPENCLAW_DISPATCH_RESULT ";

/// Outcome of running a hook command to completion (or timeout).
#[derive(Debug)]
pub struct HookOutcome {
    /// Process exit code, or `None` if it was killed on timeout.
    pub exit_code: Option<i32>,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
    /// `true` if the command was killed after exceeding `timeout`.
    pub timed_out: bool,
}

/// Run `cmd` under `sh -c`, capturing output and enforcing `timeout`.
///
/// On timeout the child is killed and `timed_out` is set; `exit_code` is
/// `None` in that case.
pub async fn run_hook(cmd: &str, timeout: Duration) -> std::io::Result<HookOutcome> {
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let mut stdout_pipe = child.stdout.take().expect("stdout piped");
    let mut stderr_pipe = child.stderr.take().expect("stderr piped");

    let run = async {
        let mut stdout = String::new();
        let mut stderr = String::new();
        let (stdout_res, stderr_res, status) = tokio::join!(
            stdout_pipe.read_to_string(&mut stdout),
            stderr_pipe.read_to_string(&mut stderr),
            child.wait(),
        );
        stdout_res?;
        stderr_res?;
        let status = status?;
        Ok::<_, std::io::Error>((stdout, stderr, status))
    };

    match tokio::time::timeout(timeout, run).await {
        Ok(Ok((stdout, stderr, status))) => Ok(HookOutcome {
            exit_code: status.code(),
            stdout,
            stderr,
            timed_out: false,
        }),
        Ok(Err(err)) => Err(err),
        Err(_elapsed) => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            Ok(HookOutcome {
                exit_code: None,
                stdout: String::new(),
                stderr: String::new(),
                timed_out: true,
            })
        }
    }
}

/// Scan `stdout` from the last line backward for the dispatch result
/// marker, returning its parsed JSON payload if found and well-formed.
pub fn extract_dispatch_marker(stdout: &str) -> Option<Value> {
    stdout
        .lines()
        .rev()
        .find(|line| line.starts_with(MARKER_PREFIX))
        .and_then(|line| serde_json::from_str(&line[MARKER_PREFIX.len()..]).ok())
}

/// A dispatch is only successful with a clean exit and an explicit
/// `{"status": "ok"}` marker — a zero exit code alone is not enough.
pub fn dispatch_ok(exit_code: Option<i32>, marker: Option<&Value>) -> bool {
    exit_code == Some(0) && marker.and_then(|m| m.get("status")).and_then(Value::as_str) == Some("ok")
}
