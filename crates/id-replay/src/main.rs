// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use id_core::DispatcherConfig;
use id_replay::{check_webhook_ingress, replay_failed_deliveries, verify_webhook_events, GithubApi};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "issue-dispatcher-replay", version, about = "Webhook delivery replay and subscription auditing")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay recent failed webhook deliveries for a repository's hook.
    Replay {
        /// `owner/repo`.
        #[arg(long)]
        repo: String,
        /// Webhook ID to replay deliveries for.
        #[arg(long)]
        hook_id: i64,
    },
    /// Scan recent webhook deliveries for a burst of 5xx responses.
    IngressCheck {
        /// `owner/repo`.
        #[arg(long)]
        repo: String,
        /// Webhook ID to inspect.
        #[arg(long)]
        hook_id: i64,
        /// Minutes of delivery history to scan.
        #[arg(long, default_value_t = 20)]
        lookback_minutes: i64,
        /// Post an alert comment to this issue number if failures are found.
        #[arg(long)]
        alert_issue: Option<i64>,
    },
    /// Verify (and optionally repair) a repository's webhook event subscriptions.
    VerifyEvents {
        /// `owner/repo`.
        #[arg(long)]
        repo: String,
        /// Webhook ID to check; omit to select by URL substring or uniqueness.
        #[arg(long)]
        hook_id: Option<i64>,
        /// Find the webhook by a substring of its delivery URL.
        #[arg(long)]
        url_contains: Option<String>,
        /// Patch the webhook to add any missing required events.
        #[arg(long)]
        apply: bool,
    },
}

fn split_repo(repo: &str) -> Result<(&str, &str)> {
    repo.split_once('/').context("--repo must be owner/repo")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::new("info")).init();

    let args = Args::parse();
    let config = DispatcherConfig::from_env();
    if config.forge_token.is_empty() {
        anyhow::bail!("GITHUB_TOKEN is required");
    }
    let api = GithubApi::new(config.forge_token.clone());

    match args.command {
        Command::Replay { repo, hook_id } => {
            let (owner, name) = split_repo(&repo)?;
            let summary = replay_failed_deliveries(
                &api,
                owner,
                name,
                hook_id,
                config.replay_lookback_hours,
                config.replay_max,
            )
            .await?;
            let ok = summary.get("ok").and_then(serde_json::Value::as_bool).unwrap_or(false);
            println!("{}", serde_json::to_string(&summary)?);
            if !ok {
                std::process::exit(1);
            }
        }
        Command::IngressCheck {
            repo,
            hook_id,
            lookback_minutes,
            alert_issue,
        } => {
            let (owner, name) = split_repo(&repo)?;
            let summary = check_webhook_ingress(&api, owner, name, hook_id, lookback_minutes, alert_issue).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            let failed = summary
                .get("failed_5xx")
                .and_then(serde_json::Value::as_array)
                .map(|a| !a.is_empty())
                .unwrap_or(false);
            if failed {
                std::process::exit(1);
            }
        }
        Command::VerifyEvents {
            repo,
            hook_id,
            url_contains,
            apply,
        } => {
            let Ok((owner, name)) = split_repo(&repo) else {
                eprintln!("error: --repo must be owner/repo");
                std::process::exit(2);
            };
            let outcome = match verify_webhook_events(&api, owner, name, hook_id, url_contains.as_deref(), apply).await {
                Ok(o) => o,
                Err(err) => {
                    eprintln!("error: {err}");
                    std::process::exit(2);
                }
            };
            println!("hook_id={}", outcome.hook_id);
            println!("url={}", outcome.url);
            println!("current_events={:?}", outcome.current_events);
            if outcome.missing.is_empty() {
                println!("status=ok all required events present");
            } else if outcome.patched {
                println!("status=patched missing={:?}", outcome.missing);
            } else {
                println!("status=missing required_events={:?}", outcome.missing);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
