// SPDX-License-Identifier: MIT OR Apache-2.0
//! Capability-injected forge client.
//!
//! The HTTP receiver holds a `dyn ForgeOps` rather than calling a concrete
//! REST/GraphQL client directly, so tests can inject a fake instead of
//! monkey-patching module-level functions.

#![deny(unsafe_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::warn;

const REST_TIMEOUT: Duration = Duration::from_secs(15);
const GRAPHQL_TIMEOUT: Duration = Duration::from_secs(20);

/// The forge operations the dispatcher needs, injected at construction so
/// tests can pass a fake implementation.
#[async_trait]
pub trait ForgeOps: Send + Sync {
    /// GET a REST endpoint relative to the API base, returning the parsed
    /// JSON body or `None` on any failure (including a missing token).
    async fn read_json(&self, path: &str) -> Option<Value>;

    /// POST a GraphQL document, returning its `data` field or `None` on
    /// any failure.
    async fn graphql(&self, query: &str, variables: Value) -> Option<Value>;

    /// Post a comment on an issue or pull request. Failures are logged and
    /// swallowed — a failed comment must never abort a dispatch flow.
    async fn post_comment(&self, repo: &str, number: i64, body: &str);

    /// `true` only if every review thread on the PR is resolved; `None` on
    /// query failure.
    async fn all_threads_resolved(&self, repo: &str, pr_number: i64) -> Option<bool>;

    /// `true` only if the last commit's combined/rollup check state is a
    /// success; `None` if unavailable.
    async fn checks_green(&self, repo: &str, pr_number: i64) -> Option<bool>;

    /// The most recent review state left by the designated security
    /// reviewer, or `None` if they haven't reviewed.
    async fn latest_security_review_state(&self, repo: &str, pr_number: i64, reviewer_login: &str) -> Option<String>;

    /// Changed file paths for a pull request; empty on any failure.
    async fn pr_file_paths(&self, repo: &str, pr_number: i64) -> Vec<String>;
}

/// Live `reqwest`-backed implementation talking to a GitHub-compatible forge.
pub struct GithubForgeClient {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl GithubForgeClient {
    /// Construct a client against `api_base` (e.g. `https://api.github.com`)
    /// authenticating with `token`. An empty token disables every call,
    /// matching the original's `if not GH_TOKEN: return None` guards.
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into(),
            token: token.into(),
        }
    }

    fn authed_get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .timeout(REST_TIMEOUT)
            .header("Accept", "application/vnd.github+json")
            .header("Authorization", format!("Bearer {}", self.token))
    }
}

#[async_trait]
impl ForgeOps for GithubForgeClient {
    async fn read_json(&self, path: &str) -> Option<Value> {
        if self.token.is_empty() {
            return None;
        }
        let url = format!("{}{}", self.api_base, path);
        let resp = self.authed_get(&url).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        resp.json::<Value>().await.ok()
    }

    async fn graphql(&self, query: &str, variables: Value) -> Option<Value> {
        if self.token.is_empty() {
            return None;
        }
        let url = format!("{}/graphql", self.api_base);
        let body = json!({ "query": query, "variables": variables });
        let resp = self
            .client
            .post(&url)
            .timeout(GRAPHQL_TIMEOUT)
            .header("Accept", "application/vnd.github+json")
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let payload: Value = resp.json().await.ok()?;
        payload.get("data").cloned()
    }

    async fn post_comment(&self, repo: &str, number: i64, body: &str) {
        if self.token.is_empty() {
            return;
        }
        let url = format!("{}/repos/{}/issues/{}/comments", self.api_base, repo, number);
        let result = self
            .client
            .post(&url)
            .timeout(REST_TIMEOUT)
            .header("Accept", "application/vnd.github+json")
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Content-Type", "application/json")
            .json(&json!({ "body": body }))
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => warn!(repo, number, status = %resp.status(), "failed to post comment"),
            Err(err) => warn!(repo, number, error = %err, "failed to post comment"),
        }
    }

    async fn all_threads_resolved(&self, repo: &str, pr_number: i64) -> Option<bool> {
        let (owner, name) = repo.split_once('/')?;
        let query = r#"
        query($owner:String!, $name:String!, $number:Int!) {
          repository(owner:$owner, name:$name) {
            pullRequest(number:$number) {
              reviewThreads(first:100) {
                nodes { isResolved }
              }
            }
          }
        }
        "#;
        let data = self
            .graphql(query, json!({ "owner": owner, "name": name, "number": pr_number }))
            .await?;
        let nodes = data
            .get("repository")?
            .get("pullRequest")?
            .get("reviewThreads")?
            .get("nodes")?
            .as_array()?;
        Some(nodes.iter().all(|n| n.get("isResolved").and_then(Value::as_bool).unwrap_or(false)))
    }

    async fn checks_green(&self, repo: &str, pr_number: i64) -> Option<bool> {
        let rest = self.read_json(&format!("/repos/{repo}/commits/HEAD/status")).await;

        let Some((owner, name)) = repo.split_once('/') else {
            return rest.and_then(|d| d.get("state").and_then(Value::as_str).map(|s| s == "success"));
        };
        let query = r#"
        query($owner:String!, $name:String!, $number:Int!) {
          repository(owner:$owner, name:$name) {
            pullRequest(number:$number) {
              commits(last:1) {
                nodes {
                  commit {
                    statusCheckRollup { state }
                  }
                }
              }
            }
          }
        }
        "#;
        let gql = self
            .graphql(query, json!({ "owner": owner, "name": name, "number": pr_number }))
            .await;

        if let Some(state) = gql.as_ref().and_then(|d| {
            d.get("repository")?
                .get("pullRequest")?
                .get("commits")?
                .get("nodes")?
                .as_array()?
                .first()?
                .get("commit")?
                .get("statusCheckRollup")?
                .get("state")?
                .as_str()
        }) {
            return Some(state == "SUCCESS");
        }

        rest.and_then(|d| d.get("state").and_then(Value::as_str).map(|s| s == "success"))
    }

    async fn latest_security_review_state(&self, repo: &str, pr_number: i64, reviewer_login: &str) -> Option<String> {
        let reviews = self.read_json(&format!("/repos/{repo}/pulls/{pr_number}/reviews")).await?;
        let reviews = reviews.as_array()?;
        reviews
            .iter()
            .rev()
            .find(|r| {
                r.get("user")
                    .and_then(|u| u.get("login"))
                    .and_then(Value::as_str)
                    == Some(reviewer_login)
            })
            .and_then(|r| r.get("state").and_then(Value::as_str))
            .map(|s| s.to_string())
    }

    async fn pr_file_paths(&self, repo: &str, pr_number: i64) -> Vec<String> {
        let Some(Value::Array(files)) = self.read_json(&format!("/repos/{repo}/pulls/{pr_number}/files")).await
        else {
            return Vec::new();
        };
        files
            .iter()
            .filter_map(|f| f.get("filename").and_then(Value::as_str))
            .map(|s| s.to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn empty_token_disables_every_call() {
        let client = GithubForgeClient::new("https://api.github.com", "");
        assert!(client.read_json("/repos/a/b").await.is_none());
        assert!(client.graphql("query{}", json!({})).await.is_none());
        assert!(client.all_threads_resolved("a/b", 1).await.is_none());
    }

    #[tokio::test]
    async fn read_json_parses_success_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/a/b/pulls/1/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"filename": "src/lib.rs"}])))
            .mount(&server)
            .await;

        let client = GithubForgeClient::new(server.uri(), "token");
        let paths = client.pr_file_paths("a/b", 1).await;
        assert_eq!(paths, vec!["src/lib.rs".to_string()]);
    }

    #[tokio::test]
    async fn pr_file_paths_empty_on_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/a/b/pulls/1/files"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = GithubForgeClient::new(server.uri(), "token");
        assert!(client.pr_file_paths("a/b", 1).await.is_empty());
    }

    #[tokio::test]
    async fn all_threads_resolved_true_when_every_node_resolved() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "repository": {
                        "pullRequest": {
                            "reviewThreads": {
                                "nodes": [{"isResolved": true}, {"isResolved": true}]
                            }
                        }
                    }
                }
            })))
            .mount(&server)
            .await;

        let client = GithubForgeClient::new(server.uri(), "token");
        assert_eq!(client.all_threads_resolved("a/b", 1).await, Some(true));
    }

    #[tokio::test]
    async fn all_threads_resolved_false_when_one_node_unresolved() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "repository": {
                        "pullRequest": {
                            "reviewThreads": {
                                "nodes": [{"isResolved": true}, {"isResolved": false}]
                            }
                        }
                    }
                }
            })))
            .mount(&server)
            .await;

        let client = GithubForgeClient::new(server.uri(), "token");
        assert_eq!(client.all_threads_resolved("a/b", 1).await, Some(false));
    }

    #[tokio::test]
    async fn latest_security_review_state_finds_most_recent_by_reviewer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/a/b/pulls/1/reviews"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"user": {"login": "locktrace"}, "state": "CHANGES_REQUESTED"},
                {"user": {"login": "someone-else"}, "state": "APPROVED"},
                {"user": {"login": "locktrace"}, "state": "APPROVED"},
            ])))
            .mount(&server)
            .await;

        let client = GithubForgeClient::new(server.uri(), "token");
        let state = client.latest_security_review_state("a/b", 1, "locktrace").await;
        assert_eq!(state.as_deref(), Some("APPROVED"));
    }
}
