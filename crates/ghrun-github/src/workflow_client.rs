use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Map, Value};

use crate::workflow_run::WorkflowRunList;

pub const DEFAULT_GITHUB_API_BASE: &str = "https://api.github.com";
const GITHUB_API_VERSION: &str = "2022-11-28";
const DEFAULT_RUNS_PER_PAGE: u8 = 10;
const ERROR_BODY_MAX_CHARS: usize = 300;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
/// Failures raised by the workflow client.
pub enum WorkflowClientError {
    #[error("github api {operation} failed{}: {message}", status_suffix(.status))]
    Upstream {
        operation: &'static str,
        status: Option<u16>,
        message: String,
    },
    #[error("credential cannot be sent as an authorization header")]
    InvalidCredential,
    #[error("failed to build github client: {0}")]
    Client(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status
        .map(|status| format!(" with status {status}"))
        .unwrap_or_default()
}

impl WorkflowClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => *status,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Result of a dispatch or rerun request. Rejections are data, not errors.
pub struct RequestOutcome {
    pub accepted: bool,
    pub status: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// The single workflow the bot operates on.
pub struct WorkflowTarget {
    pub owner: String,
    pub repo: String,
    pub workflow: String,
}

impl WorkflowTarget {
    pub fn slug(&self) -> String {
        format!("{}/{}:{}", self.owner, self.repo, self.workflow)
    }
}

/// Operations the command handler needs from the CI provider.
///
/// Every call is authorized with the caller-supplied token and is attempted
/// exactly once.
#[async_trait]
pub trait WorkflowApi: Send + Sync {
    async fn list_runs(&self, token: &str) -> Result<WorkflowRunList, WorkflowClientError>;

    async fn dispatch(
        &self,
        token: &str,
        git_ref: &str,
        inputs: &BTreeMap<String, String>,
    ) -> Result<RequestOutcome, WorkflowClientError>;

    async fn rerun(&self, token: &str, run_id: u64) -> Result<RequestOutcome, WorkflowClientError>;
}

#[derive(Debug, Clone)]
pub struct GithubWorkflowClientConfig {
    pub api_base: String,
    pub target: WorkflowTarget,
    pub request_timeout_ms: u64,
    pub runs_per_page: u8,
}

impl GithubWorkflowClientConfig {
    pub fn new(target: WorkflowTarget) -> Self {
        Self {
            api_base: DEFAULT_GITHUB_API_BASE.to_string(),
            target,
            request_timeout_ms: 15_000,
            runs_per_page: DEFAULT_RUNS_PER_PAGE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GithubWorkflowClient {
    http: reqwest::Client,
    api_base: String,
    target: WorkflowTarget,
    runs_per_page: u8,
}

impl GithubWorkflowClient {
    pub fn new(config: GithubWorkflowClientConfig) -> Result<Self, WorkflowClientError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("ghrun-workflow-bot"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            reqwest::header::HeaderValue::from_static(GITHUB_API_VERSION),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()
            .map_err(|error| WorkflowClientError::Client(error.to_string()))?;
        Ok(Self {
            http,
            api_base: config.api_base.trim().trim_end_matches('/').to_string(),
            target: config.target,
            runs_per_page: config.runs_per_page.max(1),
        })
    }

    pub fn target(&self) -> &WorkflowTarget {
        &self.target
    }

    fn workflow_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/actions/workflows/{}",
            self.api_base, self.target.owner, self.target.repo, self.target.workflow
        )
    }

    fn run_url(&self, run_id: u64) -> String {
        format!(
            "{}/repos/{}/{}/actions/runs/{run_id}",
            self.api_base, self.target.owner, self.target.repo
        )
    }

    async fn send(
        &self,
        operation: &'static str,
        token: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, WorkflowClientError> {
        let auth_header =
            reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token.trim()))
                .map_err(|_| WorkflowClientError::InvalidCredential)?;
        request
            .header(reqwest::header::AUTHORIZATION, auth_header)
            .send()
            .await
            .map_err(|error| {
                tracing::warn!(operation, error = %error, "github api request failed");
                WorkflowClientError::Upstream {
                    operation,
                    status: None,
                    message: error.to_string(),
                }
            })
    }
}

fn truncate_for_error(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated = text.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}

#[async_trait]
impl WorkflowApi for GithubWorkflowClient {
    async fn list_runs(&self, token: &str) -> Result<WorkflowRunList, WorkflowClientError> {
        const OPERATION: &str = "list workflow runs";
        let per_page = self.runs_per_page.to_string();
        let request = self
            .http
            .get(format!("{}/runs", self.workflow_url()))
            .query(&[("per_page", per_page.as_str())]);
        let response = self.send(OPERATION, token, request).await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WorkflowClientError::Upstream {
                operation: OPERATION,
                status: Some(status.as_u16()),
                message: truncate_for_error(&body, ERROR_BODY_MAX_CHARS),
            });
        }
        response
            .json::<WorkflowRunList>()
            .await
            .map_err(|error| WorkflowClientError::Upstream {
                operation: OPERATION,
                status: Some(status.as_u16()),
                message: format!("failed to decode response: {error}"),
            })
    }

    async fn dispatch(
        &self,
        token: &str,
        git_ref: &str,
        inputs: &BTreeMap<String, String>,
    ) -> Result<RequestOutcome, WorkflowClientError> {
        let mut payload = json!({ "ref": git_ref });
        if !inputs.is_empty() {
            let inputs = inputs
                .iter()
                .map(|(key, value)| (key.clone(), Value::String(value.clone())))
                .collect::<Map<String, Value>>();
            payload["inputs"] = Value::Object(inputs);
        }
        let request = self
            .http
            .post(format!("{}/dispatches", self.workflow_url()))
            .json(&payload);
        let response = self.send("dispatch workflow", token, request).await?;
        let status = response.status();
        let accepted = status == StatusCode::NO_CONTENT || status == StatusCode::CREATED;
        tracing::debug!(
            workflow = %self.target.slug(),
            git_ref,
            status = status.as_u16(),
            accepted,
            "workflow dispatch answered"
        );
        Ok(RequestOutcome {
            accepted,
            status: status.as_u16(),
        })
    }

    async fn rerun(&self, token: &str, run_id: u64) -> Result<RequestOutcome, WorkflowClientError> {
        let request = self.http.post(format!("{}/rerun", self.run_url(run_id)));
        let response = self.send("rerun workflow run", token, request).await?;
        let status = response.status();
        let accepted = status == StatusCode::CREATED || status == StatusCode::ACCEPTED;
        tracing::debug!(
            workflow = %self.target.slug(),
            run_id,
            status = status.as_u16(),
            accepted,
            "workflow rerun answered"
        );
        Ok(RequestOutcome {
            accepted,
            status: status.as_u16(),
        })
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;

    use super::*;
    use crate::workflow_run::WorkflowRunStatus;

    const RUNS_PATH: &str = "/repos/octo/widgets/actions/workflows/ci.yml/runs";
    const DISPATCH_PATH: &str = "/repos/octo/widgets/actions/workflows/ci.yml/dispatches";

    fn client_for(api_base: String) -> GithubWorkflowClient {
        let mut config = GithubWorkflowClientConfig::new(WorkflowTarget {
            owner: "octo".to_string(),
            repo: "widgets".to_string(),
            workflow: "ci.yml".to_string(),
        });
        config.api_base = api_base;
        config.request_timeout_ms = 2_000;
        GithubWorkflowClient::new(config).expect("client")
    }

    #[tokio::test]
    async fn functional_list_runs_sends_bearer_token_and_parses_runs() {
        let server = MockServer::start();
        let runs = server.mock(|when, then| {
            when.method(GET)
                .path(RUNS_PATH)
                .query_param("per_page", "10")
                .header("authorization", "Bearer ghp_user")
                .header("accept", "application/vnd.github+json");
            then.status(200).json_body(json!({
                "total_count": 1,
                "workflow_runs": [{"id": 77, "status": "completed", "conclusion": "success"}]
            }));
        });

        let list = client_for(server.base_url())
            .list_runs("ghp_user")
            .await
            .expect("list runs");
        runs.assert();
        assert_eq!(list.total_count, 1);
        let latest = list.latest().expect("latest");
        assert_eq!(latest.id, 77);
        assert_eq!(latest.status, WorkflowRunStatus::Completed);
        assert_eq!(latest.conclusion.as_deref(), Some("success"));
    }

    #[tokio::test]
    async fn regression_list_runs_non_success_is_upstream_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path(RUNS_PATH);
            then.status(401).body("{\"message\":\"Bad credentials\"}");
        });

        let error = client_for(server.base_url())
            .list_runs("ghp_bad")
            .await
            .expect_err("401 must fail");
        assert_eq!(error.status(), Some(401));
        assert!(error.to_string().contains("Bad credentials"));
    }

    #[tokio::test]
    async fn functional_dispatch_posts_ref_and_inputs() {
        let server = MockServer::start();
        let dispatch = server.mock(|when, then| {
            when.method(POST)
                .path(DISPATCH_PATH)
                .json_body(json!({"ref": "release", "inputs": {"env": "staging"}}));
            then.status(204);
        });

        let inputs = BTreeMap::from([("env".to_string(), "staging".to_string())]);
        let outcome = client_for(server.base_url())
            .dispatch("ghp_user", "release", &inputs)
            .await
            .expect("dispatch");
        dispatch.assert();
        assert_eq!(
            outcome,
            RequestOutcome {
                accepted: true,
                status: 204
            }
        );
    }

    #[tokio::test]
    async fn functional_dispatch_without_inputs_omits_inputs_field() {
        let server = MockServer::start();
        let dispatch = server.mock(|when, then| {
            when.method(POST)
                .path(DISPATCH_PATH)
                .json_body(json!({"ref": "main"}));
            then.status(204);
        });
        let outcome = client_for(server.base_url())
            .dispatch("ghp_user", "main", &BTreeMap::new())
            .await
            .expect("dispatch");
        dispatch.assert();
        assert!(outcome.accepted);
    }

    #[tokio::test]
    async fn regression_dispatch_rejection_is_reported_not_raised() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path(DISPATCH_PATH);
            then.status(422)
                .body("{\"message\":\"Workflow does not have 'workflow_dispatch' trigger\"}");
        });
        let outcome = client_for(server.base_url())
            .dispatch("ghp_user", "main", &BTreeMap::new())
            .await
            .expect("rejection is not an error");
        assert_eq!(
            outcome,
            RequestOutcome {
                accepted: false,
                status: 422
            }
        );
    }

    #[tokio::test]
    async fn functional_rerun_accepts_created_and_rejects_forbidden() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/repos/octo/widgets/actions/runs/41/rerun");
            then.status(201);
        });
        server.mock(|when, then| {
            when.method(POST).path("/repos/octo/widgets/actions/runs/42/rerun");
            then.status(403);
        });
        let client = client_for(server.base_url());

        let accepted = client.rerun("ghp_user", 41).await.expect("rerun 41");
        assert!(accepted.accepted);
        let rejected = client.rerun("ghp_user", 42).await.expect("rerun 42");
        assert_eq!(
            rejected,
            RequestOutcome {
                accepted: false,
                status: 403
            }
        );
    }

    #[tokio::test]
    async fn regression_network_failure_is_upstream_error_without_status() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let error = client_for(format!("http://{addr}"))
            .list_runs("ghp_user")
            .await
            .expect_err("closed port must fail");
        assert!(matches!(
            error,
            WorkflowClientError::Upstream { status: None, .. }
        ));
    }

    #[tokio::test]
    async fn regression_token_with_newline_is_rejected_before_sending() {
        let server = MockServer::start();
        let runs = server.mock(|when, then| {
            when.method(GET).path(RUNS_PATH);
            then.status(200).json_body(json!({"total_count": 0, "workflow_runs": []}));
        });
        let error = client_for(server.base_url())
            .list_runs("ghp_a\nInjected: header")
            .await
            .expect_err("invalid header must fail");
        assert_eq!(error, WorkflowClientError::InvalidCredential);
        runs.assert_calls(0);
    }
}
