//! GitHub Actions workflow client bound to a single configured workflow.
//!
//! `workflow_run` holds the read-only run projection; `workflow_client`
//! defines the `WorkflowApi` seam and its reqwest implementation.

pub mod workflow_client;
pub mod workflow_run;

pub use workflow_client::{
    GithubWorkflowClient, GithubWorkflowClientConfig, RequestOutcome, WorkflowApi,
    WorkflowClientError, WorkflowTarget, DEFAULT_GITHUB_API_BASE,
};
pub use workflow_run::{WorkflowRun, WorkflowRunList, WorkflowRunStatus};
