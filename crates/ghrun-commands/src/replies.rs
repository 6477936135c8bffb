use ghrun_github::{WorkflowClientError, WorkflowRun};

pub const ACCESS_DENIED: &str = "Access denied.";
pub const TOKEN_SAVED: &str = "Token saved (encrypted).";
pub const TOKEN_DELETED: &str = "Your token has been deleted.";
pub const NO_TOKEN_AVAILABLE: &str = "No token available (neither personal nor global).";
pub const NO_RUNS_FOUND: &str = "No workflow runs found.";
pub const UNKNOWN_COMMAND: &str = "Unknown command. Send /help for the list of commands.";
pub const STORAGE_UNAVAILABLE: &str = "Token storage is unavailable right now, try again later.";
pub const TOKEN_NOT_SAVED: &str = "Could not save the token, try again later.";
pub const TOKEN_NOT_USABLE: &str =
    "GitHub error: the token cannot be sent as an authorization header.";

pub fn render_usage() -> String {
    [
        "/addtoken <token> - store your GitHub token (encrypted)",
        "/deltoken - delete your stored token",
        "/mytoken_status - latest workflow run, using your token",
        "/run [ref] [key=value ...] - start the workflow (uses your token when stored)",
    ]
    .join("\n")
}

pub fn render_latest_run(run: &WorkflowRun) -> String {
    let mut lines = vec![
        format!("Latest run id={}", run.id),
        format!("status={}", run.status),
        format!("conclusion={}", run.conclusion.as_deref().unwrap_or("-")),
    ];
    if let Some(branch) = run.head_branch.as_deref() {
        lines.push(format!("branch={branch}"));
    }
    if let Some(url) = run.html_url.as_deref() {
        lines.push(url.to_string());
    }
    lines.join("\n")
}

pub fn render_already_running(run: &WorkflowRun) -> String {
    format!(
        "Workflow is already running (run {}, status {}).",
        run.id, run.status
    )
}

pub fn render_dispatched(git_ref: &str) -> String {
    format!("Workflow requested on ref {git_ref}.")
}

pub fn render_rerun_started(run_id: u64) -> String {
    format!("Workflow rerun started for run {run_id}.")
}

pub fn render_rerun_failed(status: u16) -> String {
    format!("Could not rerun workflow: status {status}.")
}

pub fn render_dispatch_failed(status: u16) -> String {
    format!("Could not start workflow: status {status}.")
}

pub fn render_upstream_error(error: &WorkflowClientError) -> String {
    match error {
        WorkflowClientError::Upstream {
            status: Some(status),
            ..
        } => format!("GitHub error: status {status}."),
        WorkflowClientError::Upstream { message, .. } => format!("GitHub error: {message}"),
        WorkflowClientError::InvalidCredential => TOKEN_NOT_USABLE.to_string(),
        WorkflowClientError::Client(message) => format!("GitHub error: {message}"),
    }
}

#[cfg(test)]
mod tests {
    use ghrun_github::WorkflowRunStatus;

    use super::*;

    #[test]
    fn unit_latest_run_uses_dash_for_missing_conclusion() {
        let run = WorkflowRun {
            id: 12,
            status: WorkflowRunStatus::InProgress,
            conclusion: None,
            head_branch: None,
            html_url: None,
        };
        assert_eq!(
            render_latest_run(&run),
            "Latest run id=12\nstatus=in_progress\nconclusion=-"
        );
    }

    #[test]
    fn unit_upstream_error_prefers_status() {
        let error = WorkflowClientError::Upstream {
            operation: "list workflow runs",
            status: Some(404),
            message: "Not Found".to_string(),
        };
        assert_eq!(render_upstream_error(&error), "GitHub error: status 404.");
    }
}
