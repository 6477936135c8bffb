use std::fmt;

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "Option<String>")]
/// Enumerates supported `WorkflowRunStatus` values.
pub enum WorkflowRunStatus {
    Queued,
    InProgress,
    Completed,
    Other(String),
}

impl From<Option<String>> for WorkflowRunStatus {
    fn from(value: Option<String>) -> Self {
        match value.as_deref().map(str::trim) {
            Some("queued") => Self::Queued,
            Some("in_progress") => Self::InProgress,
            Some("completed") => Self::Completed,
            Some(other) if !other.is_empty() => Self::Other(other.to_string()),
            _ => Self::Other("unknown".to_string()),
        }
    }
}

impl WorkflowRunStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Other(value) => value.as_str(),
        }
    }

    /// Runs in these states block a new dispatch.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::InProgress)
    }
}

impl fmt::Display for WorkflowRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkflowRun {
    pub id: u64,
    #[serde(default = "unknown_status")]
    pub status: WorkflowRunStatus,
    #[serde(default)]
    pub conclusion: Option<String>,
    #[serde(default)]
    pub head_branch: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
}

fn unknown_status() -> WorkflowRunStatus {
    WorkflowRunStatus::from(None)
}

/// Page of runs for the configured workflow, most recent first.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkflowRunList {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default, rename = "workflow_runs")]
    pub runs: Vec<WorkflowRun>,
}

impl WorkflowRunList {
    pub fn latest(&self) -> Option<&WorkflowRun> {
        self.runs.first()
    }

    pub fn is_empty(&self) -> bool {
        self.total_count == 0 || self.runs.is_empty()
    }
}
