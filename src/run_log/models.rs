use crate::resource::Resource;
use serde::Serialize;
use std::fmt;

/// Status of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Failure,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failure => "failure",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "running" => Some(RunStatus::Running),
            "success" => Some(RunStatus::Success),
            "failure" => Some(RunStatus::Failure),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row of the `pipeline_runs` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunMetadata {
    pub run_id: i64,
    pub pipeline_name: String,
    pub resource: Resource,
    /// Unix timestamp (seconds).
    pub started_at: i64,
    pub ended_at: Option<i64>,
    pub status: RunStatus,
    pub rows_extracted: u64,
    pub rows_loaded: u64,
    pub error_message: Option<String>,
    /// Snapshot of the resource plan the run was started with.
    pub config: serde_json::Value,
    /// Log lines emitted while the run was open, when captured.
    pub logs: Option<String>,
}

/// Proof that a run was started and has not been ended yet.
///
/// Not `Clone`: ending a run consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct RunHandle {
    pub(super) run_id: i64,
    pub(super) resource: Resource,
}

impl RunHandle {
    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    pub fn resource(&self) -> Resource {
        self.resource
    }
}
