//! Types shared by the scheduler interfaces

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scheduler-agnostic job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HpcJobStatus {
    /// Waiting for resources
    Queued,
    Running,
    /// Finished normally or shutting down
    Complete,
    /// Failed, cancelled, timed out, or killed by the node
    Failed,
    /// The scheduler reported a state we do not map
    Unknown,
    /// The scheduler does not know the job
    None,
}

impl HpcJobStatus {
    /// True once the job can no longer reach the running state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HpcJobStatus::Complete | HpcJobStatus::Failed | HpcJobStatus::None
        )
    }
}

impl fmt::Display for HpcJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HpcJobStatus::Queued => "queued",
            HpcJobStatus::Running => "running",
            HpcJobStatus::Complete => "complete",
            HpcJobStatus::Failed => "failed",
            HpcJobStatus::Unknown => "unknown",
            HpcJobStatus::None => "none",
        };
        write!(f, "{}", s)
    }
}

/// A single job as reported by the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HpcJobInfo {
    pub job_id: String,
    pub job_name: String,
    pub status: HpcJobStatus,
    /// Free-form comment attached at submission, used to tag session jobs
    pub comment: String,
}

impl HpcJobInfo {
    pub fn new(job_id: String, job_name: String, status: HpcJobStatus, comment: String) -> Self {
        Self {
            job_id,
            job_name,
            status,
            comment,
        }
    }

    /// Info for a job the scheduler does not know about
    pub fn none() -> Self {
        Self {
            job_id: String::new(),
            job_name: String::new(),
            status: HpcJobStatus::None,
            comment: String::new(),
        }
    }
}

/// Everything the scheduler needs to queue one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSubmission {
    /// Scheduler flags, in the order they are passed
    pub args: Vec<String>,
    /// Environment variables exported to the job, in insertion order.
    /// Values may contain commas (bind specs), so they travel through the
    /// submitting process environment rather than the `--export` list.
    pub exports: Vec<(String, String)>,
    /// Batch script to run
    pub script: std::path::PathBuf,
}
