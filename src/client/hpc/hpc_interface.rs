//! Trait implemented by every scheduler backend

use anyhow::Result;
use std::collections::HashMap;

use super::common::{HpcJobInfo, JobSubmission};

/// Operations the session manager needs from a batch scheduler.
///
/// `submit` is at-most-once: callers must never retry it, since a failure
/// after the scheduler accepted the job would queue a duplicate.
pub trait HpcInterface {
    /// Queue a job and return the scheduler-assigned job ID.
    fn submit(&self, submission: &JobSubmission) -> Result<String>;

    /// Current state of one job. Unknown jobs yield [`HpcJobInfo::none`].
    fn get_status(&self, job_id: &str) -> Result<HpcJobInfo>;

    /// All jobs the scheduler currently knows for this user, keyed by job ID.
    fn list_jobs(&self) -> Result<HashMap<String, HpcJobInfo>>;

    /// Cancel a job. Cancelling a job that no longer exists is not an error.
    fn cancel_job(&self, job_id: &str) -> Result<()>;
}
