//! In-memory scheduler used in tests
//!
//! Jobs live in a map guarded by a mutex. Each job carries a script of
//! states: every status query advances the script by one step and the last
//! state sticks, so a test can describe "pending, pending, running" up front.

use anyhow::Result;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::common::{HpcJobInfo, HpcJobStatus, JobSubmission};
use super::hpc_interface::HpcInterface;

#[derive(Debug, Clone)]
struct FakeJob {
    name: String,
    comment: String,
    states: VecDeque<HpcJobStatus>,
}

impl FakeJob {
    fn current(&self) -> HpcJobStatus {
        self.states.front().copied().unwrap_or(HpcJobStatus::Running)
    }

    fn advance(&mut self) -> HpcJobStatus {
        let status = self.current();
        if self.states.len() > 1 {
            self.states.pop_front();
        }
        status
    }
}

#[derive(Debug, Default)]
struct FakeState {
    next_job_id: u64,
    jobs: HashMap<String, FakeJob>,
    submissions: Vec<JobSubmission>,
    cancelled: Vec<String>,
    next_states: Vec<HpcJobStatus>,
    submit_error: Option<String>,
}

/// Scheduler that keeps every job in memory
#[derive(Debug)]
pub struct FakeInterface {
    state: Mutex<FakeState>,
}

impl Default for FakeInterface {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeInterface {
    pub fn new() -> Self {
        Self::with_first_job_id(1000)
    }

    /// Start numbering submitted jobs from `first`
    pub fn with_first_job_id(first: u64) -> Self {
        Self {
            state: Mutex::new(FakeState {
                next_job_id: first,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        // A panicking test thread must not hide the fake's state from others
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// State script for the next submitted job. Defaults to always running.
    pub fn script_next_job(&self, states: Vec<HpcJobStatus>) {
        self.lock().next_states = states;
    }

    /// Make every following submission fail with `message`
    pub fn fail_submissions(&self, message: &str) {
        self.lock().submit_error = Some(message.to_string());
    }

    /// Register a job as if some earlier submission had created it
    pub fn add_job(&self, job_id: &str, name: &str, status: HpcJobStatus, comment: &str) {
        self.lock().jobs.insert(
            job_id.to_string(),
            FakeJob {
                name: name.to_string(),
                comment: comment.to_string(),
                states: VecDeque::from([status]),
            },
        );
    }

    /// Every submission received, in order
    pub fn submissions(&self) -> Vec<JobSubmission> {
        self.lock().submissions.clone()
    }

    /// Every job ID passed to `cancel_job`, in order
    pub fn cancelled(&self) -> Vec<String> {
        self.lock().cancelled.clone()
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.lock().jobs.contains_key(job_id)
    }
}

/// Pull the `--job-name` and `--comment` values out of submission flags
fn flag_value(args: &[String], flag: &str) -> String {
    let prefix = format!("{}=", flag);
    args.iter()
        .find_map(|a| a.strip_prefix(&prefix))
        .unwrap_or_default()
        .to_string()
}

impl HpcInterface for FakeInterface {
    fn submit(&self, submission: &JobSubmission) -> Result<String> {
        let mut state = self.lock();
        if let Some(message) = &state.submit_error {
            return Err(anyhow::anyhow!("sbatch exited with status 1: {}", message));
        }

        let job_id = state.next_job_id.to_string();
        state.next_job_id += 1;

        let states = std::mem::take(&mut state.next_states);
        state.jobs.insert(
            job_id.clone(),
            FakeJob {
                name: flag_value(&submission.args, "--job-name"),
                comment: flag_value(&submission.args, "--comment"),
                states: VecDeque::from(states),
            },
        );
        state.submissions.push(submission.clone());
        Ok(job_id)
    }

    fn get_status(&self, job_id: &str) -> Result<HpcJobInfo> {
        let mut state = self.lock();
        Ok(match state.jobs.get_mut(job_id) {
            Some(job) => {
                let status = job.advance();
                HpcJobInfo::new(
                    job_id.to_string(),
                    job.name.clone(),
                    status,
                    job.comment.clone(),
                )
            }
            None => HpcJobInfo::none(),
        })
    }

    fn list_jobs(&self) -> Result<HashMap<String, HpcJobInfo>> {
        let state = self.lock();
        Ok(state
            .jobs
            .iter()
            .map(|(id, job)| {
                (
                    id.clone(),
                    HpcJobInfo::new(id.clone(), job.name.clone(), job.current(), job.comment.clone()),
                )
            })
            .collect())
    }

    fn cancel_job(&self, job_id: &str) -> Result<()> {
        let mut state = self.lock();
        state.jobs.remove(job_id);
        state.cancelled.push(job_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn submission(name: &str) -> JobSubmission {
        JobSubmission {
            args: vec![
                format!("--job-name={}", name),
                "--comment=rstudio_manager".to_string(),
            ],
            exports: vec![],
            script: PathBuf::from("job.sh"),
        }
    }

    #[test]
    fn test_status_script_advances_and_sticks() {
        let fake = FakeInterface::new();
        fake.script_next_job(vec![HpcJobStatus::Queued, HpcJobStatus::Running]);
        let job_id = fake.submit(&submission("a")).unwrap();

        assert_eq!(fake.get_status(&job_id).unwrap().status, HpcJobStatus::Queued);
        assert_eq!(fake.get_status(&job_id).unwrap().status, HpcJobStatus::Running);
        assert_eq!(fake.get_status(&job_id).unwrap().status, HpcJobStatus::Running);
    }

    #[test]
    fn test_submit_records_name_and_comment() {
        let fake = FakeInterface::with_first_job_id(12345);
        let job_id = fake.submit(&submission("my_session")).unwrap();
        assert_eq!(job_id, "12345");

        let info = fake.get_status("12345").unwrap();
        assert_eq!(info.job_name, "my_session");
        assert_eq!(info.comment, "rstudio_manager");
    }

    #[test]
    fn test_cancel_unknown_job_is_ok() {
        let fake = FakeInterface::new();
        assert!(fake.cancel_job("999").is_ok());
        assert_eq!(fake.cancelled(), vec!["999".to_string()]);
        assert_eq!(fake.get_status("999").unwrap().status, HpcJobStatus::None);
    }

    #[test]
    fn test_failed_submission_creates_no_job() {
        let fake = FakeInterface::new();
        fake.fail_submissions("invalid partition");
        let err = fake.submit(&submission("a")).unwrap_err();
        assert!(err.to_string().contains("invalid partition"));
        assert!(fake.list_jobs().unwrap().is_empty());
    }
}
