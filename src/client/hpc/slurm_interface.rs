//! Slurm scheduler interface implementation

use anyhow::{Context, Result};
use log::{debug, info, trace, warn};
use regex::Regex;
use std::collections::HashMap;
use std::env;
use std::process::Command;
use std::thread;
use std::time::Duration;

use super::common::{HpcJobInfo, HpcJobStatus, JobSubmission};
use super::hpc_interface::HpcInterface;
use crate::client::launcher::CancellationFlag;
use crate::config::SlurmConfig;

/// squeue output format: job ID, name, state, comment
const SQUEUE_FORMAT: &str = "%i|%j|%T|%k";
const SQUEUE_FIELD_COUNT: usize = 4;

/// Errors from Slurm that mean the job is already gone
const JOB_GONE_ERRORS: &[&str] = &[
    "Invalid job id specified",
    "already completing or completed",
];

/// Attempts and delay for a read-only squeue call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RetryPolicy {
    attempts: usize,
    delay: Duration,
}

/// Status checks run inside the launch wait loops, so they stay short
const STATUS_RETRY: RetryPolicy = RetryPolicy {
    attempts: 3,
    delay: Duration::from_secs(2),
};

const LIST_RETRY: RetryPolicy = RetryPolicy {
    attempts: 6,
    delay: Duration::from_secs(10),
};

/// Slurm scheduler implementation
pub struct SlurmInterface {
    user: String,
    sbatch: String,
    squeue: String,
    scancel: String,
    sbatch_regex: Regex,
    cancel: CancellationFlag,
}

impl SlurmInterface {
    /// Create a new Slurm interface using the executables named in `config`
    pub fn new(config: &SlurmConfig) -> Result<Self> {
        let user = env::var("USER")
            .or_else(|_| env::var("USERNAME"))
            .context("Cannot determine the current user from USER or USERNAME")?;
        let sbatch_regex = Regex::new(r"Submitted batch job (\d+)")?;

        Ok(Self {
            user,
            sbatch: config.sbatch.clone(),
            squeue: config.squeue.clone(),
            scancel: config.scancel.clone(),
            sbatch_regex,
            cancel: CancellationFlag::new(),
        })
    }

    /// Stop retrying failed queries once `cancel` is set
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Map Slurm status to HpcJobStatus
    fn map_status(slurm_status: &str) -> HpcJobStatus {
        match slurm_status {
            "PENDING" | "CONFIGURING" | "REQUEUED" | "REQUEUE_HOLD" | "REQUEUE_FED"
            | "RESV_DEL_HOLD" | "SUSPENDED" => HpcJobStatus::Queued,
            "RUNNING" => HpcJobStatus::Running,
            "COMPLETED" | "COMPLETING" => HpcJobStatus::Complete,
            "FAILED" | "CANCELLED" | "TIMEOUT" | "NODE_FAIL" | "OUT_OF_MEMORY" | "BOOT_FAIL"
            | "DEADLINE" | "PREEMPTED" | "REVOKED" => HpcJobStatus::Failed,
            _ => HpcJobStatus::Unknown,
        }
    }

    /// Parse one line of `squeue --format=SQUEUE_FORMAT` output
    fn parse_squeue_line(line: &str) -> Option<HpcJobInfo> {
        let fields: Vec<&str> = line.trim().splitn(SQUEUE_FIELD_COUNT, '|').collect();
        if fields.len() != SQUEUE_FIELD_COUNT || fields[0].is_empty() {
            return None;
        }

        // squeue prints "(null)" for an unset comment
        let comment = match fields[3].trim() {
            "(null)" => String::new(),
            c => c.to_string(),
        };

        Some(HpcJobInfo::new(
            fields[0].trim().to_string(),
            fields[1].trim().to_string(),
            Self::map_status(fields[2].trim()),
            comment,
        ))
    }

    fn is_job_gone(output: &str) -> bool {
        JOB_GONE_ERRORS.iter().any(|err| output.contains(err))
    }

    /// Run a read-only command with retries for transient errors.
    ///
    /// A cancelled launch gets the failed result straight away instead of
    /// waiting out the remaining retries.
    fn run_command_with_retries(
        &self,
        cmd: &str,
        args: &[&str],
        retry: RetryPolicy,
        ignore_errors: &[&str],
    ) -> Result<(i32, String, String)> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            trace!("Running command: {} {:?} (attempt {})", cmd, args, attempts);

            let output = Command::new(cmd)
                .args(args)
                .output()
                .with_context(|| format!("Failed to run {}", cmd))?;

            let stdout = String::from_utf8_lossy(&output.stdout).to_string();
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            let return_code = output.status.code().unwrap_or(-1);

            let should_ignore = ignore_errors
                .iter()
                .any(|err| stderr.contains(err) || stdout.contains(err));

            if return_code == 0
                || should_ignore
                || attempts >= retry.attempts
                || self.cancel.is_cancelled()
            {
                return Ok((return_code, stdout, stderr));
            }

            warn!(
                "Command failed (attempt {}/{}): {} - {}",
                attempts, retry.attempts, return_code, stderr
            );

            thread::sleep(retry.delay);
        }
    }
}

impl HpcInterface for SlurmInterface {
    fn submit(&self, submission: &JobSubmission) -> Result<String> {
        let script = submission.script.to_string_lossy();
        let mut args: Vec<&str> = submission.args.iter().map(String::as_str).collect();
        args.push("--export=ALL");
        args.push(&script);

        trace!("Running command: {} {:?}", self.sbatch, args);
        // No retries: a failed submission may still have queued a job
        let output = Command::new(&self.sbatch)
            .args(&args)
            .envs(submission.exports.iter().map(|(k, v)| (k, v)))
            .output()
            .with_context(|| format!("Failed to run {}", self.sbatch))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let raw = format!("{}\n{}", stdout.trim(), stderr.trim());
            return Err(anyhow::anyhow!(
                "sbatch exited with status {}: {}",
                output.status.code().unwrap_or(-1),
                raw.trim()
            ));
        }

        match self.sbatch_regex.captures(&stdout).and_then(|c| c.get(1)) {
            Some(job_id) => {
                debug!("sbatch accepted job {}", job_id.as_str());
                Ok(job_id.as_str().to_string())
            }
            None => Err(anyhow::anyhow!(
                "Failed to parse job ID from sbatch output: {}",
                stdout.trim()
            )),
        }
    }

    fn get_status(&self, job_id: &str) -> Result<HpcJobInfo> {
        let (return_code, stdout, stderr) = self.run_command_with_retries(
            &self.squeue,
            &["-h", "-j", job_id, "--format", SQUEUE_FORMAT],
            STATUS_RETRY,
            JOB_GONE_ERRORS,
        )?;

        if return_code != 0 {
            if Self::is_job_gone(&stderr) {
                return Ok(HpcJobInfo::none());
            }

            return Err(anyhow::anyhow!(
                "squeue command failed: {} - {}",
                return_code,
                stderr
            ));
        }

        trace!("squeue output: [{}]", stdout);
        Ok(stdout
            .lines()
            .filter_map(Self::parse_squeue_line)
            .find(|info| info.job_id == job_id)
            .unwrap_or_else(HpcJobInfo::none))
    }

    fn list_jobs(&self) -> Result<HashMap<String, HpcJobInfo>> {
        let (return_code, stdout, stderr) = self.run_command_with_retries(
            &self.squeue,
            &["-h", "-u", &self.user, "--format", SQUEUE_FORMAT],
            LIST_RETRY,
            &[],
        )?;

        if return_code != 0 {
            return Err(anyhow::anyhow!(
                "squeue command failed: {} - {}",
                return_code,
                stderr
            ));
        }

        trace!("squeue output: [{}]", stdout);

        let mut jobs = HashMap::new();
        for line in stdout.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match Self::parse_squeue_line(line) {
                Some(info) => {
                    jobs.insert(info.job_id.clone(), info);
                }
                None => warn!("Skipping malformed squeue line: {}", line),
            }
        }

        Ok(jobs)
    }

    fn cancel_job(&self, job_id: &str) -> Result<()> {
        trace!("Running command: {} {}", self.scancel, job_id);
        let output = Command::new(&self.scancel)
            .arg(job_id)
            .output()
            .with_context(|| format!("Failed to run {}", self.scancel))?;

        if output.status.success() {
            info!("Cancelled Slurm job {}", job_id);
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if Self::is_job_gone(&stderr) {
            debug!("Slurm job {} was already gone", job_id);
            return Ok(());
        }

        Err(anyhow::anyhow!(
            "Failed to cancel Slurm job {}: {}",
            job_id,
            stderr.trim()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn interface_with_squeue(squeue: &str, cancel: CancellationFlag) -> SlurmInterface {
        SlurmInterface {
            user: "tester".to_string(),
            sbatch: "sbatch".to_string(),
            squeue: squeue.to_string(),
            scancel: "scancel".to_string(),
            sbatch_regex: Regex::new(r"Submitted batch job (\d+)").unwrap(),
            cancel,
        }
    }

    #[test]
    fn test_status_retries_stay_short() {
        let worst_case = STATUS_RETRY.delay * (STATUS_RETRY.attempts as u32 - 1);
        assert!(worst_case <= Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn test_cancelled_status_query_does_not_retry() {
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let slurm = interface_with_squeue("false", cancel);

        let started = Instant::now();
        let result = slurm.get_status("12345");
        assert!(result.is_err());
        assert!(started.elapsed() < STATUS_RETRY.delay);
    }

    #[test]
    fn test_map_status() {
        assert_eq!(SlurmInterface::map_status("PENDING"), HpcJobStatus::Queued);
        assert_eq!(SlurmInterface::map_status("RUNNING"), HpcJobStatus::Running);
        assert_eq!(
            SlurmInterface::map_status("COMPLETED"),
            HpcJobStatus::Complete
        );
        assert_eq!(SlurmInterface::map_status("TIMEOUT"), HpcJobStatus::Failed);
        assert_eq!(SlurmInterface::map_status("CANCELLED"), HpcJobStatus::Failed);
        assert_eq!(SlurmInterface::map_status("WEIRD"), HpcJobStatus::Unknown);
    }

    #[test]
    fn test_parse_squeue_line() {
        let info = SlurmInterface::parse_squeue_line("12345|rstudio_server|RUNNING|rstudio_manager")
            .unwrap();
        assert_eq!(info.job_id, "12345");
        assert_eq!(info.job_name, "rstudio_server");
        assert_eq!(info.status, HpcJobStatus::Running);
        assert_eq!(info.comment, "rstudio_manager");
    }

    #[test]
    fn test_parse_squeue_line_null_comment() {
        let info = SlurmInterface::parse_squeue_line("42|other|PENDING|(null)").unwrap();
        assert_eq!(info.status, HpcJobStatus::Queued);
        assert!(info.comment.is_empty());
    }

    #[test]
    fn test_parse_squeue_line_comment_with_separator() {
        let info = SlurmInterface::parse_squeue_line("7|job|RUNNING|a|b").unwrap();
        assert_eq!(info.comment, "a|b");
    }

    #[test]
    fn test_parse_squeue_line_malformed() {
        assert!(SlurmInterface::parse_squeue_line("12345 RUNNING").is_none());
        assert!(SlurmInterface::parse_squeue_line("").is_none());
    }

    #[test]
    fn test_is_job_gone() {
        assert!(SlurmInterface::is_job_gone(
            "slurm_load_jobs error: Invalid job id specified"
        ));
        assert!(SlurmInterface::is_job_gone(
            "scancel: error: Kill job error on job id 1: Job/step already completing or completed"
        ));
        assert!(!SlurmInterface::is_job_gone("Socket timed out"));
    }
}
