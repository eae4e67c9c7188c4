//! Launcher - drives one RStudio session from submission to a reachable server.
//!
//! [`Launcher::launch`] is a sequential state machine:
//!
//! ```text
//! Submitting -> AwaitingSchedule -> AwaitingEndpoint -> AwaitingLiveness -> Ready
//! ```
//!
//! Any state can end in `Failed` or `Cancelled`.
//!
//! 1. **Submitting**: the job is handed to the scheduler once. Submission is
//!    never retried; a failure that happened after the scheduler accepted the
//!    job would otherwise queue a duplicate. A pending interrupt stops the
//!    launch before anything is submitted.
//! 2. **AwaitingSchedule**: the session record is written straight away, then
//!    the job state is polled until it runs. A terminal state is fatal.
//! 3. **AwaitingEndpoint**: the job output log is polled until the server has
//!    written its first line, `host:port`. The URL and token are then stored.
//! 4. **AwaitingLiveness**: the URL is probed until a connection succeeds.
//!
//! # Cancellation
//!
//! Waits are unbounded. The only way out other than success or failure is the
//! [`CancellationFlag`], which is checked at every poll boundary. From the
//! moment the scheduler returns a job ID, a [`JobGuard`] owns the job: any
//! early exit (cancellation, error, panic) cancels the scheduler job before
//! the error propagates. The guard is released only on `Ready`.
//!
//! # Example: Signal Handler Registration
//!
//! ```ignore
//! use signal_hook::consts::{SIGINT, SIGTERM};
//! use signal_hook::iterator::Signals;
//!
//! let cancel = CancellationFlag::new();
//! let flag = cancel.clone();
//! let mut signals = Signals::new([SIGINT, SIGTERM])?;
//! std::thread::spawn(move || {
//!     for _ in signals.forever() {
//!         flag.cancel();
//!     }
//! });
//!
//! let mut launcher = Launcher::new(&slurm, &store, &ThreadSleeper, &probe, cancel, interval);
//! let session = launcher.launch(&request)?;
//! ```

use log::{debug, error, info, trace, warn};
use std::fmt;
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use thiserror::Error;

use super::hpc::{HpcInterface, HpcJobStatus, JobSubmission};
use super::resource_request::ResourceRequest;
use super::session::{Session, SessionError};
use super::session_store::SessionStore;

/// Blocks between polls. Tests substitute closures so no real time passes.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

impl<F: Fn(Duration)> Sleeper for F {
    fn sleep(&self, duration: Duration) {
        self(duration)
    }
}

/// Decides whether a session URL accepts connections
pub trait LivenessProbe {
    fn is_alive(&self, url: &str) -> bool;
}

impl<F: Fn(&str) -> bool> LivenessProbe for F {
    fn is_alive(&self, url: &str) -> bool {
        self(url)
    }
}

/// Probes by opening a TCP connection to the URL's host and port
#[derive(Debug, Clone, Copy)]
pub struct TcpProbe {
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl LivenessProbe for TcpProbe {
    fn is_alive(&self, url: &str) -> bool {
        let authority = url
            .split_once("://")
            .map_or(url, |(_, rest)| rest)
            .split('/')
            .next()
            .unwrap_or_default();

        let addrs = match authority.to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                trace!("Cannot resolve {}: {}", authority, e);
                return false;
            }
        };

        addrs
            .into_iter()
            .any(|addr| TcpStream::connect_timeout(&addr, self.timeout).is_ok())
    }
}

/// Shared flag that asks an in-progress launch to stop.
///
/// Clones share the same flag, so one can be handed to a signal thread.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchState {
    Submitting,
    AwaitingSchedule,
    AwaitingEndpoint,
    AwaitingLiveness,
    Ready,
    Failed,
    Cancelled,
}

impl fmt::Display for LaunchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LaunchState::Submitting => "submitting",
            LaunchState::AwaitingSchedule => "awaiting-schedule",
            LaunchState::AwaitingEndpoint => "awaiting-endpoint",
            LaunchState::AwaitingLiveness => "awaiting-liveness",
            LaunchState::Ready => "ready",
            LaunchState::Failed => "failed",
            LaunchState::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("job submission failed: {0:#}")]
    Submission(anyhow::Error),
    #[error("job {job_id} failed to schedule correctly (state: {status})")]
    SchedulingFailed { job_id: String, status: HpcJobStatus },
    #[error("job {job_id} ended before RStudio came up (state: {status})")]
    JobEnded { job_id: String, status: HpcJobStatus },
    #[error("launch was interrupted before a job was submitted")]
    Interrupted,
    #[error("launch of job {job_id} was interrupted")]
    Cancelled { job_id: String },
    #[error("first line of {} is not host:port: '{line}'", .path.display())]
    BadEndpoint { path: PathBuf, line: String },
    #[error("failed to read job output {}: {error}", .path.display())]
    Log { path: PathBuf, error: io::Error },
    #[error("scheduler query for job {job_id} failed: {error:#}")]
    Scheduler { job_id: String, error: anyhow::Error },
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Everything needed to start one session
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    /// Conda environment providing R
    pub conda_env: String,
    /// Container image path or reference
    pub image: String,
    /// Extra singularity bind spec, may be empty
    pub bind_paths: String,
    /// Session password
    pub token: String,
    pub job_name: String,
    pub request: ResourceRequest,
    /// File the scheduler writes job output to
    pub log_path: PathBuf,
    /// Remember `log_path` in the session record
    pub keep_log: bool,
    /// Batch script to submit
    pub job_template: PathBuf,
}

impl LaunchRequest {
    /// Scheduler submission for this request, tagged with `job_comment`
    pub fn submission(&self, job_comment: &str) -> JobSubmission {
        JobSubmission {
            args: self
                .request
                .submission_args(&self.job_name, &self.log_path, job_comment),
            exports: vec![
                ("PASSWORD".to_string(), self.token.clone()),
                ("RSTUDIO_SIF".to_string(), self.image.clone()),
                ("BIND_PATHS".to_string(), self.bind_paths.clone()),
                ("CONDA_ENV".to_string(), self.conda_env.clone()),
            ],
            script: self.job_template.clone(),
        }
    }
}

/// Owns a submitted job until the launch succeeds; cancels it otherwise
pub struct JobGuard<'a> {
    hpc: &'a dyn HpcInterface,
    job_id: String,
    armed: bool,
}

impl<'a> JobGuard<'a> {
    pub fn new(hpc: &'a dyn HpcInterface, job_id: &str) -> Self {
        Self {
            hpc,
            job_id: job_id.to_string(),
            armed: true,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Keep the job running after the guard goes away
    pub fn release(mut self) {
        self.armed = false;
    }
}

impl Drop for JobGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!("Cancelling job {}", self.job_id);
        if let Err(e) = self.hpc.cancel_job(&self.job_id) {
            error!("Failed to cancel job {}: {:#}", self.job_id, e);
        }
    }
}

pub struct Launcher<'a> {
    hpc: &'a dyn HpcInterface,
    store: &'a SessionStore,
    sleeper: &'a dyn Sleeper,
    probe: &'a dyn LivenessProbe,
    cancel: CancellationFlag,
    poll_interval: Duration,
    state: LaunchState,
}

impl<'a> Launcher<'a> {
    pub fn new(
        hpc: &'a dyn HpcInterface,
        store: &'a SessionStore,
        sleeper: &'a dyn Sleeper,
        probe: &'a dyn LivenessProbe,
        cancel: CancellationFlag,
        poll_interval: Duration,
    ) -> Self {
        Self {
            hpc,
            store,
            sleeper,
            probe,
            cancel,
            poll_interval,
            state: LaunchState::Submitting,
        }
    }

    pub fn state(&self) -> LaunchState {
        self.state
    }

    fn transition(&mut self, to: LaunchState) {
        debug!("Launch state {} -> {}", self.state, to);
        self.state = to;
    }

    /// Run the whole launch and return the ready session
    pub fn launch(&mut self, request: &LaunchRequest) -> Result<Session, LaunchError> {
        self.transition(LaunchState::Submitting);
        let result = self.run(request);
        match &result {
            Ok(_) => self.transition(LaunchState::Ready),
            Err(LaunchError::Interrupted | LaunchError::Cancelled { .. }) => {
                self.transition(LaunchState::Cancelled)
            }
            Err(_) => self.transition(LaunchState::Failed),
        }
        result
    }

    fn run(&mut self, request: &LaunchRequest) -> Result<Session, LaunchError> {
        if self.cancel.is_cancelled() {
            warn!("Interrupted before submitting");
            return Err(LaunchError::Interrupted);
        }

        info!("Submitting the job");
        let submission = request.submission(self.store.job_comment());
        let job_id = self
            .hpc
            .submit(&submission)
            .map_err(LaunchError::Submission)?;
        let guard = JobGuard::new(self.hpc, &job_id);
        // An interrupt during sbatch must not leave a record behind
        self.check_cancelled(&job_id)?;

        let mut session = Session::new(&job_id, &request.job_name);
        if request.keep_log {
            session.log_path = Some(request.log_path.clone());
        }
        self.store.write(&session)?;

        self.transition(LaunchState::AwaitingSchedule);
        info!("Waiting for job {} to schedule", job_id);
        self.await_schedule(&job_id)?;

        self.transition(LaunchState::AwaitingEndpoint);
        info!("Waiting for RStudio to launch");
        let endpoint = self.await_endpoint(&job_id, &request.log_path)?;
        session.url = Some(format!("http://{}", endpoint));
        session.token = Some(request.token.clone());
        self.store.write(&session)?;

        self.transition(LaunchState::AwaitingLiveness);
        info!("Waiting for {} to accept connections", endpoint);
        self.await_liveness(&job_id, session.url_or_empty())?;

        guard.release();
        info!("RStudio is running");
        Ok(session)
    }

    fn check_cancelled(&self, job_id: &str) -> Result<(), LaunchError> {
        if self.cancel.is_cancelled() {
            warn!("Interrupted while {}", self.state);
            return Err(LaunchError::Cancelled {
                job_id: job_id.to_string(),
            });
        }
        Ok(())
    }

    fn job_status(&self, job_id: &str) -> Result<HpcJobStatus, LaunchError> {
        self.hpc
            .get_status(job_id)
            .map(|info| info.status)
            .map_err(|error| LaunchError::Scheduler {
                job_id: job_id.to_string(),
                error,
            })
    }

    /// Fail if the job stopped while we wait on its output
    fn ensure_job_alive(&self, job_id: &str) -> Result<(), LaunchError> {
        let status = self.job_status(job_id)?;
        if status.is_terminal() {
            return Err(LaunchError::JobEnded {
                job_id: job_id.to_string(),
                status,
            });
        }
        Ok(())
    }

    fn await_schedule(&self, job_id: &str) -> Result<(), LaunchError> {
        loop {
            self.check_cancelled(job_id)?;
            let status = self.job_status(job_id)?;
            trace!("Job {} is {}", job_id, status);
            match status {
                HpcJobStatus::Running => return Ok(()),
                s if s.is_terminal() => {
                    return Err(LaunchError::SchedulingFailed {
                        job_id: job_id.to_string(),
                        status: s,
                    });
                }
                _ => self.sleeper.sleep(self.poll_interval),
            }
        }
    }

    fn await_endpoint(&self, job_id: &str, log_path: &Path) -> Result<String, LaunchError> {
        loop {
            self.check_cancelled(job_id)?;
            if let Some(line) = read_first_line(log_path)? {
                return parse_endpoint(&line).ok_or_else(|| LaunchError::BadEndpoint {
                    path: log_path.to_path_buf(),
                    line,
                });
            }
            self.ensure_job_alive(job_id)?;
            self.sleeper.sleep(self.poll_interval);
        }
    }

    fn await_liveness(&self, job_id: &str, url: &str) -> Result<(), LaunchError> {
        loop {
            self.check_cancelled(job_id)?;
            if self.probe.is_alive(url) {
                return Ok(());
            }
            self.ensure_job_alive(job_id)?;
            self.sleeper.sleep(self.poll_interval);
        }
    }
}

/// First complete line of the job output, or `None` while nothing is written
fn read_first_line(path: &Path) -> Result<Option<String>, LaunchError> {
    let log_err = |error| LaunchError::Log {
        path: path.to_path_buf(),
        error,
    };

    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(log_err(e)),
    };
    if file.metadata().map_err(log_err)?.len() == 0 {
        return Ok(None);
    }

    let mut line = String::new();
    BufReader::new(file).read_line(&mut line).map_err(log_err)?;
    // Wait for the newline so a half-written line is never used
    if !line.ends_with('\n') {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// Accept `host:port` with a numeric port
fn parse_endpoint(line: &str) -> Option<String> {
    let (host, port) = line.rsplit_once(':')?;
    if host.is_empty() || host.contains(char::is_whitespace) {
        return None;
    }
    port.parse::<u16>().ok()?;
    Some(line.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use tempfile::TempDir;

    #[test]
    fn test_parse_endpoint() {
        assert_eq!(parse_endpoint("node07:8787"), Some("node07:8787".to_string()));
        assert_eq!(
            parse_endpoint("node07.cluster.local:41234"),
            Some("node07.cluster.local:41234".to_string())
        );
        assert_eq!(parse_endpoint("node07"), None);
        assert_eq!(parse_endpoint("node07:http"), None);
        assert_eq!(parse_endpoint(":8787"), None);
        assert_eq!(parse_endpoint("WARNING: something:1"), None);
    }

    #[test]
    fn test_read_first_line_waits_for_newline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("job.log");
        assert!(read_first_line(&path).unwrap().is_none());

        fs::write(&path, "").unwrap();
        assert!(read_first_line(&path).unwrap().is_none());

        fs::write(&path, "node07:87").unwrap();
        assert!(read_first_line(&path).unwrap().is_none());

        fs::write(&path, "node07:8787\nstarting rserver\n").unwrap();
        assert_eq!(
            read_first_line(&path).unwrap(),
            Some("node07:8787".to_string())
        );
    }

    #[test]
    fn test_cancellation_flag_is_shared() {
        let flag = CancellationFlag::new();
        let clone = flag.clone();
        assert!(!flag.is_cancelled());
        clone.cancel();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn test_tcp_probe() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let probe = TcpProbe::new(Duration::from_secs(1));
        assert!(probe.is_alive(&format!("http://127.0.0.1:{}", port)));

        drop(listener);
        assert!(!probe.is_alive("http://host.invalid:1"));
    }
}
