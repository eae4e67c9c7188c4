#![allow(dead_code)]

use rstest::fixture;
use rstudio_manager::client::hpc::{FakeInterface, JobSubmission};
use rstudio_manager::client::session_store::SessionStore;
use rstudio_manager::config::RstudioConfig;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Comment that marks session jobs in every test
pub const TAG: &str = "rstudio_manager";

/// A session store in a temporary directory plus an in-memory scheduler
pub struct TestEnv {
    pub dir: TempDir,
    pub config: RstudioConfig,
    pub store: SessionStore,
    pub hpc: FakeInterface,
}

impl TestEnv {
    /// Same environment, but with job IDs starting at `first`
    pub fn with_first_job_id(mut self, first: u64) -> Self {
        self.hpc = FakeInterface::with_first_job_id(first);
        self
    }
}

#[fixture]
pub fn test_env() -> TestEnv {
    let dir = TempDir::new().unwrap();
    let image = dir.path().join("rstudio_4.3.1.sif");
    fs::write(&image, "").unwrap();

    let mut config = RstudioConfig::default();
    config.client.session_store = dir.path().join("store");
    config.client.poll_interval_secs = 1;
    config.container.image = Some(image);
    config.slurm.job_comment = TAG.to_string();

    let store = SessionStore::new(&config.client.session_store, TAG);
    TestEnv {
        dir,
        config,
        store,
        hpc: FakeInterface::new(),
    }
}

/// Value of `--flag=` in a submission
pub fn submitted_flag(submission: &JobSubmission, flag: &str) -> Option<String> {
    let prefix = format!("{}=", flag);
    submission
        .args
        .iter()
        .find_map(|a| a.strip_prefix(&prefix).map(str::to_string))
}

/// Job output log the scheduler was told to write
pub fn output_path(submission: &JobSubmission) -> PathBuf {
    PathBuf::from(submitted_flag(submission, "--output").unwrap())
}

/// Value of an exported environment variable in a submission
pub fn exported(submission: &JobSubmission, name: &str) -> Option<String> {
    submission
        .exports
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.clone())
}
