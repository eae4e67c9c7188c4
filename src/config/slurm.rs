//! Slurm configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::client::hpc::HpcPartition;

/// Configuration for talking to the scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlurmConfig {
    /// Path to the sbatch executable
    pub sbatch: String,

    /// Path to the squeue executable
    pub squeue: String,

    /// Path to the scancel executable
    pub scancel: String,

    /// Partition used when `start` is not given one
    pub default_partition: String,

    /// Batch script to submit instead of the bundled template
    pub job_template: Option<PathBuf>,

    /// Comment attached to every session job so it can be told apart
    pub job_comment: String,

    /// Partitions that replace or extend the built-in limits
    pub partitions: Vec<HpcPartition>,
}

impl Default for SlurmConfig {
    fn default() -> Self {
        Self {
            sbatch: "sbatch".to_string(),
            squeue: "squeue".to_string(),
            scancel: "scancel".to_string(),
            default_partition: "int".to_string(),
            job_template: None,
            job_comment: "rstudio_manager".to_string(),
            partitions: Vec::new(),
        }
    }
}
