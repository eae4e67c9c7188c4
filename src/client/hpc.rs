//! HPC scheduler management functionality
//!
//! This module provides the scheduler seam used by the session manager. The
//! [`HpcInterface`] trait is implemented by [`SlurmInterface`], which shells
//! out to the Slurm binaries, and by [`FakeInterface`], which keeps jobs in
//! memory for tests.
//!
//! It also provides the partition limits of the cluster sessions run on.

pub mod common;
pub mod fake_interface;
pub mod hpc_interface;
pub mod lms;
pub mod profiles;
pub mod slurm_interface;

pub use common::{HpcJobInfo, HpcJobStatus, JobSubmission};
pub use fake_interface::FakeInterface;
pub use hpc_interface::HpcInterface;
pub use profiles::{HpcPartition, HpcProfile, ResourceRange};
pub use slurm_interface::SlurmInterface;

use anyhow::Result;

use crate::client::launcher::CancellationFlag;
use crate::config::SlurmConfig;

/// Create the Slurm interface. Retried status queries give up early once
/// `cancel` is set.
pub fn create_hpc_interface(
    config: &SlurmConfig,
    cancel: CancellationFlag,
) -> Result<Box<dyn HpcInterface>> {
    Ok(Box::new(
        SlurmInterface::new(config)?.with_cancellation(cancel),
    ))
}

/// The cluster profile with any configured partition overrides applied
pub fn cluster_profile(config: &SlurmConfig) -> HpcProfile {
    lms::lms_profile().with_overrides(&config.partitions)
}
