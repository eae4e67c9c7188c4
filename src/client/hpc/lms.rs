//! MRC LMS cluster profile
//!
//! The partitions a session can land on:
//! - `int`: interactive partition, the default for RStudio sessions
//! - `cpu`: standard batch nodes
//! - `gpu`: GPU nodes, at least one GPU must be requested
//! - `hmem`: high-memory nodes

use super::profiles::{HpcPartition, HpcProfile, ResourceRange};

/// Create the LMS HPC profile
pub fn lms_profile() -> HpcProfile {
    HpcProfile {
        name: "lms".to_string(),
        display_name: "MRC LMS".to_string(),
        partitions: lms_partitions(),
    }
}

fn lms_partitions() -> Vec<HpcPartition> {
    vec![
        HpcPartition {
            name: "int".to_string(),
            description: "Interactive partition (max 1 day)".to_string(),
            cpus: ResourceRange::new(1, 32),
            memory_gb: ResourceRange::new(1, 256),
            gpus: ResourceRange::new(0, 2),
            walltime_hours: ResourceRange::new(1, 24),
        },
        HpcPartition {
            name: "cpu".to_string(),
            description: "Standard batch partition (max 7 days)".to_string(),
            cpus: ResourceRange::new(1, 64),
            memory_gb: ResourceRange::new(1, 500),
            gpus: ResourceRange::new(0, 0),
            walltime_hours: ResourceRange::new(1, 7 * 24),
        },
        HpcPartition {
            name: "gpu".to_string(),
            description: "GPU partition (max 3 days)".to_string(),
            cpus: ResourceRange::new(1, 64),
            memory_gb: ResourceRange::new(1, 500),
            gpus: ResourceRange::new(1, 4),
            walltime_hours: ResourceRange::new(1, 3 * 24),
        },
        HpcPartition {
            name: "hmem".to_string(),
            description: "High-memory partition (max 7 days)".to_string(),
            cpus: ResourceRange::new(1, 96),
            memory_gb: ResourceRange::new(1, 3000),
            gpus: ResourceRange::new(0, 0),
            walltime_hours: ResourceRange::new(1, 7 * 24),
        },
    ]
}
