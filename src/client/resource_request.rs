//! Validated resource requests and their sbatch flags
//!
//! A [`ResourceRequest`] can only be built through [`ResourceRequest::validate`],
//! so holding one proves every field sits inside its partition's limits.
//! Out-of-range values are rejected, never clamped.

use std::fmt;
use std::path::Path;
use thiserror::Error;

use super::hpc::{HpcProfile, ResourceRange};

/// A resource a session can request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceField {
    Cpu,
    Memory,
    Gpu,
    Walltime,
}

impl fmt::Display for ResourceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceField::Cpu => "cpu",
            ResourceField::Memory => "mem",
            ResourceField::Gpu => "gpu",
            ResourceField::Walltime => "walltime",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unknown partition '{partition}' (available: {})", .available.join(", "))]
    UnknownPartition {
        partition: String,
        available: Vec<String>,
    },
    #[error("requested {field} {requested} is outside {allowed} for partition '{partition}'")]
    OutOfRange {
        partition: String,
        field: ResourceField,
        requested: u32,
        allowed: ResourceRange,
    },
}

/// Resources for one session, checked against its partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    partition: String,
    cpus: u32,
    memory_gb: u32,
    gpus: u32,
    walltime_hours: u32,
}

impl ResourceRequest {
    /// Check a request against `profile` and build it if every field fits.
    ///
    /// Fields are checked in the order cpu, mem, gpu, walltime and the first
    /// violation is returned.
    pub fn validate(
        profile: &HpcProfile,
        partition: &str,
        cpus: u32,
        memory_gb: u32,
        gpus: u32,
        walltime_hours: u32,
    ) -> Result<Self, ValidationError> {
        let limits =
            profile
                .get_partition(partition)
                .ok_or_else(|| ValidationError::UnknownPartition {
                    partition: partition.to_string(),
                    available: profile
                        .partition_names()
                        .into_iter()
                        .map(str::to_string)
                        .collect(),
                })?;

        for (field, requested, allowed) in [
            (ResourceField::Cpu, cpus, limits.cpus),
            (ResourceField::Memory, memory_gb, limits.memory_gb),
            (ResourceField::Gpu, gpus, limits.gpus),
            (ResourceField::Walltime, walltime_hours, limits.walltime_hours),
        ] {
            if !allowed.contains(requested) {
                return Err(ValidationError::OutOfRange {
                    partition: partition.to_string(),
                    field,
                    requested,
                    allowed,
                });
            }
        }

        Ok(Self {
            partition: partition.to_string(),
            cpus,
            memory_gb,
            gpus,
            walltime_hours,
        })
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }

    pub fn cpus(&self) -> u32 {
        self.cpus
    }

    pub fn memory_gb(&self) -> u32 {
        self.memory_gb
    }

    pub fn gpus(&self) -> u32 {
        self.gpus
    }

    pub fn walltime_hours(&self) -> u32 {
        self.walltime_hours
    }

    /// Resource flags for sbatch, always in the same order
    pub fn resource_args(&self) -> Vec<String> {
        vec![
            format!("--partition={}", self.partition),
            format!("--cpus-per-task={}", self.cpus),
            format!("--mem={}G", self.memory_gb),
            format!("--gres=gpu:{}", self.gpus),
            format!("--time={}", hours_to_walltime(self.walltime_hours)),
        ]
    }

    /// Full sbatch flag list: resources, then output log, job name and tag
    pub fn submission_args(&self, job_name: &str, log_path: &Path, comment: &str) -> Vec<String> {
        let mut args = self.resource_args();
        args.push(format!("--output={}", log_path.display()));
        args.push(format!("--job-name={}", job_name));
        args.push(format!("--comment={}", comment));
        args
    }

    /// Rebuild a request from flags produced by [`Self::resource_args`].
    ///
    /// Returns `None` if any resource flag is missing or malformed. The
    /// result is not re-validated against a profile.
    pub fn from_submission_args(args: &[String]) -> Option<Self> {
        let value = |flag: &str| {
            let prefix = format!("{}=", flag);
            args.iter().find_map(|a| a.strip_prefix(&prefix).map(str::to_string))
        };

        Some(Self {
            partition: value("--partition")?,
            cpus: value("--cpus-per-task")?.parse().ok()?,
            memory_gb: value("--mem")?.strip_suffix('G')?.parse().ok()?,
            gpus: value("--gres")?.strip_prefix("gpu:")?.parse().ok()?,
            walltime_hours: walltime_to_hours(&value("--time")?)?,
        })
    }
}

/// Convert hours to Slurm walltime format (HH:MM:SS or D-HH:MM:SS)
pub fn hours_to_walltime(hours: u32) -> String {
    if hours >= 24 {
        format!("{}-{:02}:00:00", hours / 24, hours % 24)
    } else {
        format!("{:02}:00:00", hours)
    }
}

/// Parse a whole-hour Slurm walltime back into hours
fn walltime_to_hours(walltime: &str) -> Option<u32> {
    let (days, hms) = match walltime.split_once('-') {
        Some((d, rest)) => (d.parse::<u32>().ok()?, rest),
        None => (0, walltime),
    };
    let mut parts = hms.split(':');
    let hours: u32 = parts.next()?.parse().ok()?;
    let mins: u32 = parts.next()?.parse().ok()?;
    let secs: u32 = parts.next()?.parse().ok()?;
    if mins != 0 || secs != 0 || parts.next().is_some() {
        return None;
    }
    Some(days * 24 + hours)
}
