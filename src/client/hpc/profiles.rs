//! Partition resource limits for a cluster
//!
//! Each partition carries an inclusive `[min, max]` range for every resource
//! a session can request. Requests are validated against these ranges before
//! anything is submitted.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive range of allowed values for one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRange {
    pub min: u32,
    pub max: u32,
}

impl ResourceRange {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: u32) -> bool {
        self.min <= value && value <= self.max
    }
}

impl fmt::Display for ResourceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}]", self.min, self.max)
    }
}

/// A partition on an HPC system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HpcPartition {
    /// Partition name (as used with --partition)
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// CPUs per job
    pub cpus: ResourceRange,

    /// Memory per job in GB
    pub memory_gb: ResourceRange,

    /// GPUs per job
    pub gpus: ResourceRange,

    /// Wall time in hours
    pub walltime_hours: ResourceRange,
}

/// An HPC system profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HpcProfile {
    /// System identifier
    pub name: String,

    /// Human-readable display name
    pub display_name: String,

    /// Available partitions
    pub partitions: Vec<HpcPartition>,
}

impl HpcProfile {
    /// Get a partition by name
    pub fn get_partition(&self, name: &str) -> Option<&HpcPartition> {
        self.partitions.iter().find(|p| p.name == name)
    }

    /// Partition names in declaration order
    pub fn partition_names(&self) -> Vec<&str> {
        self.partitions.iter().map(|p| p.name.as_str()).collect()
    }

    /// Add partitions, replacing any existing partition with the same name
    pub fn register(&mut self, partition: HpcPartition) {
        match self.partitions.iter_mut().find(|p| p.name == partition.name) {
            Some(existing) => *existing = partition,
            None => self.partitions.push(partition),
        }
    }

    /// Return a copy with the given partitions layered on top
    pub fn with_overrides(mut self, partitions: &[HpcPartition]) -> Self {
        for partition in partitions {
            self.register(partition.clone());
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partition(name: &str, max_cpus: u32) -> HpcPartition {
        HpcPartition {
            name: name.to_string(),
            description: String::new(),
            cpus: ResourceRange::new(1, max_cpus),
            memory_gb: ResourceRange::new(1, 64),
            gpus: ResourceRange::new(0, 0),
            walltime_hours: ResourceRange::new(1, 24),
        }
    }

    #[test]
    fn test_range_is_inclusive() {
        let range = ResourceRange::new(1, 32);
        assert!(range.contains(1));
        assert!(range.contains(32));
        assert!(!range.contains(0));
        assert!(!range.contains(33));
        assert_eq!(range.to_string(), "[1,32]");
    }

    #[test]
    fn test_overrides_replace_and_extend() {
        let profile = HpcProfile {
            name: "test".to_string(),
            display_name: "Test".to_string(),
            partitions: vec![partition("int", 8), partition("cpu", 16)],
        }
        .with_overrides(&[partition("int", 4), partition("extra", 2)]);

        assert_eq!(profile.partition_names(), vec!["int", "cpu", "extra"]);
        assert_eq!(profile.get_partition("int").unwrap().cpus.max, 4);
        assert!(profile.get_partition("missing").is_none());
    }
}
