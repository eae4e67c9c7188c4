//! Layered configuration for the rstudio CLI
//!
//! Configuration is read from TOML files in increasing priority:
//! 1. System: `/etc/rstudio-manager/config.toml`
//! 2. User: `~/.config/rstudio-manager/config.toml`
//! 3. Local: `./rstudio-manager.toml`
//!
//! Later files override earlier ones key by key. Missing files are skipped and
//! anything left unset keeps its default.

mod client;
mod container;
mod slurm;

pub use client::ClientConfig;
pub use container::ContainerConfig;
pub use slurm::SlurmConfig;

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::client::hpc::cluster_profile;

const VALID_LOG_LEVELS: &[&str] = &["off", "error", "warn", "info", "debug", "trace"];

/// Locations searched for configuration files
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub system: PathBuf,
    pub user: Option<PathBuf>,
    pub local: PathBuf,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigPaths {
    pub fn new() -> Self {
        Self {
            system: PathBuf::from("/etc/rstudio-manager/config.toml"),
            user: dirs::config_dir().map(|d| d.join("rstudio-manager").join("config.toml")),
            local: PathBuf::from("rstudio-manager.toml"),
        }
    }

    /// All candidate paths in priority order (lowest first)
    pub fn all_paths(&self) -> Vec<&PathBuf> {
        let mut paths = vec![&self.system];
        if let Some(user) = &self.user {
            paths.push(user);
        }
        paths.push(&self.local);
        paths
    }

    /// Candidate paths that exist on disk, in priority order
    pub fn existing_paths(&self) -> Vec<&PathBuf> {
        self.all_paths().into_iter().filter(|p| p.exists()).collect()
    }
}

/// Complete configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RstudioConfig {
    pub client: ClientConfig,
    pub slurm: SlurmConfig,
    pub container: ContainerConfig,
}

impl RstudioConfig {
    /// Load from the given locations plus an optional explicit file, which wins
    pub fn load_with_paths_and_file(paths: &ConfigPaths, extra: Option<&Path>) -> Result<Self> {
        let mut files: Vec<PathBuf> = paths.existing_paths().into_iter().cloned().collect();
        if let Some(extra) = extra {
            if !extra.exists() {
                return Err(anyhow::anyhow!(
                    "Config file {} does not exist",
                    extra.display()
                ));
            }
            files.push(extra.to_path_buf());
        }
        Self::load_from_files(&files)
    }

    pub fn load_with_paths(paths: &ConfigPaths) -> Result<Self> {
        Self::load_with_paths_and_file(paths, None)
    }

    /// Merge the given files in order. Nonexistent files are skipped.
    pub fn load_from_files(files: &[PathBuf]) -> Result<Self> {
        let mut merged = toml::Table::new();
        for path in files {
            if !path.exists() {
                continue;
            }
            debug!("Loading config file {}", path.display());
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let table: toml::Table = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?;
            merge_tables(&mut merged, table);
        }

        toml::Value::Table(merged)
            .try_into()
            .context("Invalid configuration")
    }

    /// Check values that serde cannot, returning one message per problem
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !VALID_LOG_LEVELS.contains(&self.client.log_level.as_str()) {
            errors.push(format!(
                "client.log_level must be one of {:?}, got '{}'",
                VALID_LOG_LEVELS, self.client.log_level
            ));
        }
        if self.client.poll_interval_secs == 0 {
            errors.push("client.poll_interval_secs must be greater than 0".to_string());
        }
        if self.client.liveness_timeout_secs == 0 {
            errors.push("client.liveness_timeout_secs must be greater than 0".to_string());
        }

        for (key, value) in [
            ("slurm.sbatch", &self.slurm.sbatch),
            ("slurm.squeue", &self.slurm.squeue),
            ("slurm.scancel", &self.slurm.scancel),
            ("slurm.job_comment", &self.slurm.job_comment),
            ("container.image_version", &self.container.image_version),
        ] {
            if value.trim().is_empty() {
                errors.push(format!("{} must not be empty", key));
            }
        }

        for partition in &self.slurm.partitions {
            for (field, range) in [
                ("cpus", partition.cpus),
                ("memory_gb", partition.memory_gb),
                ("gpus", partition.gpus),
                ("walltime_hours", partition.walltime_hours),
            ] {
                if range.min > range.max {
                    errors.push(format!(
                        "slurm.partitions.{}.{}: min {} exceeds max {}",
                        partition.name, field, range.min, range.max
                    ));
                }
            }
        }

        let profile = cluster_profile(&self.slurm);
        if profile.get_partition(&self.slurm.default_partition).is_none() {
            errors.push(format!(
                "slurm.default_partition '{}' is not one of {:?}",
                self.slurm.default_partition,
                profile.partition_names()
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    /// Default configuration as a commented TOML document
    pub fn generate_default_config() -> String {
        let body = Self::default()
            .to_toml()
            .unwrap_or_else(|e| format!("# failed to render defaults: {}\n", e));
        format!(
            "# rstudio-manager configuration\n\
             # Place at ~/.config/rstudio-manager/config.toml\n\n{}",
            body
        )
    }
}

/// Recursively overlay `overlay` onto `base`
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_tables_overrides_leaves() {
        let mut base: toml::Table = toml::from_str("[client]\nlog_level = \"info\"\nkeep_logs = true").unwrap();
        let overlay: toml::Table = toml::from_str("[client]\nlog_level = \"debug\"").unwrap();
        merge_tables(&mut base, overlay);

        let client = base["client"].as_table().unwrap();
        assert_eq!(client["log_level"].as_str(), Some("debug"));
        assert_eq!(client["keep_logs"].as_bool(), Some(true));
    }
}
