//! Container image configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the RStudio Singularity images live and which one to use
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Explicit image path, bypassing version discovery
    pub image: Option<PathBuf>,

    /// Directory holding `rstudio_<version>.sif` images
    pub image_dir: PathBuf,

    /// Image version to use, or "latest" for the newest image in `image_dir`
    pub image_version: String,

    /// Version used when "latest" finds no images
    pub fallback_version: String,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            image: None,
            image_dir: PathBuf::from("/opt/resources/apps/rstudio"),
            image_version: "latest".to_string(),
            fallback_version: "4.2.3".to_string(),
        }
    }
}
