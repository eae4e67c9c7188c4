//! Container image and token defaults for new sessions

use anyhow::Result;
use log::{debug, warn};
use rand::Rng;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ContainerConfig;

const TOKEN_CHARS: &[u8] = b"0123456789abcdefABCDEF";
pub const TOKEN_LENGTH: usize = 8;

/// Random hex-digit password for a session
pub fn generate_token<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..TOKEN_LENGTH)
        .map(|_| TOKEN_CHARS[rng.gen_range(0..TOKEN_CHARS.len())] as char)
        .collect()
}

/// Image file name for a version
pub fn image_file_name(version: &str) -> String {
    format!("rstudio_{}.sif", version)
}

/// Versions of the images found in `dir`, oldest first
pub fn available_versions(dir: &Path) -> Result<Vec<String>> {
    let re = Regex::new(r"^rstudio_(\d+(?:\.\d+)*)\.sif$")?;
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cannot read image directory {}: {}", dir.display(), e);
            return Ok(Vec::new());
        }
    };

    let mut versions: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter_map(|name| re.captures(&name).map(|c| c[1].to_string()))
        .collect();
    versions.sort_by_key(|v| version_key(v));
    Ok(versions)
}

fn version_key(version: &str) -> Vec<u32> {
    version.split('.').filter_map(|p| p.parse().ok()).collect()
}

/// Image the next session should run
pub fn resolve_image(config: &ContainerConfig) -> Result<PathBuf> {
    if let Some(image) = &config.image {
        return Ok(image.clone());
    }

    let version = if config.image_version == "latest" {
        match available_versions(&config.image_dir)?.pop() {
            Some(newest) => newest,
            None => {
                warn!(
                    "No RStudio images found in {}, using version {}",
                    config.image_dir.display(),
                    config.fallback_version
                );
                config.fallback_version.clone()
            }
        }
    } else {
        config.image_version.clone()
    };

    let image = config.image_dir.join(image_file_name(&version));
    if !image.exists() {
        warn!("RStudio image {} does not exist", image.display());
    }
    debug!("Using RStudio image {}", image.display());
    Ok(image)
}
