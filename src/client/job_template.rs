//! The batch script submitted for every session

use anyhow::{Context, Result};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Bundled batch script
pub const JOB_TEMPLATE: &str = include_str!("../../templates/job_template.sh");

const JOB_TEMPLATE_FILE_NAME: &str = "job_template.sh";

/// Path of the batch script to submit.
///
/// An explicit override is used as-is. Otherwise the bundled template is
/// written into `store_dir`, refreshed whenever its content differs.
pub fn ensure_job_template(store_dir: &Path, override_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        if !path.is_file() {
            return Err(anyhow::anyhow!(
                "Job template {} does not exist",
                path.display()
            ));
        }
        return Ok(path.to_path_buf());
    }

    let filename = store_dir.join(JOB_TEMPLATE_FILE_NAME);
    let current = fs::read_to_string(&filename).ok();
    if current.as_deref() != Some(JOB_TEMPLATE) {
        fs::create_dir_all(store_dir)?;
        fs::write(&filename, JOB_TEMPLATE)
            .with_context(|| format!("Failed to write job template to {:?}", filename))?;
        debug!("Wrote job template: {:?}", filename);
    }

    #[cfg(unix)]
    {
        let mut perms = fs::metadata(&filename)?.permissions();
        if perms.mode() & 0o777 != 0o755 {
            perms.set_mode(0o755);
            fs::set_permissions(&filename, perms)?;
        }
    }

    Ok(filename)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_template_prints_endpoint_first() {
        let first_command = JOB_TEMPLATE
            .lines()
            .find(|l| l.starts_with("echo"))
            .unwrap();
        assert!(first_command.contains("${PORT}"));
    }

    #[test]
    fn test_writes_bundled_template() {
        let dir = TempDir::new().unwrap();
        let path = ensure_job_template(dir.path(), None).unwrap();
        assert_eq!(path, dir.path().join("job_template.sh"));
        assert_eq!(fs::read_to_string(&path).unwrap(), JOB_TEMPLATE);
    }

    #[test]
    fn test_refreshes_modified_template() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("job_template.sh");
        fs::write(&path, "#!/bin/bash\necho stale\n").unwrap();

        ensure_job_template(dir.path(), None).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), JOB_TEMPLATE);
    }

    #[test]
    fn test_override_must_exist() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("custom.sh");
        assert!(ensure_job_template(dir.path(), Some(&missing)).is_err());

        fs::write(&missing, "#!/bin/bash\n").unwrap();
        assert_eq!(
            ensure_job_template(dir.path(), Some(&missing)).unwrap(),
            missing
        );
    }
}
