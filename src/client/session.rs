//! On-disk record of one launched RStudio session

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

#[cfg(unix)]
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};

/// File extension of session records
pub const SESSION_FILE_EXTENSION: &str = "json";

/// Create `dir` if needed and make it accessible to its owner only.
///
/// Records carry session passwords, so an existing directory that other
/// users can read is tightened as well.
pub fn create_private_dir(dir: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700);
    builder.create(dir)?;

    #[cfg(unix)]
    {
        let mode = fs::metadata(dir)?.permissions().mode();
        if mode & 0o077 != 0 {
            fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
        }
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to access session record {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed session record {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One session, backed by exactly one scheduler job.
///
/// `url` and `token` stay empty until the server inside the job has reported
/// where it listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub job_id: String,
    pub job_name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Job output log, if it was kept
    #[serde(default)]
    pub log_path: Option<PathBuf>,
}

impl Session {
    /// A freshly submitted session with no endpoint yet
    pub fn new(job_id: &str, job_name: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            job_name: job_name.to_string(),
            url: None,
            token: None,
            created_at: Utc::now(),
            log_path: None,
        }
    }

    /// Record path for `job_id` inside `store_dir`
    pub fn path_for(store_dir: &Path, job_id: &str) -> PathBuf {
        store_dir.join(format!("{}.{}", job_id, SESSION_FILE_EXTENSION))
    }

    /// Write the record, replacing any previous version atomically.
    ///
    /// The file is readable by its owner only.
    pub fn write(&self, store_dir: &Path) -> Result<PathBuf, SessionError> {
        let path = Self::path_for(store_dir, &self.job_id);
        let io_err = |source| SessionError::Io {
            path: path.clone(),
            source,
        };

        create_private_dir(store_dir).map_err(io_err)?;
        let json = serde_json::to_string_pretty(self).map_err(|source| SessionError::Malformed {
            path: path.clone(),
            source,
        })?;

        // NamedTempFile is created with mode 0600 and renamed into place
        let mut tmp = NamedTempFile::new_in(store_dir).map_err(io_err)?;
        tmp.write_all(json.as_bytes()).map_err(io_err)?;
        tmp.persist(&path).map_err(|e| io_err(e.error))?;
        Ok(path)
    }

    /// Read a record from an explicit path
    pub fn read(path: &Path) -> Result<Self, SessionError> {
        let content = fs::read_to_string(path).map_err(|source| SessionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| SessionError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn url_or_empty(&self) -> &str {
        self.url.as_deref().unwrap_or_default()
    }

    pub fn token_or_empty(&self) -> &str {
        self.token.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_path_is_derived_from_job_id() {
        let path = Session::path_for(Path::new("/store"), "12345");
        assert_eq!(path, PathBuf::from("/store/12345.json"));
    }

    #[test]
    fn test_write_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        Session::new("1", "a").write(dir.path()).unwrap();
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["1.json".to_string()]);
    }

    #[test]
    fn test_read_accepts_missing_optional_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("7.json");
        fs::write(&path, r#"{"job_id": "7", "job_name": "old"}"#).unwrap();

        let session = Session::read(&path).unwrap();
        assert_eq!(session.job_id, "7");
        assert!(session.url.is_none());
        assert!(session.token.is_none());
    }

    #[test]
    fn test_read_malformed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("8.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            Session::read(&path),
            Err(SessionError::Malformed { .. })
        ));
    }
}
