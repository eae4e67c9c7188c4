//! Directory of session records, cross-checked against the scheduler
//!
//! The store keeps no state of its own beyond the directory it scans. A record
//! whose job the scheduler no longer knows is stale: it stays on disk but is
//! never reported as active.

use anyhow::Result;
use log::{debug, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::hpc::HpcInterface;
use super::session::{SESSION_FILE_EXTENSION, Session, SessionError, create_private_dir};

#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
    job_comment: String,
}

impl SessionStore {
    /// Store rooted at `dir`. Only scheduler jobs tagged with `job_comment`
    /// count as sessions.
    pub fn new(dir: impl Into<PathBuf>, job_comment: &str) -> Self {
        Self {
            dir: dir.into(),
            job_comment: job_comment.to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn job_comment(&self) -> &str {
        &self.job_comment
    }

    /// Create the store directory, owner-only
    pub fn ensure_dir(&self) -> io::Result<()> {
        create_private_dir(&self.dir)
    }

    pub fn write(&self, session: &Session) -> Result<PathBuf, SessionError> {
        session.write(&self.dir)
    }

    /// Look up a record by job ID
    pub fn get(&self, job_id: &str) -> Result<Option<Session>, SessionError> {
        let path = Session::path_for(&self.dir, job_id);
        if !path.exists() {
            return Ok(None);
        }
        Session::read(&path).map(Some)
    }

    /// Delete a record. Returns false if there was nothing to delete.
    pub fn remove(&self, job_id: &str) -> Result<bool, SessionError> {
        let path = Session::path_for(&self.dir, job_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(SessionError::Io { path, source }),
        }
    }

    /// Every readable record, in directory order.
    ///
    /// Unreadable or malformed files are logged and skipped so one bad record
    /// never hides the others.
    pub fn records(&self) -> impl Iterator<Item = Session> + use<> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => Some(entries),
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("Cannot read session store {}: {}", self.dir.display(), e);
                }
                None
            }
        };

        entries.into_iter().flatten().filter_map(|entry| {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    warn!("Skipping unreadable session store entry: {}", e);
                    return None;
                }
            };
            if path.extension().and_then(|e| e.to_str()) != Some(SESSION_FILE_EXTENSION) {
                return None;
            }
            match Session::read(&path) {
                Ok(session) => Some(session),
                Err(e) => {
                    warn!("Skipping session record: {}", e);
                    None
                }
            }
        })
    }

    /// Records whose job is still known to the scheduler and tagged as a
    /// session job, in directory order.
    ///
    /// The scheduler is queried once up front; records are then read lazily.
    pub fn list_sessions(
        &self,
        hpc: &dyn HpcInterface,
    ) -> Result<impl Iterator<Item = Session> + use<>> {
        let jobs = hpc.list_jobs()?;
        let comment = self.job_comment.clone();

        Ok(self.records().filter(move |session| {
            match jobs.get(&session.job_id) {
                Some(info) if info.comment == comment => true,
                Some(info) => {
                    debug!(
                        "Job {} is not tagged as a session (comment '{}')",
                        session.job_id, info.comment
                    );
                    false
                }
                None => {
                    debug!("Session {} is stale", session.job_id);
                    false
                }
            }
        }))
    }

    /// Cancel the scheduler job behind a session. The record is left alone.
    pub fn cancel(&self, hpc: &dyn HpcInterface, job_id: &str) -> Result<()> {
        hpc.cancel_job(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_records_on_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("missing"), "tag");
        assert_eq!(store.records().count(), 0);
    }

    #[test]
    fn test_records_ignores_other_files() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path(), "tag");
        store.write(&Session::new("1", "a")).unwrap();
        fs::write(dir.path().join("rstudio_abc.log"), "node:1\n").unwrap();
        fs::write(dir.path().join("job_template.sh"), "#!/bin/bash\n").unwrap();

        let ids: Vec<String> = store.records().map(|s| s.job_id).collect();
        assert_eq!(ids, vec!["1".to_string()]);
    }

    #[test]
    fn test_remove_missing_record() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path(), "tag");
        assert!(!store.remove("404").unwrap());
    }
}
