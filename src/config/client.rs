//! Client configuration for the rstudio CLI

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Directory name of the session store under the user's home
const SESSION_STORE_DIR: &str = ".rstudio_manager";

/// Configuration for the rstudio CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,

    /// Directory holding one record file per session
    pub session_store: PathBuf,

    /// Seconds between polls while waiting for a session to come up
    pub poll_interval_secs: u64,

    /// Seconds to wait for each connection attempt to a starting server
    pub liveness_timeout_secs: u64,

    /// Keep the job output log after the session is up
    pub keep_logs: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            session_store: default_session_store(),
            poll_interval_secs: 2,
            liveness_timeout_secs: 2,
            keep_logs: false,
        }
    }
}

fn default_session_store() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(SESSION_STORE_DIR)
}
