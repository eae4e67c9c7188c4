use anyhow::{Result, bail};
use clap::Args;
use log::{info, warn};
use std::collections::HashSet;

use crate::client::hpc::HpcInterface;
use crate::client::session_store::SessionStore;

#[derive(Args, Debug, Clone, Default)]
#[command(after_long_help = "\
EXAMPLES:
    # Stop one server by job ID
    rstudio stop 12345

    # Stop servers by name
    rstudio stop my_analysis other_analysis

    # Stop every running server
    rstudio stop --all
")]
pub struct StopArgs {
    /// Job IDs or job names of the servers to stop
    #[arg(value_name = "JOB")]
    pub jobs: Vec<String>,

    /// Stop all running servers
    #[arg(short, long)]
    pub all: bool,
}

/// Cancel every active session matching `args` and remove its record.
///
/// Each matching job is cancelled once. Returns the cancelled job IDs in the
/// order they were found.
pub fn stop_sessions(
    args: &StopArgs,
    store: &SessionStore,
    hpc: &dyn HpcInterface,
) -> Result<Vec<String>> {
    let mut stopped = Vec::new();
    let mut seen = HashSet::new();
    let mut matched_filters = HashSet::new();
    let mut failures = 0;

    for session in store.list_sessions(hpc)? {
        let by_id = args.jobs.contains(&session.job_id);
        let by_name = args.jobs.contains(&session.job_name);
        if !(args.all || by_id || by_name) {
            continue;
        }
        if by_id {
            matched_filters.insert(session.job_id.clone());
        }
        if by_name {
            matched_filters.insert(session.job_name.clone());
        }
        if !seen.insert(session.job_id.clone()) {
            continue;
        }

        info!("Stopping job {} ({})", session.job_id, session.job_name);
        if let Err(e) = store.cancel(hpc, &session.job_id) {
            warn!("Failed to cancel job {}: {:#}", session.job_id, e);
            failures += 1;
            continue;
        }
        if let Err(e) = store.remove(&session.job_id) {
            warn!("Failed to remove session record: {}", e);
        }
        stopped.push(session.job_id);
    }

    for filter in args.jobs.iter().filter(|j| !matched_filters.contains(*j)) {
        warn!("No running RStudio server matches '{}'", filter);
    }

    if failures > 0 {
        bail!("failed to cancel {} job(s)", failures);
    }
    Ok(stopped)
}

pub fn handle_stop(args: &StopArgs, store: &SessionStore, hpc: &dyn HpcInterface) -> Result<()> {
    if !args.all && args.jobs.is_empty() {
        warn!("Nothing to stop: pass job IDs, job names or --all");
        return Ok(());
    }
    let stopped = stop_sessions(args, store, hpc)?;
    info!("Stopped {} server(s)", stopped.len());
    Ok(())
}
