use anyhow::{Context, Result};
use clap::Args;
use log::{debug, info};
use std::time::Duration;

use crate::client::hpc::{HpcInterface, cluster_profile};
use crate::client::image::{generate_token, resolve_image};
use crate::client::job_template::ensure_job_template;
use crate::client::launcher::{
    CancellationFlag, LaunchRequest, Launcher, LivenessProbe, Sleeper, TcpProbe, ThreadSleeper,
};
use crate::client::resource_request::ResourceRequest;
use crate::client::session::Session;
use crate::client::session_store::SessionStore;
use crate::config::RstudioConfig;

#[derive(Args, Debug, Clone)]
#[command(after_long_help = "\
EXAMPLES:
    # Start a server with the default resources
    rstudio start my_r_env

    # Four CPUs, 32 GB of memory for 8 hours
    rstudio start my_r_env -n analysis -@ 4 -m 32 -w 8

    # Make a project directory visible inside the container
    rstudio start my_r_env -b /data/project:/project
")]
pub struct StartArgs {
    /// Name of an existing conda environment containing R
    #[arg(value_name = "CONDA_ENV")]
    pub conda_env: String,

    /// Job name for the scheduler
    #[arg(short, long, default_value = "rstudio_server")]
    pub name: String,

    /// Requested number of CPUs
    #[arg(short = '@', long, default_value_t = 1)]
    pub cpu: u32,

    /// Requested amount of RAM (GB)
    #[arg(short, long, default_value_t = 8)]
    pub mem: u32,

    /// Requested runtime (hours)
    #[arg(short, long = "wallclock", default_value_t = 16)]
    pub wallclock: u32,

    /// Requested number of GPUs
    #[arg(short, long, default_value_t = 0)]
    pub gpu: u32,

    #[arg(short, long, hide = true)]
    pub partition: Option<String>,

    /// Password token for the session (auto-generated by default)
    #[arg(short, long)]
    pub token: Option<String>,

    /// Additional bind path/s in the singularity format (src[:dest[:opts]])
    #[arg(short, long, default_value = "")]
    pub bind: String,

    #[arg(short, long, hide = true)]
    pub log: bool,
}

/// Validate, submit and wait for a new session to become reachable
pub fn start_session(
    args: &StartArgs,
    config: &RstudioConfig,
    hpc: &dyn HpcInterface,
    sleeper: &dyn Sleeper,
    probe: &dyn LivenessProbe,
    cancel: CancellationFlag,
) -> Result<Session> {
    info!("Validating the request");
    let partition = args
        .partition
        .as_deref()
        .unwrap_or(&config.slurm.default_partition);
    let request = ResourceRequest::validate(
        &cluster_profile(&config.slurm),
        partition,
        args.cpu,
        args.mem,
        args.gpu,
        args.wallclock,
    )?;

    let store = SessionStore::new(&config.client.session_store, &config.slurm.job_comment);
    store
        .ensure_dir()
        .with_context(|| format!("Failed to create session store {}", store.dir().display()))?;

    let keep_log = args.log || config.client.keep_logs;
    let log_file = tempfile::Builder::new()
        .prefix("rstudio_")
        .suffix(".log")
        .tempfile_in(store.dir())
        .context("Failed to create job log file")?
        .into_temp_path();
    let log_path = log_file.to_path_buf();
    debug!("Job output goes to {}", log_path.display());
    // Dropping the guard removes the log, on success and on failure alike
    let _log_guard = if keep_log {
        log_file.keep().context("Failed to keep job log file")?;
        None
    } else {
        Some(log_file)
    };

    let image = resolve_image(&config.container)?;
    let job_template = ensure_job_template(store.dir(), config.slurm.job_template.as_deref())?;
    let token = match &args.token {
        Some(token) => token.clone(),
        None => generate_token(&mut rand::thread_rng()),
    };

    let launch = LaunchRequest {
        conda_env: args.conda_env.clone(),
        image: image.to_string_lossy().into_owned(),
        bind_paths: args.bind.clone(),
        token,
        job_name: args.name.clone(),
        request,
        log_path: log_path.clone(),
        keep_log,
        job_template,
    };

    let mut launcher = Launcher::new(
        hpc,
        &store,
        sleeper,
        probe,
        cancel,
        Duration::from_secs(config.client.poll_interval_secs),
    );
    let session = launcher.launch(&launch)?;

    if keep_log {
        info!("Job log kept at {}", log_path.display());
    }
    Ok(session)
}

pub fn handle_start(
    args: &StartArgs,
    config: &RstudioConfig,
    hpc: &dyn HpcInterface,
    cancel: CancellationFlag,
) -> Result<()> {
    let probe = TcpProbe::new(Duration::from_secs(config.client.liveness_timeout_secs));
    let session = start_session(args, config, hpc, &ThreadSleeper, &probe, cancel)?;
    // stdout, so the details survive --quiet
    println!("URL:   {}", session.url_or_empty());
    println!("Token: {}", session.token_or_empty());
    Ok(())
}
