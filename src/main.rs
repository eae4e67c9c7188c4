use env_logger::Builder;
use log::{LevelFilter, debug, error, info};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::process;
use std::str::FromStr;
use std::thread;

use rstudio_manager::cli::{Cli, Commands, ParseOutcome, parse_args};
use rstudio_manager::client::commands::{handle_list, handle_start, handle_stop, print_error};
use rstudio_manager::client::hpc::create_hpc_interface;
use rstudio_manager::client::launcher::CancellationFlag;
use rstudio_manager::client::session_store::SessionStore;
use rstudio_manager::config::{ConfigPaths, RstudioConfig};

fn init_logging(level: &str, quiet: bool) {
    let level = if quiet {
        LevelFilter::Error
    } else {
        LevelFilter::from_str(level).unwrap_or(LevelFilter::Info)
    };
    // RUST_LOG still wins over the configured level
    Builder::new()
        .filter_level(level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .init();
}

/// Flip `cancel` on SIGINT or SIGTERM
fn register_cancellation(cancel: &CancellationFlag) {
    let mut signals = match Signals::new([SIGINT, SIGTERM]) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to register signal handlers: {}", e);
            process::exit(1);
        }
    };
    let cancel = cancel.clone();
    thread::spawn(move || {
        for sig in signals.forever() {
            info!("Received signal {}, cancelling the launch", sig);
            cancel.cancel();
        }
    });
}

fn run(cli: &Cli, config: &RstudioConfig) -> anyhow::Result<()> {
    let cancel = CancellationFlag::new();
    let hpc = create_hpc_interface(&config.slurm, cancel.clone())?;
    let store = SessionStore::new(&config.client.session_store, &config.slurm.job_comment);
    debug!("Session store: {}", store.dir().display());

    match &cli.command {
        Some(Commands::Start(args)) => {
            register_cancellation(&cancel);
            handle_start(args, config, hpc.as_ref(), cancel)
        }
        Some(Commands::Stop(args)) => handle_stop(args, &store, hpc.as_ref()),
        Some(Commands::List) | None => handle_list(&store, hpc.as_ref()),
    }
}

fn main() {
    let cli = match parse_args(std::env::args_os()) {
        ParseOutcome::Run(cli) => cli,
        ParseOutcome::Exit {
            message,
            error,
            code,
        } => {
            if let Some(error) = error {
                eprint!("{}", error);
            }
            print!("{}", message);
            process::exit(code);
        }
    };

    let paths = ConfigPaths::new();
    let config = match RstudioConfig::load_with_paths_and_file(&paths, cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {:#}", e);
            process::exit(1);
        }
    };
    if let Err(errors) = config.validate() {
        for e in errors {
            eprintln!("Invalid configuration: {}", e);
        }
        process::exit(1);
    }

    init_logging(&config.client.log_level, cli.quiet);

    if let Err(e) = run(&cli, &config) {
        let action = match &cli.command {
            Some(Commands::Start(_)) => "starting RStudio",
            Some(Commands::Stop(_)) => "stopping sessions",
            Some(Commands::List) | None => "listing sessions",
        };
        print_error(action, &e);
        process::exit(1);
    }
}
