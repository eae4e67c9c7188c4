//! Command-line definition for the `rstudio` binary
//!
//! Parsing goes through [`parse_args`] rather than `Cli::parse` so the help
//! and exit-code rules hold:
//!
//! - no arguments prints the top-level help and exits 0
//! - a command name on its own (other than `list`/`ls`) prints that command's
//!   help and exits 0
//! - any parse error prints the top-level help and exits 1

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand, builder::styling};
use std::ffi::OsString;
use std::path::PathBuf;

use crate::client::commands::{StartArgs, StopArgs};

const STYLES: styling::Styles = styling::Styles::styled()
    .header(styling::AnsiColor::Green.on_default().bold())
    .usage(styling::AnsiColor::Green.on_default().bold())
    .literal(styling::AnsiColor::Cyan.on_default().bold())
    .placeholder(styling::AnsiColor::Cyan.on_default());

const BANNER: &str = r"
   ____  ____  ____  _  _  ____  __  __
  (  _ \/ ___)(_  _)/ )( \(    \(  )/  \
   )   /\___ \  )(  ) \/ ( ) D ( )((  O )
  (__\_)(____/ (__) \____/(____/(__)\__/

  launch and manage RStudio servers as HPC jobs";

/// Commands that do something useful without arguments
const RUNNABLE_BARE: [&str; 2] = ["list", "ls"];

#[derive(Parser, Debug)]
#[command(name = "rstudio")]
#[command(about = "Launch and manage RStudio servers as HPC jobs", long_about = BANNER)]
#[command(styles = STYLES, disable_version_flag = true, disable_help_subcommand = true)]
pub struct Cli {
    /// Silence logging information
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Show the program version and exit
    #[arg(short = 'V', long)]
    pub version: bool,

    /// Extra configuration file, applied after the standard locations
    #[arg(
        short,
        long,
        global = true,
        value_name = "PATH",
        env = "RSTUDIO_MANAGER_CONFIG"
    )]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a new RStudio server
    #[command(visible_aliases = ["create", "new"])]
    Start(StartArgs),
    /// Stop an existing RStudio server instance
    #[command(visible_aliases = ["delete", "cancel", "kill"])]
    Stop(StopArgs),
    /// List running RStudio servers
    #[command(visible_alias = "ls")]
    List,
}

/// What `main` should do with the command line
#[derive(Debug)]
pub enum ParseOutcome {
    Run(Cli),
    /// Print `message` to stdout, `error` to stderr, and exit with `code`
    Exit {
        message: String,
        error: Option<String>,
        code: i32,
    },
}

pub fn version_string() -> String {
    format!("rstudio_manager v{}", env!("CARGO_PKG_VERSION"))
}

pub fn top_level_help() -> String {
    Cli::command().render_long_help().to_string()
}

/// Help for a command given by name or alias
pub fn command_help(name: &str) -> Option<String> {
    let mut cmd = Cli::command();
    cmd.build();
    cmd.find_subcommand_mut(name)
        .map(|sub| sub.render_long_help().to_string())
}

pub fn parse_args<I, T>(args: I) -> ParseOutcome
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args: Vec<OsString> = args.into_iter().map(Into::into).collect();

    if args.len() <= 1 {
        return exit_with(top_level_help(), 0);
    }
    if args.len() == 2
        && let Some(name) = args[1].to_str()
        && !RUNNABLE_BARE.contains(&name)
        && let Some(help) = command_help(name)
    {
        return exit_with(help, 0);
    }

    match Cli::try_parse_from(&args) {
        Ok(cli) if cli.version => exit_with(format!("{}\n", version_string()), 0),
        Ok(cli) if cli.command.is_none() => exit_with(top_level_help(), 0),
        Ok(cli) => ParseOutcome::Run(cli),
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => exit_with(e.to_string(), 0),
            _ => ParseOutcome::Exit {
                message: top_level_help(),
                error: Some(e.render().to_string()),
                code: 1,
            },
        },
    }
}

fn exit_with(message: String, code: i32) -> ParseOutcome {
    ParseOutcome::Exit {
        message,
        error: None,
        code,
    }
}
