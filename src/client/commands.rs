//! Handlers for the `rstudio` subcommands

pub mod list;
pub mod start;
pub mod stop;
pub mod table_format;

pub use list::{NO_SESSIONS_MESSAGE, SessionTableRow, handle_list, render_sessions, session_rows};
pub use start::{StartArgs, handle_start, start_session};
pub use stop::{StopArgs, handle_stop, stop_sessions};

/// Log an error with the action that produced it
pub fn print_error(action: &str, error: &anyhow::Error) {
    log::error!("Error {}: {:#}", action, error);
}
