//! rstudio_manager - launch and manage RStudio servers as HPC jobs
//!
//! A session is one RStudio Server running inside a Slurm job. The `rstudio`
//! binary starts sessions, lists the ones still running and stops them.
//! Session records live in a per-user store directory and are cross-checked
//! against the scheduler on every read.

pub mod cli;
pub mod client;
pub mod config;
