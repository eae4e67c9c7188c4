//! Client implementation for the RStudio session manager
//!
//! This module contains the scheduler adapters, the session store, the launch
//! coordinator and the CLI command handlers built on top of them.

pub mod commands;
pub mod hpc;
pub mod image;
pub mod job_template;
pub mod launcher;
pub mod resource_request;
pub mod session;
pub mod session_store;

// Re-exports for convenience
pub use hpc::{
    FakeInterface, HpcInterface, HpcJobInfo, HpcJobStatus, HpcPartition, HpcProfile,
    JobSubmission, SlurmInterface, create_hpc_interface,
};
pub use launcher::{
    CancellationFlag, LaunchError, LaunchRequest, LaunchState, Launcher, LivenessProbe, Sleeper,
    TcpProbe, ThreadSleeper,
};
pub use resource_request::{ResourceField, ResourceRequest, ValidationError};
pub use session::{Session, SessionError};
pub use session_store::SessionStore;
