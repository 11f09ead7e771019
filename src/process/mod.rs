//! Backend process supervision.
//!
//! A backend is spawned from a command line, its output is captured, and its
//! end is reported exactly once through an [`ExitNotification`], whether it
//! exited cleanly, was interrupted, or never started at all.

mod launcher;
mod supervisor;

pub use launcher::{LaunchRequest, Launcher};
pub use supervisor::{spawn, spawn_failed, ChildHandle, ExitNotification, ProcessControl, ProcessExit, Spawned};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Backend executable not found")]
    NotFound,
    #[error("Empty command line")]
    EmptyCommandLine,
    #[error("Failed to spawn backend: {0}")]
    SpawnFailed(#[from] std::io::Error),
    #[error("Failed to wait for backend: {0}")]
    WaitFailed(#[source] std::io::Error),
}
