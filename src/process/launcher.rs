use std::time::Duration;

use super::Spawned;

/// Everything a backend needs to know to start one playback session.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchRequest {
    pub file: String,
    pub position: Duration,
    pub passthrough: bool,
    /// Bus identifier the backend must claim so it can be addressed.
    pub bus_name: String,
}

/// Turns a [`LaunchRequest`] into a running (or failed) backend process.
///
/// Implementations never fail outright: a process that cannot be started is
/// reported through an exit notification that resolves immediately.
pub trait Launcher: Send + Sync {
    fn launch(&self, request: &LaunchRequest) -> Spawned;
}
