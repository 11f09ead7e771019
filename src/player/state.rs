use std::fmt;
use std::time::Duration;
use tokio::sync::oneshot;

/// Lifecycle of the single playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerState {
    /// Backend spawned, not yet reachable on the bus.
    Starting,
    Playing,
    Paused,
    /// Backend interrupted or going away; waiting for the process to exit.
    Finishing,
    /// No backend process.
    Finished,
}

impl PlayerState {
    /// Whether a backend session exists in this state.
    pub fn has_session(self) -> bool {
        self != PlayerState::Finished
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlayerState::Starting => "Starting",
            PlayerState::Playing => "Playing",
            PlayerState::Paused => "Paused",
            PlayerState::Finishing => "Finishing",
            PlayerState::Finished => "Finished",
        };
        f.write_str(name)
    }
}

/// Commands that can be sent to the Player task.
#[derive(Debug)]
pub enum PlayerCommand {
    Play {
        file: String,
        position: Duration,
        passthrough: bool,
    },
    Pause,
    /// Wind down; the sender fires once the player task has exited.
    Stop(oneshot::Sender<()>),
}

/// Broadcast by the Player task after every state change and position update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerEvent {
    pub state: PlayerState,
    pub file: String,
    /// Estimated, not backend-exact between polls.
    pub position: Duration,
}

/// A play request waiting for the current backend to exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPlay {
    pub file: String,
    pub position: Duration,
    pub passthrough: bool,
}
