//! Inter-process bus used to control and observe the playback backend.
//!
//! Architecture:
//! - `listener.rs` - filters ownership-change signals down to the active session
//! - `mpv.rs` - [`MediaBus`] over mpv's JSON IPC, one Unix socket per session
//! - `ipc.rs` - async socket connection with request/response matching
//! - `protocol.rs` - JSON command/response types

mod ipc;
mod listener;
mod mpv;
mod protocol;

pub use listener::SignalListener;
pub use mpv::{socket_path, MpvBus};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

/// Signal member announcing that a bus name changed owner.
pub const NAME_OWNER_CHANGED: &str = "NameOwnerChanged";

#[derive(Error, Debug)]
pub enum BusError {
    #[error("No backend owns {0}")]
    NotConnected(String),
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Write failed: {0}")]
    WriteFailed(#[from] std::io::Error),
    #[error("Call timed out")]
    Timeout,
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Disconnected")]
    Disconnected,
    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),
    #[error("Malformed signal: {0}")]
    MalformedSignal(String),
}

/// Remote calls understood by the backend's media-control interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusMethod {
    /// Absolute seek, in microseconds.
    SetPosition(i64),
    Play,
    Pause,
}

/// A raw signal as delivered by the bus. Arguments are loosely typed and
/// are validated by the [`SignalListener`].
#[derive(Debug, Clone, PartialEq)]
pub struct BusSignal {
    pub member: String,
    pub args: Vec<Value>,
}

impl BusSignal {
    pub fn name_owner_changed(name: &str, previous_owner: &str, new_owner: &str) -> Self {
        BusSignal {
            member: NAME_OWNER_CHANGED.to_string(),
            args: vec![name.into(), previous_owner.into(), new_owner.into()],
        }
    }
}

/// A validated `NameOwnerChanged` signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerChange {
    pub object_name: String,
    pub previous_owner: String,
    pub new_owner: String,
}

impl OwnerChange {
    /// Returns `Ok(None)` for signals other than `NameOwnerChanged`.
    pub fn parse(signal: &BusSignal) -> Result<Option<Self>, BusError> {
        if signal.member != NAME_OWNER_CHANGED {
            return Ok(None);
        }
        if signal.args.len() < 3 {
            return Err(BusError::MalformedSignal(format!(
                "expected 3 arguments, got {}",
                signal.args.len()
            )));
        }
        let arg = |i: usize| -> Result<String, BusError> {
            signal.args[i]
                .as_str()
                .map(str::to_owned)
                .ok_or_else(|| BusError::MalformedSignal(format!("argument {} is not a string: {}", i, signal.args[i])))
        };
        Ok(Some(OwnerChange {
            object_name: arg(0)?,
            previous_owner: arg(1)?,
            new_owner: arg(2)?,
        }))
    }

    /// The name just got an owner: the backend is up.
    pub fn is_acquired(&self) -> bool {
        self.previous_owner.is_empty()
    }

    /// The name lost its owner: the backend is going away.
    pub fn is_released(&self) -> bool {
        !self.previous_owner.is_empty() && self.new_owner.is_empty()
    }
}

/// The bus seam used by the player.
///
/// Calls are addressed by bus name, the unique identifier each backend
/// session claims.
#[async_trait]
pub trait MediaBus: Send + Sync {
    /// Subscribe to every signal on the bus.
    fn subscribe(&self) -> broadcast::Receiver<BusSignal>;

    /// Start tracking ownership of `name`. Buses that observe name ownership
    /// on their own can ignore this.
    fn watch_name(&self, _name: &str) {}

    /// Stop tracking `name`; its owner is gone and no further signals for it
    /// are wanted.
    fn unwatch_name(&self, _name: &str) {}

    async fn call(&self, destination: &str, method: BusMethod) -> Result<(), BusError>;

    /// Current playback position of `destination`, in microseconds.
    async fn position(&self, destination: &str) -> Result<i64, BusError>;
}
