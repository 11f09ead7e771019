//! [`MediaBus`] backed by mpv's JSON IPC.
//!
//! Every session's bus name maps to its own socket. Name ownership is
//! synthesised from the socket lifetime: attaching to the socket is an
//! acquisition, the socket closing is a release.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::ipc::IpcConnection;
use super::protocol::{MpvCommand, MpvResponse};
use super::{BusError, BusMethod, BusSignal, MediaBus};
use crate::config::Settings;

const LOG_TARGET: &str = "r_jukybox::bus::mpv";
const SIGNAL_CAPACITY: usize = 32;

/// IPC socket path for the backend owning `bus_name`.
pub fn socket_path(socket_dir: &Path, bus_name: &str) -> PathBuf {
    socket_dir.join(format!("{}.sock", bus_name))
}

#[derive(Clone)]
pub struct MpvBus {
    inner: Arc<Inner>,
}

struct Inner {
    socket_dir: PathBuf,
    connect_attempts: u32,
    call_timeout: Duration,
    connections: Mutex<HashMap<String, Arc<IpcConnection>>>,
    watchers: Mutex<HashMap<String, JoinHandle<()>>>,
    signal_tx: broadcast::Sender<BusSignal>,
}

impl MpvBus {
    /// Creates the bus, making sure `socket_dir` exists.
    pub fn new(socket_dir: impl Into<PathBuf>, connect_attempts: u32, call_timeout: Duration) -> std::io::Result<Self> {
        let socket_dir = socket_dir.into();
        std::fs::create_dir_all(&socket_dir)?;
        let (signal_tx, _) = broadcast::channel(SIGNAL_CAPACITY);
        Ok(MpvBus {
            inner: Arc::new(Inner {
                socket_dir,
                connect_attempts,
                call_timeout,
                connections: Mutex::new(HashMap::new()),
                watchers: Mutex::new(HashMap::new()),
                signal_tx,
            }),
        })
    }

    pub fn from_settings(settings: &Settings) -> std::io::Result<Self> {
        Self::new(&settings.socket_dir, settings.connect_attempts, settings.ipc_timeout())
    }

    async fn send(&self, destination: &str, cmd: MpvCommand) -> Result<MpvResponse, BusError> {
        let connection = self
            .inner
            .connections
            .lock()
            .get(destination)
            .cloned()
            .ok_or_else(|| BusError::NotConnected(destination.to_string()))?;

        let response = connection.send_command(cmd, self.inner.call_timeout).await?;
        if !response.is_success() {
            return Err(BusError::Backend(response.error));
        }
        Ok(response)
    }
}

impl Inner {
    fn publish(&self, signal: BusSignal) {
        if self.signal_tx.send(signal).is_err() {
            debug!(target: LOG_TARGET, "No bus subscribers.");
        }
    }

    #[instrument(skip(self, name), fields(bus_name = %name))]
    async fn watch(self: Arc<Self>, name: String) {
        let path = socket_path(&self.socket_dir, &name);
        let (connection, closed) = match IpcConnection::connect(&path, self.connect_attempts).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(target: LOG_TARGET, "Backend never attached to {:?}: {}", path, e);
                return;
            }
        };

        let owner = format!(":mpv-{}", Uuid::new_v4().simple());
        info!(target: LOG_TARGET, %owner, "Backend acquired bus name.");
        self.connections.lock().insert(name.clone(), Arc::new(connection));
        self.publish(BusSignal::name_owner_changed(&name, "", &owner));

        let _ = closed.await;

        info!(target: LOG_TARGET, %owner, "Backend released bus name.");
        self.connections.lock().remove(&name);
        if let Err(e) = std::fs::remove_file(&path) {
            debug!(target: LOG_TARGET, "Could not remove {:?}: {}", path, e);
        }
        self.publish(BusSignal::name_owner_changed(&name, &owner, ""));
    }
}

#[async_trait]
impl MediaBus for MpvBus {
    fn subscribe(&self) -> broadcast::Receiver<BusSignal> {
        self.inner.signal_tx.subscribe()
    }

    fn watch_name(&self, name: &str) {
        let watcher = tokio::spawn(self.inner.clone().watch(name.to_string()));
        if let Some(previous) = self.inner.watchers.lock().insert(name.to_string(), watcher) {
            previous.abort();
        }
    }

    fn unwatch_name(&self, name: &str) {
        if let Some(watcher) = self.inner.watchers.lock().remove(name) {
            debug!(target: LOG_TARGET, bus_name = %name, "Dropping watcher.");
            watcher.abort();
        }
        self.inner.connections.lock().remove(name);

        let path = socket_path(&self.inner.socket_dir, name);
        match std::fs::remove_file(&path) {
            Ok(()) => debug!(target: LOG_TARGET, "Removed stale socket {:?}", path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => debug!(target: LOG_TARGET, "Could not remove {:?}: {}", path, e),
        }
    }

    async fn call(&self, destination: &str, method: BusMethod) -> Result<(), BusError> {
        let cmd = match method {
            BusMethod::SetPosition(micros) => MpvCommand::seek(micros as f64 / 1_000_000.0),
            BusMethod::Play => MpvCommand::set_pause(false),
            BusMethod::Pause => MpvCommand::set_pause(true),
        };
        self.send(destination, cmd).await?;
        Ok(())
    }

    async fn position(&self, destination: &str) -> Result<i64, BusError> {
        let response = self.send(destination, MpvCommand::get_property("time-pos")).await?;
        match response.data {
            Some(Value::Number(n)) => n
                .as_f64()
                .map(|seconds| (seconds * 1_000_000.0).round() as i64)
                .ok_or_else(|| BusError::UnexpectedReply(n.to_string())),
            other => Err(BusError::UnexpectedReply(format!("{:?}", other))),
        }
    }
}
