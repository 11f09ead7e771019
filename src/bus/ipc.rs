//! Async connection to one mpv IPC socket.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use super::protocol::{MpvCommand, MpvMessage, MpvResponse};
use super::BusError;

const LOG_TARGET: &str = "r_jukybox::bus::ipc";

type PendingRequests = Arc<Mutex<HashMap<i64, oneshot::Sender<MpvResponse>>>>;

pub struct IpcConnection {
    pending: PendingRequests,
    write_tx: mpsc::UnboundedSender<Vec<u8>>,
    reader_handle: JoinHandle<()>,
    writer_handle: JoinHandle<()>,
}

impl IpcConnection {
    /// Connects to the socket at `path`, retrying while the backend is still
    /// creating it. The returned receiver resolves when the connection closes.
    pub async fn connect(path: &Path, attempts: u32) -> Result<(Self, oneshot::Receiver<()>), BusError> {
        let mut last_error = None;

        for attempt in 0..attempts.max(1) {
            if attempt > 0 {
                let backoff = 100 * u64::from(attempt.min(5));
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }
            match UnixStream::connect(path).await {
                Ok(stream) => return Ok(Self::setup(stream)),
                Err(e) => {
                    trace!(target: LOG_TARGET, "IPC connect attempt {} to {:?} failed: {}", attempt + 1, path, e);
                    last_error = Some(e);
                }
            }
        }

        Err(BusError::ConnectionFailed(
            last_error.map(|e| e.to_string()).unwrap_or_else(|| "unknown error".into()),
        ))
    }

    fn setup(stream: UnixStream) -> (Self, oneshot::Receiver<()>) {
        let (reader, writer) = stream.into_split();
        let pending: PendingRequests = Arc::new(Mutex::new(HashMap::new()));
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = oneshot::channel();

        let reader_pending = pending.clone();
        let reader_handle = tokio::spawn(async move {
            Self::reader_loop(reader, reader_pending).await;
            let _ = closed_tx.send(());
        });
        let writer_handle = tokio::spawn(Self::writer_loop(writer, write_rx));

        (
            IpcConnection {
                pending,
                write_tx,
                reader_handle,
                writer_handle,
            },
            closed_rx,
        )
    }

    async fn reader_loop<R: tokio::io::AsyncRead + Unpin>(reader: R, pending: PendingRequests) {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match MpvMessage::parse(line) {
                        Ok(MpvMessage::Response(response)) => {
                            let waiter = pending.lock().remove(&response.request_id);
                            match waiter {
                                Some(tx) => {
                                    let _ = tx.send(response);
                                }
                                None => debug!(target: LOG_TARGET, "Reply for unknown request_id={}", response.request_id),
                            }
                        }
                        Ok(MpvMessage::Event(event)) => {
                            trace!(target: LOG_TARGET, "Ignoring mpv event {}", event.event);
                        }
                        Err(e) => warn!(target: LOG_TARGET, "Failed to parse mpv message: {} - {}", e, line),
                    }
                }
                Ok(None) => {
                    debug!(target: LOG_TARGET, "IPC connection closed by backend.");
                    break;
                }
                Err(e) => {
                    error!(target: LOG_TARGET, "IPC read error: {}", e);
                    break;
                }
            }
        }
        // Dropping the senders fails every outstanding call with Disconnected.
        pending.lock().clear();
    }

    async fn writer_loop<W: tokio::io::AsyncWrite + Unpin>(mut writer: W, mut write_rx: mpsc::UnboundedReceiver<Vec<u8>>) {
        while let Some(mut data) = write_rx.recv().await {
            data.push(b'\n');
            if let Err(e) = writer.write_all(&data).await {
                error!(target: LOG_TARGET, "IPC write error: {}", e);
                break;
            }
            if let Err(e) = writer.flush().await {
                error!(target: LOG_TARGET, "IPC flush error: {}", e);
                break;
            }
        }
    }

    /// Sends `cmd` and waits up to `timeout` for its reply.
    pub async fn send_command(&self, cmd: MpvCommand, timeout: Duration) -> Result<MpvResponse, BusError> {
        let request_id = cmd.request_id;
        let json = serde_json::to_vec(&cmd).map_err(|e| BusError::WriteFailed(e.into()))?;
        trace!(target: LOG_TARGET, "Sending mpv command: {}", String::from_utf8_lossy(&json));

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id, tx);

        if self.write_tx.send(json).is_err() {
            self.pending.lock().remove(&request_id);
            return Err(BusError::Disconnected);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(BusError::Disconnected),
            Err(_) => {
                self.pending.lock().remove(&request_id);
                Err(BusError::Timeout)
            }
        }
    }
}

impl Drop for IpcConnection {
    fn drop(&mut self) {
        self.reader_handle.abort();
        self.writer_handle.abort();
    }
}
