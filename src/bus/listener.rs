use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{trace, warn};

use super::{BusSignal, OwnerChange};

const LOG_TARGET: &str = "r_jukybox::bus::listener";

/// Forwards ownership changes for the active session's bus name and drops
/// everything else.
pub struct SignalListener {
    rx: broadcast::Receiver<BusSignal>,
    closed: bool,
}

impl SignalListener {
    pub fn new(rx: broadcast::Receiver<BusSignal>) -> Self {
        SignalListener { rx, closed: false }
    }

    /// Waits for the next ownership change of `active`.
    ///
    /// Signals for other names, other members and malformed payloads are
    /// logged and discarded. With no active name every signal is discarded.
    /// Once the bus is gone this never resolves. Cancel safe.
    pub async fn next_for(&mut self, active: Option<&str>) -> OwnerChange {
        loop {
            if self.closed {
                return std::future::pending().await;
            }
            let signal = match self.rx.recv().await {
                Ok(signal) => signal,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(target: LOG_TARGET, "Signal listener lagged; {} signals lost.", skipped);
                    continue;
                }
                Err(RecvError::Closed) => {
                    warn!(target: LOG_TARGET, "Bus closed; no further signals will arrive.");
                    self.closed = true;
                    continue;
                }
            };
            trace!(target: LOG_TARGET, "Bus signal: {} {:?}", signal.member, signal.args);

            match OwnerChange::parse(&signal) {
                Ok(Some(change)) if Some(change.object_name.as_str()) == active => return change,
                Ok(Some(change)) => {
                    trace!(target: LOG_TARGET, name = %change.object_name, "Ignoring owner change for inactive name.");
                }
                Ok(None) => {}
                Err(e) => warn!(target: LOG_TARGET, "Dropping signal {}: {}", signal.member, e),
            }
        }
    }
}
