//! mpv JSON IPC message types.
//!
//! Reference: https://mpv.io/manual/master/#json-ipc

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};

static REQUEST_ID: AtomicI64 = AtomicI64::new(1);

fn next_request_id() -> i64 {
    REQUEST_ID.fetch_add(1, Ordering::SeqCst)
}

/// Command sent to mpv.
#[derive(Debug, Clone, Serialize)]
pub struct MpvCommand {
    pub command: Vec<Value>,
    pub request_id: i64,
}

impl MpvCommand {
    pub fn new(args: Vec<Value>) -> Self {
        Self {
            command: args,
            request_id: next_request_id(),
        }
    }

    /// Absolute seek, in seconds.
    pub fn seek(seconds: f64) -> Self {
        Self::new(vec!["seek".into(), seconds.into(), "absolute".into()])
    }

    pub fn set_pause(paused: bool) -> Self {
        Self::new(vec!["set_property".into(), "pause".into(), paused.into()])
    }

    pub fn get_property(name: &str) -> Self {
        Self::new(vec!["get_property".into(), name.into()])
    }
}

/// Reply to an [`MpvCommand`], matched by `request_id`.
#[derive(Debug, Clone, Deserialize)]
pub struct MpvResponse {
    /// "success" or an error message.
    pub error: String,
    #[serde(default)]
    pub data: Option<Value>,
    pub request_id: i64,
}

impl MpvResponse {
    pub fn is_success(&self) -> bool {
        self.error == "success"
    }
}

/// Unsolicited notification (e.g. "playback-restart", "end-file").
#[derive(Debug, Clone, Deserialize)]
pub struct MpvEvent {
    pub event: String,
}

#[derive(Debug, Clone)]
pub enum MpvMessage {
    Response(MpvResponse),
    Event(MpvEvent),
}

impl MpvMessage {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(line)?;
        if value.get("request_id").is_some() && value.get("event").is_none() {
            Ok(MpvMessage::Response(serde_json::from_value(value)?))
        } else {
            Ok(MpvMessage::Event(serde_json::from_value(value)?))
        }
    }
}
