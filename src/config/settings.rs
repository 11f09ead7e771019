//! Application settings and configuration management

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Settings {
    /// Backend executable (auto-detects mpv when unset)
    #[serde(default)]
    pub backend_path: Option<String>,
    /// Extra arguments passed to the backend
    #[serde(default)]
    pub backend_args: Vec<String>,
    /// Directory holding per-session IPC sockets
    #[serde(default = "default_socket_dir")]
    pub socket_dir: PathBuf,
    /// Position poll period while playing, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Capacity of the player command queue
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
    /// Events buffered per event-stream subscriber
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Upper bound on a single IPC call, in milliseconds
    #[serde(default = "default_ipc_timeout_ms")]
    pub ipc_timeout_ms: u64,
    /// Attempts at attaching to a freshly spawned backend's IPC socket
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
}

fn default_socket_dir() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("jukybox")
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_command_buffer() -> usize {
    // A zero-sized queue can deadlock a caller issuing commands from an event handler.
    10
}

fn default_event_capacity() -> usize {
    64
}

fn default_ipc_timeout_ms() -> u64 {
    5000
}

fn default_connect_attempts() -> u32 {
    50
}

/// Error types for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    IoError(io::Error),
    ParseError(String),
    ValidationError(String),
}

impl From<io::Error> for ConfigError {
    fn from(err: io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "I/O error: {}", e),
            ConfigError::ParseError(s) => write!(f, "Parse error: {}", s),
            ConfigError::ValidationError(s) => write!(f, "Validation error: {}", s),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            backend_path: None,
            backend_args: Vec::new(),
            socket_dir: default_socket_dir(),
            poll_interval_ms: default_poll_interval_ms(),
            command_buffer: default_command_buffer(),
            event_capacity: default_event_capacity(),
            ipc_timeout_ms: default_ipc_timeout_ms(),
            connect_attempts: default_connect_attempts(),
        }
    }
}

impl Settings {
    /// Load settings from a file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    /// Save settings to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(&self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config").join("jukybox").join("config.json")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn ipc_timeout(&self) -> Duration {
        Duration::from_millis(self.ipc_timeout_ms)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError("Poll interval must be positive".to_string()));
        }
        if self.command_buffer == 0 || self.event_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "Command buffer and event capacity must be positive".to_string(),
            ));
        }
        if self.ipc_timeout_ms == 0 {
            return Err(ConfigError::ValidationError("IPC timeout must be positive".to_string()));
        }
        if self.socket_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError("Socket directory cannot be empty".to_string()));
        }
        Ok(())
    }
}
