//! Command-line interface implementation

use clap::Parser;
use std::error::Error;
use std::time::Duration;

use crate::player::{PlayerEvent, PlayerState};

/// Command-line arguments for r-jukybox
#[derive(Parser, Debug)]
#[command(author, version, about = "Single-session media player driving an external backend", long_about = None)]
pub struct Args {
    /// Media file to play
    pub file: String,

    /// Start position in seconds
    #[arg(short, long, default_value_t = 0.0)]
    pub position: f64,

    /// Send compressed audio straight to the output device
    #[arg(long)]
    pub passthrough: bool,

    /// Backend executable (defaults to mpv)
    #[arg(short, long, env = "JUKYBOX_BACKEND")]
    pub backend: Option<String>,

    /// Directory for backend IPC sockets
    #[arg(long, env = "JUKYBOX_SOCKET_DIR")]
    pub socket_dir: Option<String>,

    /// Position poll interval in milliseconds
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Config file path
    #[arg(short, long, env = "JUKYBOX_CONFIG")]
    pub config: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,
}

impl Args {
    /// Requested start position; negative or non-finite values start from zero.
    pub fn start_position(&self) -> Duration {
        Duration::try_from_secs_f64(self.position).unwrap_or(Duration::ZERO)
    }
}

/// Interactive commands read from stdin while playing.
#[derive(Debug, Clone, PartialEq)]
pub enum Interactive {
    Pause,
    Resume,
    Seek(Duration),
    Open(String),
    Quit,
}

/// Parse one line of interactive input.
pub fn parse_interactive(line: &str) -> Result<Interactive, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    match word {
        "p" | "pause" => Ok(Interactive::Pause),
        "r" | "resume" => Ok(Interactive::Resume),
        "q" | "quit" => Ok(Interactive::Quit),
        "s" | "seek" => rest
            .parse::<f64>()
            .ok()
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .map(Interactive::Seek)
            .ok_or_else(|| format!("Invalid seek position: '{}'", rest)),
        "o" | "open" if !rest.is_empty() => Ok(Interactive::Open(rest.to_string())),
        "o" | "open" => Err("Usage: o <file>".to_string()),
        "" => Err("Empty command".to_string()),
        other => Err(format!("Unknown command: '{}'", other)),
    }
}

/// Formats a position as `m:ss` (or `h:mm:ss` past an hour).
pub fn format_position(position: Duration) -> String {
    let total = position.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total / 60) % 60, total % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

pub fn format_event(event: &PlayerEvent) -> String {
    let marker = match event.state {
        PlayerState::Starting => "..",
        PlayerState::Playing => ">",
        PlayerState::Paused => "||",
        PlayerState::Finishing => "<<",
        PlayerState::Finished => "[]",
    };
    format!(
        "{:<2} {:<9} {} {}",
        marker,
        event.state.to_string(),
        format_position(event.position),
        event.file
    )
}

/// CLI user interface for interacting with the application
pub struct Cli {
    pub args: Args,
}

impl Cli {
    /// Create a new CLI instance
    pub fn new() -> Self {
        Cli { args: Args::parse() }
    }

    /// Display the interactive key help
    pub fn display_controls(&self) {
        println!("Controls: [p]ause, [r]esume, [s]eek <seconds>, [o]pen <file>, [q]uit");
    }

    /// Display one player event as a status line
    pub fn display_event(&self, event: &PlayerEvent) {
        println!("{}", format_event(event));
    }

    /// Display error messages
    pub fn display_error(&self, error: &dyn Error) {
        eprintln!("Error: {}", error);
    }

    pub fn display_message(&self, message: &str) {
        eprintln!("{}", message);
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self::new()
    }
}
