use std::path::PathBuf;

use tracing::{debug, info};

use crate::bus::socket_path;
use crate::config::Settings;
use crate::process::{self, LaunchRequest, Launcher, ProcessError, Spawned};

const LOG_TARGET: &str = "r_jukybox::backend";

/// Codecs mpv is told to pass through untouched when passthrough is requested.
pub const PASSTHROUGH_CODECS: &str = "ac3,dts,eac3,truehd,dts-hd";

/// Find the mpv executable on PATH or in common install locations.
pub fn find_mpv() -> Option<PathBuf> {
    if let Ok(path) = which::which("mpv") {
        return Some(path);
    }

    ["/usr/bin/mpv", "/usr/local/bin/mpv", "/opt/homebrew/bin/mpv"]
        .into_iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

/// How to invoke the backend for a session.
#[derive(Debug, Clone)]
pub struct BackendProfile {
    /// Executable; `None` means auto-detect mpv at launch time.
    pub program: Option<PathBuf>,
    /// Extra arguments, placed before the file.
    pub extra_args: Vec<String>,
    /// Where per-session IPC sockets live.
    pub socket_dir: PathBuf,
}

impl BackendProfile {
    pub fn from_settings(settings: &Settings) -> Self {
        BackendProfile {
            program: settings.backend_path.as_ref().filter(|s| !s.is_empty()).map(PathBuf::from),
            extra_args: settings.backend_args.clone(),
            socket_dir: settings.socket_dir.clone(),
        }
    }

    fn resolve_program(&self) -> Result<PathBuf, ProcessError> {
        self.program.clone().or_else(find_mpv).ok_or(ProcessError::NotFound)
    }

    /// Full command line for `request`.
    pub fn command_line(&self, request: &LaunchRequest) -> Result<Vec<String>, ProcessError> {
        let program = self.resolve_program()?;
        let socket = socket_path(&self.socket_dir, &request.bus_name);

        let mut cmd = vec![
            program.to_string_lossy().into_owned(),
            "--no-video".to_string(),
            "--no-terminal".to_string(),
            "--idle=no".to_string(),
            format!("--input-ipc-server={}", socket.display()),
            format!("--start={:.3}", request.position.as_secs_f64()),
        ];
        if request.passthrough {
            cmd.push(format!("--audio-spdif={}", PASSTHROUGH_CODECS));
        }
        cmd.extend(self.extra_args.iter().cloned());
        // Keep file names starting with '-' from being read as options.
        cmd.push("--".to_string());
        cmd.push(request.file.clone());
        Ok(cmd)
    }
}

/// [`Launcher`] that spawns the backend described by a [`BackendProfile`].
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    profile: BackendProfile,
}

impl CommandLauncher {
    pub fn new(profile: BackendProfile) -> Self {
        CommandLauncher { profile }
    }
}

impl Launcher for CommandLauncher {
    fn launch(&self, request: &LaunchRequest) -> Spawned {
        debug!(target: LOG_TARGET, "Launching backend for {:?}", request);
        match self.profile.command_line(request) {
            Ok(cmd) => {
                info!(target: LOG_TARGET, file = %request.file, bus_name = %request.bus_name, "Starting backend.");
                process::spawn(&cmd)
            }
            Err(e) => process::spawn_failed(e),
        }
    }
}
