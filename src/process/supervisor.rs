// src/process/supervisor.rs
use std::fmt;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tracing::{debug, error, info, instrument, warn};

use super::ProcessError;

const LOG_TARGET: &str = "r_jukybox::process";

/// How a supervised process ended, with whatever it printed.
#[derive(Debug)]
pub struct ProcessExit {
    pub status: Result<ExitStatus, ProcessError>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessExit {
    fn failed(err: ProcessError) -> Self {
        ProcessExit {
            status: Err(err),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// True only for a process that ran and exited with status zero.
    pub fn success(&self) -> bool {
        matches!(&self.status, Ok(status) if status.success())
    }

    /// True when the process never got to run.
    pub fn never_started(&self) -> bool {
        matches!(
            &self.status,
            Err(ProcessError::NotFound | ProcessError::EmptyCommandLine | ProcessError::SpawnFailed(_))
        )
    }
}

/// Resolves once, when the supervised process is gone.
pub type ExitNotification = oneshot::Receiver<ProcessExit>;

/// Control surface of a spawned backend.
pub trait ProcessControl: Send + Sync + fmt::Debug {
    /// Ask the process to terminate gracefully. Calling this after the
    /// process exited, or a second time, does nothing.
    fn interrupt(&mut self);

    fn id(&self) -> Option<u32>;
}

/// A launched backend: its control handle plus its exit notification.
#[derive(Debug)]
pub struct Spawned {
    pub control: Box<dyn ProcessControl>,
    pub exit: ExitNotification,
}

/// Handle to a child started by [`spawn`]. Interrupts with SIGINT.
///
/// The signal is delivered by the task that owns the child, and only while
/// the child has not been reaped, so a recycled PID is never signalled.
#[derive(Debug)]
pub struct ChildHandle {
    pid: Option<u32>,
    interrupt_tx: Option<oneshot::Sender<()>>,
}

impl ProcessControl for ChildHandle {
    fn interrupt(&mut self) {
        let Some(tx) = self.interrupt_tx.take() else {
            debug!(target: LOG_TARGET, pid = ?self.pid, "Process already interrupted or never started.");
            return;
        };
        if tx.send(()).is_err() {
            debug!(target: LOG_TARGET, pid = ?self.pid, "Process already exited; interrupt skipped.");
        }
    }

    fn id(&self) -> Option<u32> {
        self.pid
    }
}

fn send_interrupt(child: &Child) {
    // `id()` is `None` once the child has been reaped.
    let Some(pid) = child.id() else {
        debug!(target: LOG_TARGET, "Process already reaped; interrupt skipped.");
        return;
    };
    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGINT) };
    if rc == 0 {
        info!(target: LOG_TARGET, pid, "Sent SIGINT to backend process.");
    } else {
        warn!(target: LOG_TARGET, pid, "Failed to interrupt backend process: {}", std::io::Error::last_os_error());
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            debug!(target: LOG_TARGET, "Failed to read process output: {}", e);
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Waits for `child`, forwarding at most one interrupt request to it first.
async fn wait_for_child(child: &mut Child, mut interrupt_rx: oneshot::Receiver<()>) -> std::io::Result<ExitStatus> {
    tokio::select! {
        status = child.wait() => status,
        request = &mut interrupt_rx => {
            // A dropped handle is not an interrupt request.
            if request.is_ok() {
                send_interrupt(child);
            }
            child.wait().await
        }
    }
}

/// Builds a [`Spawned`] for a process that could not be started. The exit
/// notification is already resolved with `err`.
pub fn spawn_failed(err: ProcessError) -> Spawned {
    error!(target: LOG_TARGET, "Backend did not start: {}", err);
    let (exit_tx, exit_rx) = oneshot::channel();
    let _ = exit_tx.send(ProcessExit::failed(err));
    Spawned {
        control: Box::new(ChildHandle {
            pid: None,
            interrupt_tx: None,
        }),
        exit: exit_rx,
    }
}

/// Spawns `command_line` with stdout/stderr captured.
///
/// Must be called from within a Tokio runtime; the wait runs on a separate task.
#[instrument(skip(command_line), fields(program = command_line.first().map(String::as_str).unwrap_or("")))]
pub fn spawn(command_line: &[String]) -> Spawned {
    let Some((program, args)) = command_line.split_first() else {
        return spawn_failed(ProcessError::EmptyCommandLine);
    };

    info!(target: LOG_TARGET, "Executing command {:?}", command_line);
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn();

    let mut child = match child {
        Ok(child) => child,
        Err(e) => return spawn_failed(ProcessError::SpawnFailed(e)),
    };

    let pid = child.id();
    let (interrupt_tx, interrupt_rx) = oneshot::channel();
    let (exit_tx, exit_rx) = oneshot::channel();

    tokio::spawn(async move {
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (status, stdout, stderr) = tokio::join!(
            wait_for_child(&mut child, interrupt_rx),
            read_pipe(stdout),
            read_pipe(stderr)
        );
        let exit = ProcessExit {
            status: status.map_err(ProcessError::WaitFailed),
            stdout,
            stderr,
        };

        info!(
            target: LOG_TARGET,
            pid = ?pid,
            "Finished process {:?} stdout:{} stderr:{}",
            exit.status,
            exit.stdout.trim_end(),
            exit.stderr.trim_end()
        );
        if exit_tx.send(exit).is_err() {
            debug!(target: LOG_TARGET, pid = ?pid, "Nobody is waiting for the exit notification.");
        }
    });

    Spawned {
        control: Box::new(ChildHandle {
            pid,
            interrupt_tx: Some(interrupt_tx),
        }),
        exit: exit_rx,
    }
}
