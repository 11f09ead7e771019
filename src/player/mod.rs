//! The player core: a single task that owns the playback session.
//!
//! Commands, backend exits, bus signals and poll ticks are all funnelled into
//! one loop (`run_loop.rs`), so transitions never run concurrently and the
//! state needs no locking.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::bus::{BusMethod, MediaBus, SignalListener};
use crate::config::Settings;
use crate::process::{LaunchRequest, Launcher, Spawned};

mod command_handler;
mod poller;
mod run_loop;
mod session;
mod state;

pub use poller::PositionPoller;
pub use session::{new_bus_name, PositionClock, BUS_NAME_DOMAIN};
pub use state::{PendingPlay, PlayerCommand, PlayerEvent, PlayerState};

use session::Session;

const PLAYER_LOG_TARGET: &str = "r_jukybox::player";

/// Tunables for a [`Player`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerOptions {
    pub poll_interval: Duration,
    pub command_buffer: usize,
    pub event_capacity: usize,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        PlayerOptions {
            poll_interval: Duration::from_secs(1),
            command_buffer: 10,
            event_capacity: 64,
        }
    }
}

impl PlayerOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        PlayerOptions {
            poll_interval: settings.poll_interval(),
            command_buffer: settings.command_buffer.max(1),
            event_capacity: settings.event_capacity.max(1),
        }
    }
}

/// What the event stream reports once the session is gone.
#[derive(Debug, Default)]
struct Retired {
    file: String,
    position: Duration,
}

/// Whether the run loop keeps going after handling an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

/// Owns the playback session. Run it with [`Player::run`] on its own task and
/// drive it through the [`PlayerHandle`].
pub struct Player {
    // --- State ---
    state: PlayerState,
    session: Option<Session>,
    retired: Retired,
    pending: Option<PendingPlay>,
    /// Set once a stop is in flight; silences the event stream.
    halting: bool,
    poller: Option<PositionPoller>,
    poll_interval: Duration,

    // --- Communication ---
    command_rx: mpsc::Receiver<PlayerCommand>,
    commands_open: bool,
    event_tx: broadcast::Sender<PlayerEvent>,
    stop_waiters: Vec<oneshot::Sender<()>>,

    // --- Collaborators ---
    launcher: Arc<dyn Launcher>,
    bus: Arc<dyn MediaBus>,
    listener: SignalListener,
}

impl Player {
    /// Creates a new Player and the handle used to command it.
    /// The bus subscription is taken here, before any backend can be spawned.
    pub fn new(launcher: Arc<dyn Launcher>, bus: Arc<dyn MediaBus>, options: PlayerOptions) -> (Self, PlayerHandle) {
        let (command_tx, command_rx) = mpsc::channel(options.command_buffer);
        let (event_tx, _) = broadcast::channel(options.event_capacity);
        let listener = SignalListener::new(bus.subscribe());

        let player = Player {
            state: PlayerState::Finished,
            session: None,
            retired: Retired::default(),
            pending: None,
            halting: false,
            poller: None,
            poll_interval: options.poll_interval,
            command_rx,
            commands_open: true,
            event_tx: event_tx.clone(),
            stop_waiters: Vec::new(),
            launcher,
            bus,
            listener,
        };

        (player, PlayerHandle { command_tx, event_tx })
    }

    /// Creates a Player and runs it on a new Tokio task.
    pub fn spawn(launcher: Arc<dyn Launcher>, bus: Arc<dyn MediaBus>, options: PlayerOptions) -> PlayerHandle {
        let (player, handle) = Self::new(launcher, bus, options);
        tokio::spawn(player.run());
        handle
    }

    /// Runs the player's event loop until it is stopped.
    pub async fn run(mut self) {
        run_loop::run_player_loop(&mut self).await;
    }

    // --- Event emission ---

    fn current_file(&self) -> &str {
        match &self.session {
            Some(session) => &session.file,
            None => &self.retired.file,
        }
    }

    fn estimated_position(&self) -> Duration {
        match &self.session {
            Some(session) => session.clock.estimate(self.state == PlayerState::Playing),
            None => self.retired.position,
        }
    }

    fn emit(&self) {
        self.emit_with_position(self.estimated_position());
    }

    fn emit_with_position(&self, position: Duration) {
        if self.halting {
            return;
        }
        let event = PlayerEvent {
            state: self.state,
            file: self.current_file().to_string(),
            position,
        };
        trace!(target: PLAYER_LOG_TARGET, "Emitting {:?}", event);
        if self.event_tx.send(event).is_err() {
            debug!(target: PLAYER_LOG_TARGET, "No active listeners for player events.");
        }
    }

    // --- Transitions ---

    fn change_state(&mut self, state: PlayerState) {
        if self.state == state {
            return;
        }
        info!(target: PLAYER_LOG_TARGET, "Changing state: {} -> {}", self.state, state);

        if self.state == PlayerState::Playing {
            if self.poller.take().is_some() {
                debug!(target: PLAYER_LOG_TARGET, "Stopping poll timer.");
            }
            if let Some(session) = self.session.as_mut() {
                session.clock.freeze();
            }
        }

        match state {
            PlayerState::Playing => {
                self.state = PlayerState::Playing;
                self.poller = Some(PositionPoller::start(self.poll_interval));
                let position = match self.session.as_mut() {
                    Some(session) => {
                        let position = session.clock.position();
                        session.clock.observe(position);
                        position
                    }
                    None => self.retired.position,
                };
                self.emit_with_position(position);
            }
            PlayerState::Finished => match self.pending.take() {
                Some(next) => self.start_session(next),
                None => {
                    self.state = PlayerState::Finished;
                    self.emit();
                }
            },
            _ => {
                self.state = state;
                self.emit();
            }
        }
    }

    /// Spawns a backend for `request` and enters `Starting`.
    fn start_session(&mut self, request: PendingPlay) {
        let bus_name = session::new_bus_name();
        let launch = LaunchRequest {
            file: request.file,
            position: request.position,
            passthrough: request.passthrough,
            bus_name,
        };
        info!(target: PLAYER_LOG_TARGET, file = %launch.file, bus_name = %launch.bus_name, "Starting backend at {:?}", launch.position);

        let Spawned { control, exit } = self.launcher.launch(&launch);
        self.bus.watch_name(&launch.bus_name);
        self.session = Some(Session::new(control, exit, launch.file, launch.bus_name, launch.position));
        self.pending = None;
        self.change_state(PlayerState::Starting);
    }

    /// Interrupts the backend and enters `Finishing`, unless already there.
    fn interrupt(&mut self) {
        if self.state == PlayerState::Finishing {
            return;
        }
        info!(target: PLAYER_LOG_TARGET, "Interrupting current backend.");
        self.change_state(PlayerState::Finishing);
        if let Some(session) = self.session.as_mut() {
            session.process.interrupt();
        }
    }

    /// Drops the session, remembering what it was playing.
    fn retire_session(&mut self) {
        if self.state == PlayerState::Playing {
            self.poller = None;
            if let Some(session) = self.session.as_mut() {
                session.clock.freeze();
            }
        }
        if let Some(session) = self.session.take() {
            self.bus.unwatch_name(&session.bus_name);
            self.retired = Retired {
                file: session.file,
                position: session.clock.position(),
            };
        }
    }

    /// Best-effort remote call: failures are logged and otherwise ignored.
    async fn call_backend(&self, method: BusMethod) {
        let Some(session) = self.session.as_ref() else {
            debug!(target: PLAYER_LOG_TARGET, "No backend to receive {:?}", method);
            return;
        };
        if let Err(e) = self.bus.call(&session.bus_name, method).await {
            warn!(target: PLAYER_LOG_TARGET, bus_name = %session.bus_name, "Backend call {:?} failed: {}", method, e);
        }
    }
}

/// Cloneable front end to a running [`Player`].
#[derive(Clone)]
pub struct PlayerHandle {
    command_tx: mpsc::Sender<PlayerCommand>,
    event_tx: broadcast::Sender<PlayerEvent>,
}

impl PlayerHandle {
    /// Play `file` from `position`. Returns once the command is queued.
    pub async fn play(&self, file: impl Into<String>, position: Duration, passthrough: bool) {
        self.send(PlayerCommand::Play {
            file: file.into(),
            position,
            passthrough,
        })
        .await;
    }

    pub async fn pause(&self) {
        self.send(PlayerCommand::Pause).await;
    }

    /// Stops playback and waits until the player task has exited.
    /// Returns immediately if it already has.
    pub async fn stop(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if !self.send(PlayerCommand::Stop(done_tx)).await {
            return;
        }
        info!(target: PLAYER_LOG_TARGET, "Waiting for player to stop.");
        let _ = done_rx.await;
        info!(target: PLAYER_LOG_TARGET, "Player stopped.");
    }

    /// Events emitted from now on; there is no backlog replay.
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.event_tx.subscribe()
    }

    /// Whether the player task is still accepting commands.
    pub fn is_running(&self) -> bool {
        !self.command_tx.is_closed()
    }

    async fn send(&self, command: PlayerCommand) -> bool {
        trace!(target: PLAYER_LOG_TARGET, "Sending command {:?}", command);
        if self.command_tx.send(command).await.is_err() {
            debug!(target: PLAYER_LOG_TARGET, "Player task is gone; command dropped.");
            return false;
        }
        true
    }
}
