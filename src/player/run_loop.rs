// src/player/run_loop.rs
use tokio::sync::oneshot::error::RecvError;
use tracing::{debug, error, info, trace, warn};

use super::poller::next_tick;
use super::session::from_micros;
use super::{command_handler, Flow, Player, PlayerCommand, PlayerState, PLAYER_LOG_TARGET};
use crate::bus::OwnerChange;
use crate::process::{ExitNotification, ProcessExit};

/// One input to the player, whichever source it came from.
enum LoopInput {
    Command(Option<PlayerCommand>),
    Exit(Result<ProcessExit, RecvError>),
    Signal(OwnerChange),
    Tick,
}

async fn wait_for_exit(exit: Option<&mut ExitNotification>) -> Result<ProcessExit, RecvError> {
    match exit {
        Some(exit) => exit.await,
        None => std::future::pending().await,
    }
}

/// Runs the player's event loop.
pub async fn run_player_loop(player: &mut Player) {
    info!(target: PLAYER_LOG_TARGET, "Player run loop started.");

    loop {
        let active_name = player.session.as_ref().map(|s| s.bus_name.clone());

        // No priority between sources: whichever is ready first is handled first.
        let input = tokio::select! {
            command = player.command_rx.recv(), if player.commands_open => LoopInput::Command(command),
            exit = wait_for_exit(player.session.as_mut().map(|s| &mut s.exit)) => LoopInput::Exit(exit),
            change = player.listener.next_for(active_name.as_deref()) => LoopInput::Signal(change),
            _ = next_tick(player.poller.as_mut()) => LoopInput::Tick,
        };

        let flow = match input {
            LoopInput::Command(Some(command)) => {
                info!(target: PLAYER_LOG_TARGET, "Player command: {:?}", command);
                match command {
                    PlayerCommand::Play { file, position, passthrough } => {
                        command_handler::handle_play(player, file, position, passthrough).await;
                        Flow::Continue
                    }
                    PlayerCommand::Pause => {
                        command_handler::handle_pause(player).await;
                        Flow::Continue
                    }
                    PlayerCommand::Stop(done) => command_handler::handle_stop(player, done),
                }
            }
            LoopInput::Command(None) => {
                info!(target: PLAYER_LOG_TARGET, "All player handles dropped; stopping.");
                player.commands_open = false;
                command_handler::halt(player)
            }
            LoopInput::Exit(exit) => handle_exit(player, exit),
            LoopInput::Signal(change) => {
                handle_owner_change(player, change);
                Flow::Continue
            }
            LoopInput::Tick => {
                poll_position(player).await;
                Flow::Continue
            }
        };

        if flow == Flow::Exit {
            break;
        }
        debug_assert_eq!(
            player.session.is_some(),
            player.state.has_session(),
            "session bookkeeping out of step with state {}",
            player.state
        );
    }

    player.poller = None;
    player.retire_session();
    player.state = PlayerState::Finished;

    info!(target: PLAYER_LOG_TARGET, "Signaling done.");
    for waiter in player.stop_waiters.drain(..) {
        let _ = waiter.send(());
    }
}

fn handle_exit(player: &mut Player, exit: Result<ProcessExit, RecvError>) -> Flow {
    match &exit {
        Ok(exit) if exit.never_started() => {
            error!(target: PLAYER_LOG_TARGET, "Backend never started: {:?}", exit.status);
        }
        Ok(exit) => {
            info!(target: PLAYER_LOG_TARGET, "Backend finished: {:?}", exit.status);
        }
        Err(_) => {
            warn!(target: PLAYER_LOG_TARGET, "Process supervisor went away without reporting an exit.");
        }
    }

    player.retire_session();
    if player.halting {
        return Flow::Exit;
    }
    player.change_state(PlayerState::Finished);
    Flow::Continue
}

fn handle_owner_change(player: &mut Player, change: OwnerChange) {
    debug!(target: PLAYER_LOG_TARGET, "Owner change: {:?}", change);

    if change.is_acquired() {
        match player.state {
            PlayerState::Starting | PlayerState::Paused => player.change_state(PlayerState::Playing),
            PlayerState::Playing => trace!(target: PLAYER_LOG_TARGET, "Already playing."),
            PlayerState::Finishing | PlayerState::Finished => {
                debug!(target: PLAYER_LOG_TARGET, "Ignoring acquisition while {}", player.state);
            }
        }
    } else if change.is_released() {
        // The release can arrive before the process has actually exited.
        if player.state != PlayerState::Finished {
            player.change_state(PlayerState::Finishing);
        }
    }
}

async fn poll_position(player: &mut Player) {
    if player.state != PlayerState::Playing {
        return;
    }
    let Some(session) = player.session.as_mut() else {
        return;
    };

    match player.bus.position(&session.bus_name).await {
        Ok(micros) => {
            let position = from_micros(micros);
            session.clock.observe(position);
            player.emit_with_position(position);
        }
        Err(e) => {
            warn!(target: PLAYER_LOG_TARGET, bus_name = %session.bus_name, "Failed to get position: {}", e);
        }
    }
}
