use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, info, instrument};

use super::session::to_micros;
use super::{Flow, PendingPlay, Player, PlayerState, PLAYER_LOG_TARGET};
use crate::bus::BusMethod;

#[instrument(skip(player), fields(state = %player.state))]
pub async fn handle_play(player: &mut Player, file: String, position: Duration, passthrough: bool) {
    let same_file = player.session.as_ref().is_some_and(|s| s.file == file);

    match player.state {
        PlayerState::Playing | PlayerState::Paused if same_file => {
            let needs_seek = player.session.as_ref().is_some_and(|s| s.clock.position() != position);
            if needs_seek {
                info!(target: PLAYER_LOG_TARGET, "Setting position to {:?}", position);
                player.call_backend(BusMethod::SetPosition(to_micros(position))).await;
            }
            if let Some(session) = player.session.as_mut() {
                session.clock.observe(position);
            }

            if player.state == PlayerState::Paused {
                player.call_backend(BusMethod::Play).await;
                player.change_state(PlayerState::Playing);
            } else {
                player.emit_with_position(position);
            }
        }
        PlayerState::Starting if same_file => {
            debug!(target: PLAYER_LOG_TARGET, "Already starting {}", file);
        }
        PlayerState::Finished => {
            player.start_session(PendingPlay {
                file,
                position,
                passthrough,
            });
        }
        _ => {
            info!(target: PLAYER_LOG_TARGET, "Queuing file {}", file);
            player.pending = Some(PendingPlay {
                file,
                position,
                passthrough,
            });
            player.interrupt();
        }
    }
}

#[instrument(skip(player), fields(state = %player.state))]
pub async fn handle_pause(player: &mut Player) {
    match player.state {
        PlayerState::Starting | PlayerState::Playing | PlayerState::Paused => {
            player.call_backend(BusMethod::Pause).await;
            player.change_state(PlayerState::Paused);
        }
        PlayerState::Finishing | PlayerState::Finished => {
            debug!(target: PLAYER_LOG_TARGET, "Nothing to pause.");
        }
    }
}

#[instrument(skip(player, done), fields(state = %player.state))]
pub fn handle_stop(player: &mut Player, done: oneshot::Sender<()>) -> Flow {
    player.stop_waiters.push(done);
    halt(player)
}

/// Stops without further events: exits right away when idle, otherwise once
/// the backend is gone.
pub fn halt(player: &mut Player) -> Flow {
    if player.state == PlayerState::Finished {
        return Flow::Exit;
    }
    player.halting = true;
    player.interrupt();
    Flow::Continue
}
