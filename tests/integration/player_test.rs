//! End-to-end behaviour of the player state machine against fake backends.

#[cfg(test)]
mod tests {
    use crate::test_utils::*;
    use r_jukybox::backend::{BackendProfile, CommandLauncher};
    use r_jukybox::bus::{BusMethod, BusSignal};
    use r_jukybox::player::{Player, PlayerEvent, PlayerHandle, PlayerOptions, PlayerState};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::broadcast;

    fn event(state: PlayerState, file: &str, secs: u64) -> PlayerEvent {
        PlayerEvent {
            state,
            file: file.to_string(),
            position: Duration::from_secs(secs),
        }
    }

    /// Plays `file` from `secs` and brings the session up to Playing.
    async fn start_playing(
        handle: &PlayerHandle,
        events: &mut broadcast::Receiver<PlayerEvent>,
        bus: &FakeBus,
        file: &str,
        secs: u64,
    ) -> String {
        handle.play(file, Duration::from_secs(secs), false).await;
        assert_eq!(next_event(events).await, event(PlayerState::Starting, file, secs));
        let name = bus.last_watched();
        bus.acquire(&name);
        let playing = next_event(events).await;
        assert_eq!(playing.state, PlayerState::Playing);
        assert_eq!(playing.file, file);
        name
    }

    #[tokio::test]
    async fn test_play_from_finished_starts_session() {
        let launcher = FakeLauncher::new(true);
        let bus = FakeBus::new();
        let (handle, mut events) = start_player(launcher.clone(), bus.clone(), quiet_options());

        handle.play("a.mka", Duration::ZERO, true).await;
        assert_eq!(next_event(&mut events).await, event(PlayerState::Starting, "a.mka", 0));

        let launches = launcher.launches();
        assert_eq!(launches.len(), 1);
        assert_eq!(launches[0].file, "a.mka");
        assert_eq!(launches[0].position, Duration::ZERO);
        assert!(launches[0].passthrough);
        assert_eq!(bus.watched(), vec![launches[0].bus_name.clone()]);

        bus.acquire(&launches[0].bus_name);
        assert_eq!(next_event(&mut events).await, event(PlayerState::Playing, "a.mka", 0));

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_sessions_get_distinct_bus_names() {
        let launcher = FakeLauncher::new(true);
        let bus = FakeBus::new();
        let (handle, mut events) = start_player(launcher.clone(), bus.clone(), quiet_options());

        start_playing(&handle, &mut events, &bus, "a.mka", 0).await;
        handle.play("b.mka", Duration::ZERO, false).await;
        collect_until(&mut events, |e| e.state == PlayerState::Starting).await;

        let watched = bus.watched();
        assert_eq!(watched.len(), 2);
        assert_ne!(watched[0], watched[1]);
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_same_file_play_seeks_without_respawn() {
        let launcher = FakeLauncher::new(true);
        let bus = FakeBus::new();
        let (handle, mut events) = start_player(launcher.clone(), bus.clone(), quiet_options());
        let name = start_playing(&handle, &mut events, &bus, "f.flac", 5).await;

        // Same position: no seek is sent.
        handle.play("f.flac", Duration::from_secs(5), false).await;
        assert_eq!(next_event(&mut events).await, event(PlayerState::Playing, "f.flac", 5));
        assert!(bus.methods().is_empty());

        handle.play("f.flac", Duration::from_secs(20), false).await;
        assert_eq!(next_event(&mut events).await, event(PlayerState::Playing, "f.flac", 20));

        assert_eq!(bus.calls(), vec![(name, BusMethod::SetPosition(20_000_000))]);
        assert_eq!(launcher.launches().len(), 1);
        assert_eq!(launcher.interrupts(), 0);
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_same_file_play_resumes_when_paused() {
        let launcher = FakeLauncher::new(true);
        let bus = FakeBus::new();
        let (handle, mut events) = start_player(launcher.clone(), bus.clone(), quiet_options());
        start_playing(&handle, &mut events, &bus, "f.flac", 0).await;

        handle.pause().await;
        assert_eq!(next_event(&mut events).await.state, PlayerState::Paused);

        handle.play("f.flac", Duration::from_secs(60), false).await;
        assert_eq!(next_event(&mut events).await, event(PlayerState::Playing, "f.flac", 60));
        assert_eq!(
            bus.methods(),
            vec![BusMethod::Pause, BusMethod::SetPosition(60_000_000), BusMethod::Play]
        );
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_same_file_play_while_starting_is_ignored() {
        let launcher = FakeLauncher::new(true);
        let bus = FakeBus::new();
        let (handle, mut events) = start_player(launcher.clone(), bus.clone(), quiet_options());

        handle.play("f.flac", Duration::ZERO, false).await;
        assert_eq!(next_event(&mut events).await.state, PlayerState::Starting);
        handle.play("f.flac", Duration::from_secs(30), false).await;

        assert_no_event(&mut events).await;
        assert_eq!(launcher.launches().len(), 1);
        assert!(bus.methods().is_empty());
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_different_file_waits_for_exit() {
        let launcher = FakeLauncher::new(false);
        let bus = FakeBus::new();
        let (handle, mut events) = start_player(launcher.clone(), bus.clone(), quiet_options());
        start_playing(&handle, &mut events, &bus, "f.flac", 0).await;

        handle.play("g.flac", Duration::from_secs(7), false).await;
        let finishing = next_event(&mut events).await;
        assert_eq!(finishing.state, PlayerState::Finishing);
        assert_eq!(finishing.file, "f.flac");
        assert_eq!(launcher.interrupts(), 1);
        assert_eq!(launcher.launches().len(), 1);

        let first_name = bus.last_watched();
        assert!(bus.unwatched().is_empty());
        launcher.finish(0);
        assert_eq!(next_event(&mut events).await, event(PlayerState::Starting, "g.flac", 7));
        assert_eq!(bus.unwatched(), vec![first_name]);

        let launches = launcher.launches();
        assert_eq!(launches.len(), 2);
        assert_eq!(launches[1].file, "g.flac");
        assert_eq!(launches[1].position, Duration::from_secs(7));
        stop_and_finish(&handle, &launcher, 1).await;
    }

    #[tokio::test]
    async fn test_latest_pending_request_wins() {
        let launcher = FakeLauncher::new(false);
        let bus = FakeBus::new();
        let (handle, mut events) = start_player(launcher.clone(), bus.clone(), quiet_options());
        start_playing(&handle, &mut events, &bus, "f.flac", 0).await;

        handle.play("g.flac", Duration::ZERO, false).await;
        assert_eq!(next_event(&mut events).await.state, PlayerState::Finishing);
        handle.play("h.flac", Duration::from_secs(3), false).await;
        handle.play("h.flac", Duration::from_secs(3), false).await;

        // The replacement requests produce no events; give them time to land.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(launcher.interrupts(), 1);
        launcher.finish(0);

        let seen = collect_until(&mut events, |e| e.state == PlayerState::Starting).await;
        assert!(seen.iter().all(|e| e.file != "g.flac"), "g.flac leaked: {:?}", seen);
        assert_eq!(seen.last(), Some(&event(PlayerState::Starting, "h.flac", 3)));

        let launches = launcher.launches();
        assert_eq!(launches.len(), 2);
        assert_eq!(launches[1].file, "h.flac");
        stop_and_finish(&handle, &launcher, 1).await;
    }

    #[tokio::test]
    async fn test_play_from_starting_replaces_session() {
        let launcher = FakeLauncher::new(true);
        let bus = FakeBus::new();
        let (handle, mut events) = start_player(launcher.clone(), bus.clone(), quiet_options());

        handle.play("a.mka", Duration::ZERO, false).await;
        assert_eq!(next_event(&mut events).await.state, PlayerState::Starting);
        handle.play("b.mka", Duration::ZERO, false).await;

        let seen = collect_until(&mut events, |e| e.file == "b.mka").await;
        assert_eq!(seen[0].state, PlayerState::Finishing);
        assert_eq!(seen[0].file, "a.mka");
        assert_eq!(seen.last(), Some(&event(PlayerState::Starting, "b.mka", 0)));
        assert_eq!(launcher.interrupts(), 1);
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_pause_stops_polling() {
        let launcher = FakeLauncher::new(true);
        let bus = FakeBus::new();
        bus.set_position(Duration::from_secs(42));
        let options = PlayerOptions {
            poll_interval: Duration::from_millis(30),
            ..PlayerOptions::default()
        };
        let (handle, mut events) = start_player(launcher.clone(), bus.clone(), options);
        start_playing(&handle, &mut events, &bus, "a.mka", 10).await;

        // The poller reports the backend's position.
        assert_eq!(next_event(&mut events).await, event(PlayerState::Playing, "a.mka", 42));

        handle.pause().await;
        let paused = collect_until(&mut events, |e| e.state == PlayerState::Paused).await;
        let paused = paused.last().cloned().expect("paused event");
        assert_eq!(paused.file, "a.mka");
        assert!(paused.position >= Duration::from_secs(42));
        assert!(paused.position < Duration::from_secs(43));
        assert!(bus.methods().contains(&BusMethod::Pause));

        let queries = bus.position_queries();
        assert_no_event(&mut events).await;
        assert_eq!(bus.position_queries(), queries);
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_redundant_pause_is_tolerated() {
        let launcher = FakeLauncher::new(true);
        let bus = FakeBus::new();
        let (handle, mut events) = start_player(launcher.clone(), bus.clone(), quiet_options());
        start_playing(&handle, &mut events, &bus, "a.mka", 0).await;

        handle.pause().await;
        assert_eq!(next_event(&mut events).await.state, PlayerState::Paused);
        handle.pause().await;
        assert_no_event(&mut events).await;
        assert_eq!(bus.methods(), vec![BusMethod::Pause, BusMethod::Pause]);
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_acquisition_while_paused_starts_playing() {
        let launcher = FakeLauncher::new(true);
        let bus = FakeBus::new();
        bus.set_position(Duration::from_secs(3));
        let options = PlayerOptions {
            poll_interval: Duration::from_millis(30),
            ..PlayerOptions::default()
        };
        let (handle, mut events) = start_player(launcher.clone(), bus.clone(), options);

        handle.play("a.mka", Duration::ZERO, false).await;
        assert_eq!(next_event(&mut events).await.state, PlayerState::Starting);
        handle.pause().await;
        assert_eq!(next_event(&mut events).await, event(PlayerState::Paused, "a.mka", 0));

        bus.acquire(&bus.last_watched());
        assert_eq!(next_event(&mut events).await, event(PlayerState::Playing, "a.mka", 0));
        // Playing again means the poller is running.
        assert_eq!(next_event(&mut events).await, event(PlayerState::Playing, "a.mka", 3));
        assert_eq!(bus.methods(), vec![BusMethod::Pause]);
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_session_tracks_state_through_transitions() {
        let launcher = FakeLauncher::new(true);
        let bus = FakeBus::new();
        let (player, handle) = Player::new(launcher.clone(), bus.clone(), quiet_options());
        let mut events = handle.subscribe();
        let task = tokio::spawn(player.run());

        let name = start_playing(&handle, &mut events, &bus, "a.mka", 0).await;
        handle.pause().await;
        handle.play("a.mka", Duration::from_secs(5), false).await;
        handle.play("b.mka", Duration::ZERO, false).await;
        collect_until(&mut events, |e| e.file == "b.mka").await;
        bus.release(&name);
        bus.acquire(&bus.last_watched());
        assert_eq!(next_event(&mut events).await.state, PlayerState::Playing);

        launcher.finish(1);
        assert_eq!(next_event(&mut events).await.state, PlayerState::Finished);
        handle.pause().await;
        handle.play("c.mka", Duration::ZERO, false).await;
        assert_eq!(next_event(&mut events).await.state, PlayerState::Starting);
        bus.release(&bus.last_watched());
        assert_eq!(next_event(&mut events).await.state, PlayerState::Finishing);
        launcher.finish(2);
        assert_eq!(next_event(&mut events).await.state, PlayerState::Finished);

        // A broken session/state pairing panics the actor in debug builds.
        drop(handle);
        tokio::time::timeout(EVENT_TIMEOUT, task)
            .await
            .expect("player did not shut down")
            .expect("player task panicked");
    }

    #[tokio::test]
    async fn test_pause_while_finishing_is_ignored() {
        let launcher = FakeLauncher::new(false);
        let bus = FakeBus::new();
        let (handle, mut events) = start_player(launcher.clone(), bus.clone(), quiet_options());
        start_playing(&handle, &mut events, &bus, "a.mka", 0).await;

        handle.play("b.mka", Duration::ZERO, false).await;
        assert_eq!(next_event(&mut events).await.state, PlayerState::Finishing);
        handle.pause().await;
        assert_no_event(&mut events).await;
        assert!(bus.methods().is_empty());

        launcher.finish(0);
        assert_eq!(next_event(&mut events).await, event(PlayerState::Starting, "b.mka", 0));
        stop_and_finish(&handle, &launcher, 1).await;
    }

    #[tokio::test]
    async fn test_crash_reports_finished_without_respawn() {
        let launcher = FakeLauncher::new(true);
        let bus = FakeBus::new();
        let (handle, mut events) = start_player(launcher.clone(), bus.clone(), quiet_options());
        start_playing(&handle, &mut events, &bus, "a.mka", 4).await;

        launcher.finish(0);
        let finished = next_event(&mut events).await;
        assert_eq!(finished.state, PlayerState::Finished);
        assert_eq!(finished.file, "a.mka");
        assert!(finished.position >= Duration::from_secs(4));

        assert_no_event(&mut events).await;
        assert_eq!(launcher.launches().len(), 1);
        assert_eq!(bus.unwatched(), bus.watched());
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_name_release_then_exit() {
        let launcher = FakeLauncher::new(true);
        let bus = FakeBus::new();
        let (handle, mut events) = start_player(launcher.clone(), bus.clone(), quiet_options());
        let name = start_playing(&handle, &mut events, &bus, "a.mka", 0).await;

        bus.release(&name);
        assert_eq!(next_event(&mut events).await.state, PlayerState::Finishing);
        launcher.finish(0);
        assert_eq!(next_event(&mut events).await.state, PlayerState::Finished);
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_unrelated_and_malformed_signals_ignored() {
        let launcher = FakeLauncher::new(true);
        let bus = FakeBus::new();
        let (handle, mut events) = start_player(launcher.clone(), bus.clone(), quiet_options());

        handle.play("a.mka", Duration::ZERO, false).await;
        assert_eq!(next_event(&mut events).await.state, PlayerState::Starting);

        bus.acquire("org.example.other");
        bus.send(BusSignal {
            member: "NameOwnerChanged".to_string(),
            args: vec![serde_json::json!(17)],
        });
        bus.send(BusSignal {
            member: "PropertiesChanged".to_string(),
            args: Vec::new(),
        });
        assert_no_event(&mut events).await;

        bus.acquire(&bus.last_watched());
        assert_eq!(next_event(&mut events).await.state, PlayerState::Playing);
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_bus_failures_are_not_fatal() {
        let launcher = FakeLauncher::new(true);
        let bus = FakeBus::new();
        let (handle, mut events) = start_player(launcher.clone(), bus.clone(), quiet_options());
        start_playing(&handle, &mut events, &bus, "a.mka", 0).await;

        bus.fail_calls(true);
        handle.pause().await;
        assert_eq!(next_event(&mut events).await.state, PlayerState::Paused);
        handle.play("a.mka", Duration::from_secs(9), false).await;
        assert_eq!(next_event(&mut events).await, event(PlayerState::Playing, "a.mka", 9));

        assert_eq!(bus.methods().len(), 3);
        assert!(handle.is_running());
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_stop_waits_for_exit_and_silences_events() {
        let launcher = FakeLauncher::new(true);
        let bus = FakeBus::new();
        let (handle, mut events) = start_player(launcher.clone(), bus.clone(), quiet_options());
        let name = start_playing(&handle, &mut events, &bus, "a.mka", 0).await;

        tokio::time::timeout(EVENT_TIMEOUT, handle.stop())
            .await
            .expect("stop did not return");
        assert_eq!(launcher.interrupts(), 1);

        bus.release(&name);
        assert_no_event(&mut events).await;

        tokio::time::timeout(EVENT_TIMEOUT, handle.stop())
            .await
            .expect("second stop did not return");
    }

    #[tokio::test]
    async fn test_stop_while_starting() {
        let launcher = FakeLauncher::new(true);
        let bus = FakeBus::new();
        let (handle, mut events) = start_player(launcher.clone(), bus.clone(), quiet_options());

        handle.play("a.mka", Duration::ZERO, false).await;
        assert_eq!(next_event(&mut events).await.state, PlayerState::Starting);

        tokio::time::timeout(EVENT_TIMEOUT, handle.stop())
            .await
            .expect("stop did not return");
        assert_eq!(launcher.interrupts(), 1);
        assert_no_event(&mut events).await;
    }

    #[tokio::test]
    async fn test_stop_when_finished_returns_immediately() {
        let launcher = FakeLauncher::new(true);
        let bus = FakeBus::new();
        let (handle, mut events) = start_player(launcher.clone(), bus.clone(), quiet_options());

        tokio::time::timeout(EVENT_TIMEOUT, handle.stop())
            .await
            .expect("stop did not return");
        assert_eq!(launcher.launches().len(), 0);
        assert_no_event(&mut events).await;
    }

    #[tokio::test]
    async fn test_commands_after_stop_are_ignored() {
        let launcher = FakeLauncher::new(true);
        let bus = FakeBus::new();
        let (handle, mut events) = start_player(launcher.clone(), bus.clone(), quiet_options());

        handle.stop().await;
        handle.play("a.mka", Duration::ZERO, false).await;
        handle.pause().await;
        assert_no_event(&mut events).await;
        assert!(launcher.launches().is_empty());
    }

    #[tokio::test]
    async fn test_dropping_handles_stops_player() {
        let launcher = FakeLauncher::new(true);
        let bus = FakeBus::new();
        let (player, handle) = Player::new(launcher.clone(), bus.clone(), quiet_options());
        let mut events = handle.subscribe();
        let task = tokio::spawn(player.run());

        start_playing(&handle, &mut events, &bus, "a.mka", 0).await;
        drop(handle);

        tokio::time::timeout(EVENT_TIMEOUT, task)
            .await
            .expect("player did not shut down")
            .expect("player task panicked");
        assert_eq!(launcher.interrupts(), 1);
    }

    #[tokio::test]
    async fn test_spawn_failure_converges_to_finished() {
        let socket_dir = tempfile::tempdir().expect("tempdir");
        let launcher = Arc::new(CommandLauncher::new(BackendProfile {
            program: Some("/nonexistent/jukybox-backend".into()),
            extra_args: Vec::new(),
            socket_dir: socket_dir.path().to_path_buf(),
        }));
        let bus = FakeBus::new();
        let handle = Player::spawn(launcher, bus.clone(), quiet_options());
        let mut events = handle.subscribe();

        handle.play("a.mka", Duration::from_secs(2), false).await;
        assert_eq!(next_event(&mut events).await, event(PlayerState::Starting, "a.mka", 2));
        assert_eq!(next_event(&mut events).await, event(PlayerState::Finished, "a.mka", 2));
        // The failed session's name is no longer watched.
        assert_eq!(bus.unwatched(), bus.watched());

        // The player stays usable.
        handle.play("b.mka", Duration::ZERO, false).await;
        assert_eq!(next_event(&mut events).await.state, PlayerState::Starting);
        handle.stop().await;
    }
}
