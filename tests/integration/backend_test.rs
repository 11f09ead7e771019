//! Runs the player against a real child process standing in for the backend.

#[cfg(test)]
mod tests {
    use crate::test_utils::*;
    use r_jukybox::backend::{BackendProfile, CommandLauncher};
    use r_jukybox::player::{Player, PlayerState};
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    /// A backend that ignores its arguments and plays "forever".
    fn write_backend_script(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("fake-backend.sh");
        fs::write(&path, "#!/bin/sh\nexec sleep 30\n").expect("write script");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod script");
        path
    }

    #[tokio::test]
    async fn test_stop_interrupts_real_backend() {
        let dir = tempfile::tempdir().expect("tempdir");
        let launcher = Arc::new(CommandLauncher::new(BackendProfile {
            program: Some(write_backend_script(dir.path())),
            extra_args: Vec::new(),
            socket_dir: dir.path().to_path_buf(),
        }));
        let bus = FakeBus::new();
        let handle = Player::spawn(launcher, bus.clone(), quiet_options());
        let mut events = handle.subscribe();

        handle.play("track.flac", Duration::ZERO, false).await;
        assert_eq!(next_event(&mut events).await.state, PlayerState::Starting);
        bus.acquire(&bus.last_watched());
        assert_eq!(next_event(&mut events).await.state, PlayerState::Playing);

        tokio::time::timeout(Duration::from_secs(5), handle.stop())
            .await
            .expect("backend was not interrupted");
        assert_no_event(&mut events).await;
    }

    #[tokio::test]
    async fn test_switching_files_restarts_real_backend() {
        let dir = tempfile::tempdir().expect("tempdir");
        let launcher = Arc::new(CommandLauncher::new(BackendProfile {
            program: Some(write_backend_script(dir.path())),
            extra_args: Vec::new(),
            socket_dir: dir.path().to_path_buf(),
        }));
        let bus = FakeBus::new();
        let handle = Player::spawn(launcher, bus.clone(), quiet_options());
        let mut events = handle.subscribe();

        handle.play("one.flac", Duration::ZERO, false).await;
        assert_eq!(next_event(&mut events).await.state, PlayerState::Starting);
        bus.acquire(&bus.last_watched());
        assert_eq!(next_event(&mut events).await.state, PlayerState::Playing);

        handle.play("two.flac", Duration::from_secs(1), false).await;
        let seen = tokio::time::timeout(
            Duration::from_secs(5),
            collect_until(&mut events, |e| e.state == PlayerState::Starting),
        )
        .await
        .expect("second backend never started");
        assert_eq!(seen[0].state, PlayerState::Finishing);
        assert_eq!(seen[0].file, "one.flac");
        let starting = seen.last().expect("starting event");
        assert_eq!(starting.file, "two.flac");
        assert_eq!(starting.position, Duration::from_secs(1));
        assert_eq!(bus.watched().len(), 2);

        handle.stop().await;
    }
}
