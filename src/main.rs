use r_jukybox::backend::{BackendProfile, CommandLauncher};
use r_jukybox::bus::MpvBus;
use r_jukybox::config::Settings;
use r_jukybox::init_app_dirs;
use r_jukybox::player::{Player, PlayerEvent, PlayerOptions, PlayerState};
use r_jukybox::ui::{parse_interactive, Cli, Interactive};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "r_jukybox=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::new();
    let args = &cli.args;

    init_tracing(args.log_json);
    init_app_dirs()?;

    // Load configuration from file, then let command-line arguments win
    let config_path = match &args.config {
        Some(path) => Path::new(path).to_path_buf(),
        None => Settings::default_path(),
    };
    let mut settings = Settings::load(&config_path)?;

    if let Some(backend) = &args.backend {
        settings.backend_path = Some(backend.clone());
    }
    if let Some(socket_dir) = &args.socket_dir {
        settings.socket_dir = PathBuf::from(socket_dir);
    }
    if let Some(poll_interval_ms) = args.poll_interval_ms {
        settings.poll_interval_ms = poll_interval_ms;
    }
    settings.validate()?;
    info!("Using socket directory {:?}", settings.socket_dir);

    let bus = Arc::new(MpvBus::from_settings(&settings)?);
    let launcher = Arc::new(CommandLauncher::new(BackendProfile::from_settings(&settings)));
    let player = Player::spawn(launcher, bus, PlayerOptions::from_settings(&settings));

    let mut events = player.subscribe();
    let passthrough = args.passthrough;
    player.play(args.file.clone(), args.start_position(), passthrough).await;
    cli.display_controls();

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut last_event: Option<PlayerEvent> = None;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    cli.display_event(&event);
                    let finished = event.state == PlayerState::Finished;
                    last_event = Some(event);
                    if finished {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!("Display fell behind; {} events skipped.", skipped),
                Err(RecvError::Closed) => break,
            },
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match parse_interactive(&line) {
                    Ok(Interactive::Quit) => break,
                    Ok(Interactive::Pause) => player.pause().await,
                    Ok(Interactive::Resume) => match &last_event {
                        Some(event) => player.play(event.file.clone(), event.position, passthrough).await,
                        None => cli.display_message("Nothing to resume yet."),
                    },
                    Ok(Interactive::Seek(position)) => {
                        let file = last_event.as_ref().map(|e| e.file.clone()).unwrap_or_else(|| args.file.clone());
                        player.play(file, position, passthrough).await;
                    }
                    Ok(Interactive::Open(file)) => player.play(file, Duration::ZERO, passthrough).await,
                    Err(message) => cli.display_message(&message),
                },
                Ok(None) => stdin_open = false,
                Err(e) => {
                    cli.display_error(&e);
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted; stopping playback.");
                break;
            }
        }
    }

    player.stop().await;
    Ok(())
}
