mod app;
mod batch;
mod metadata;
mod player;
mod refresh;
mod render;
mod theme;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use gaga_proto::config::{ConfigResolver, LoadedConfig};
use gaga_proto::platform;
use gaga_proto::state::SharedState;

use crate::metadata::{http_client, ApiSource, IcySource};
use crate::player::{PlaybackController, PlayerHandle, PlayerSettings};
use crate::refresh::RefreshLoop;

const EXIT_FAILURE: u8 = 1;
const EXIT_CONFIG: u8 = 2;
const EXIT_NO_BACKEND: u8 = 3;

/// Terminal radio: plays one stream at a time and shows what is on air.
#[derive(Parser, Debug)]
#[command(name = "radio-gaga", version, about)]
struct Cli {
    /// Configuration file (TOML, or JSON by extension).  Must exist.
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Play the named stream without the dashboard.
    #[arg(short, long, value_name = "NAME", conflicts_with = "list")]
    play: Option<String>,

    /// Print the configured streams and exit.
    #[arg(short, long)]
    list: bool,

    /// Metadata refresh interval in seconds.
    #[arg(long, value_name = "SECS", env = "UPDATE_INTERVAL")]
    refresh_secs: Option<u64>,
}

/// `RUST_LOG`, then `LOG_LEVEL`, then `DEBUG=1`, else `info`.  HTTP client
/// internals are kept at warn unless `RUST_LOG` says otherwise.
fn log_filter() -> String {
    if let Ok(filter) = std::env::var("RUST_LOG") {
        return filter;
    }
    let level = std::env::var("LOG_LEVEL")
        .ok()
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty())
        .or_else(|| {
            std::env::var("DEBUG")
                .ok()
                .filter(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .map(|_| "debug".to_string())
        })
        .unwrap_or_else(|| "info".to_string());
    format!("{},hyper_util=warn,reqwest=warn,hyper=warn", level)
}

fn init_logging() -> anyhow::Result<PathBuf> {
    let data_dir = platform::data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating {}", data_dir.display()))?;
    let log_path = data_dir.join("radio-gaga.log");
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("opening {}", log_path.display()))?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter().as_str())
        .with_ansi(false)
        .init();
    Ok(log_path)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match init_logging() {
        Ok(path) => eprintln!("radio-gaga log: {}", path.display()),
        Err(e) => eprintln!("radio-gaga: logging disabled: {:#}", e),
    }
    tracing::info!("radio-gaga starting…");

    // ── Load config ──────────────────────────────────────────────────────────
    let loaded = match ConfigResolver::from_env(cli.config.clone()).resolve() {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("configuration error: {}", e);
            eprintln!("radio-gaga: {}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    tracing::info!("config: {}", loaded.source.describe());

    if cli.list {
        batch::list(&loaded);
        return ExitCode::SUCCESS;
    }

    match run(cli, loaded).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("fatal: {:#}", e);
            eprintln!("radio-gaga: {:#}", e);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

async fn run(cli: Cli, loaded: LoadedConfig) -> anyhow::Result<ExitCode> {
    let config = loaded.config;
    let streams = config.stream_list();

    // Resolve the batch target before touching the player.
    let batch_target = match &cli.play {
        Some(name) => match config.find_stream(name) {
            Some(stream) => Some(stream),
            None => {
                eprintln!("radio-gaga: no stream named '{}'. Available:", name);
                eprintln!("{}", batch::describe_streams(&streams));
                return Ok(ExitCode::from(EXIT_CONFIG));
            }
        },
        None => None,
    };

    // ── Player backend ───────────────────────────────────────────────────────
    let Some(binary) = platform::find_player_binary(config.player.binary.as_deref()) else {
        let wanted = config
            .player
            .binary
            .as_deref()
            .unwrap_or(platform::DEFAULT_PLAYER);
        tracing::error!("player binary '{}' not found", wanted);
        eprintln!(
            "radio-gaga: audio player '{}' not found. Install it or set [player] binary.",
            wanted
        );
        return Ok(ExitCode::from(EXIT_NO_BACKEND));
    };
    tracing::info!("player: {}", binary.display());

    let settings = PlayerSettings::from_config(binary, &config.player, config.defaults.volume);
    let (player, player_task) =
        PlayerHandle::spawn(PlaybackController::new(streams.clone(), settings));

    if let Some(stream) = batch_target {
        let result = batch::play(&player, &stream).await;
        let _ = player_task.await;
        result?;
        return Ok(ExitCode::SUCCESS);
    }

    // ── Dashboard ────────────────────────────────────────────────────────────
    let interval = cli
        .refresh_secs
        .map(|s| Duration::from_secs(s.max(1)))
        .unwrap_or_else(|| config.refresh.interval());
    let timeout = config.refresh.request_timeout();
    let client = http_client(timeout).context("building HTTP client")?;

    let state = SharedState::new();
    let refresh = RefreshLoop::new(
        streams.clone(),
        ApiSource::new(client.clone(), timeout),
        IcySource::new(client, timeout),
        player.clone(),
        state.clone(),
        interval,
        config.refresh.error_window(),
    );

    let app = app::App::new(
        streams,
        state,
        player,
        refresh,
        !config.defaults.start_paused,
    );
    let result = app.run().await;
    let _ = player_task.await;
    result?;

    tracing::info!("radio-gaga exiting");
    Ok(ExitCode::SUCCESS)
}
