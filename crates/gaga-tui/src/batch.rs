//! Non-interactive modes: play one stream until interrupted, or list streams.

use std::time::Duration;

use gaga_proto::config::LoadedConfig;
use gaga_proto::protocol::{Command, Stream};
use tracing::info;

use crate::app::shutdown_signal;
use crate::player::PlayerHandle;

const LIVENESS_POLL: Duration = Duration::from_millis(500);

/// Play `stream` until a shutdown signal arrives or the player exits, then
/// run the graceful-then-forced stop.  Signal listeners go in before the
/// player starts.
pub async fn play(player: &PlayerHandle, stream: &Stream) -> anyhow::Result<()> {
    let signal = shutdown_signal();
    tokio::pin!(signal);

    let command = Command::Play {
        stream_id: stream.id,
    };
    if let Err(e) = player.execute(command).await {
        player.shutdown().await;
        return Err(e.into());
    }
    eprintln!("Playing {} (Ctrl-C to stop)", stream.name);
    info!("batch: playing {}", stream.name);

    let mut poll = tokio::time::interval(LIVENESS_POLL);
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = &mut signal => {
                info!("batch: interrupted");
                break;
            }
            _ = poll.tick() => {
                if !player.status().await.process_alive {
                    info!("batch: player exited");
                    eprintln!("Player exited");
                    break;
                }
            }
        }
    }

    let outcome = player.shutdown().await;
    info!("batch: stop outcome {:?}", outcome);
    Ok(())
}

/// Human-readable stream list, as printed by `--list` and on a bad `--play`.
pub fn describe_streams(streams: &[Stream]) -> String {
    let width = streams.iter().map(|s| s.name.len()).max().unwrap_or(0);
    streams
        .iter()
        .map(|s| format!("  {:>2}. {:<width$}  {}", s.id + 1, s.name, s.url, width = width))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn list(loaded: &LoadedConfig) {
    let config = &loaded.config;
    println!("Config: {}", loaded.source.describe());
    println!("Streams:");
    println!("{}", describe_streams(&config.stream_list()));
    println!(
        "Defaults: volume {:.2}, start paused {}",
        config.defaults.volume, config.defaults.start_paused
    );
    println!("Refresh: every {}s", config.refresh.interval_secs);
}
