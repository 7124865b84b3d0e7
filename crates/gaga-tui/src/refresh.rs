//! Background refresh loop.
//!
//! Every tick polls both providers for every stream concurrently, resolves
//! each stream's display line, asks the player for a liveness-checked status
//! and publishes all of it to [`SharedState`] in a single lock section.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use gaga_proto::nowplaying::{merge, resolve, DisplayLine, TrackInfo};
use gaga_proto::protocol::{Stream, StreamId};
use gaga_proto::state::{SharedState, Toast, ToastSeverity};
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metadata::{ErrorThrottle, MetadataError, TrackSource};
use crate::player::PlayerHandle;

pub const API_ERROR_TOAST: &str = "API error - continuing";

type Fetched = Result<Option<TrackInfo>, MetadataError>;

pub struct RefreshLoop<A, T> {
    streams: Vec<Stream>,
    api: A,
    tags: T,
    player: PlayerHandle,
    state: SharedState,
    interval: Duration,
    throttle: ErrorThrottle,
}

impl<A: TrackSource, T: TrackSource> RefreshLoop<A, T> {
    pub fn new(
        streams: Vec<Stream>,
        api: A,
        tags: T,
        player: PlayerHandle,
        state: SharedState,
        interval: Duration,
        error_window: Duration,
    ) -> Self {
        Self {
            streams,
            api,
            tags,
            player,
            state,
            interval,
            throttle: ErrorThrottle::new(error_window),
        }
    }

    /// Run one tick and publish it.
    pub async fn tick(&mut self) {
        let started = Instant::now();
        let api = &self.api;
        let tags = &self.tags;
        let results = join_all(self.streams.iter().map(|stream| async move {
            let (from_api, from_tags) = tokio::join!(api.fetch(stream), tags.fetch(stream));
            (stream, from_api, from_tags)
        }))
        .await;

        let mut lines: HashMap<StreamId, DisplayLine> = HashMap::new();
        let mut api_failed = false;
        for (stream, from_api, from_tags) in results {
            api_failed |= from_api.is_err();
            if let Some(line) = self.line_for(stream, from_api, from_tags) {
                lines.insert(stream.id, line);
            }
        }

        let toast = if api_failed && self.throttle.should_notify(Instant::now()) {
            Some(Toast::new(API_ERROR_TOAST, ToastSeverity::Error, Instant::now()))
        } else {
            None
        };

        let playback = self.player.status().await;
        self.state.apply_tick(lines, playback, toast).await;
        debug!(
            "refresh: tick done in {:?} ({} streams)",
            started.elapsed(),
            self.streams.len()
        );
    }

    /// New display line for one stream, or `None` to keep the previous one
    /// (a provider failed and nothing usable came back).
    fn line_for(&self, stream: &Stream, from_api: Fetched, from_tags: Fetched) -> Option<DisplayLine> {
        let mut failed = false;
        let api = from_api.unwrap_or_else(|e| {
            warn!("refresh: {} {} failed: {}", stream.name, self.api.name(), e);
            failed = true;
            None
        });
        let tags = from_tags.unwrap_or_else(|e| {
            warn!("refresh: {} {} failed: {}", stream.name, self.tags.name(), e);
            failed = true;
            None
        });

        let merged = merge(api, tags);
        if failed && !merged.as_ref().is_some_and(TrackInfo::has_anything) {
            return None;
        }
        Some(resolve(merged.as_ref()))
    }

    /// Tick immediately, then every `interval` until cancelled.  `force`
    /// triggers an extra tick and restarts the period.
    pub async fn run(mut self, cancel: CancellationToken, force: Arc<Notify>) {
        info!("refresh: loop started, interval {:?}", self.interval);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                _ = force.notified() => {
                    debug!("refresh: forced tick");
                    ticker.reset();
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("refresh: abandoning in-flight tick");
                    break;
                }
                _ = self.tick() => {}
            }
        }
        info!("refresh: loop stopped");
    }
}
