//! The one cross-task boundary between the refresh loop, command handlers and
//! the renderer.  Every write goes through a single `Mutex` section.

use crate::nowplaying::DisplayLine;
use crate::protocol::{PlaybackSnapshot, StreamId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify};

/// Fixed on-screen lifetime of a toast.
pub const TOAST_LIFETIME: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastSeverity {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub message: String,
    pub severity: ToastSeverity,
    pub expires_at: Instant,
}

impl Toast {
    pub fn new(message: impl Into<String>, severity: ToastSeverity, now: Instant) -> Self {
        Self {
            message: message.into(),
            severity,
            expires_at: now + TOAST_LIFETIME,
        }
    }

    pub fn is_visible(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Clone, Default)]
pub struct UiState {
    pub display_lines: HashMap<StreamId, DisplayLine>,
    pub playback: PlaybackSnapshot,
    pub toast: Option<Toast>,
    /// Completed refresh ticks.  Lets readers tell two snapshots apart.
    pub tick: u64,
}

impl UiState {
    pub fn display_line(&self, id: StreamId) -> Option<&DisplayLine> {
        self.display_lines.get(&id)
    }
}

/// Handle to the shared UI state.  Cheap to clone.
#[derive(Clone, Default)]
pub struct SharedState {
    inner: Arc<Mutex<UiState>>,
    /// Wakes the renderer on writes it should not wait a cadence tick for.
    changed: Arc<Notify>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the whole state, taken in one lock section.
    pub async fn snapshot(&self) -> UiState {
        self.inner.lock().await.clone()
    }

    /// Publish the result of one refresh tick.  Lines, playback and any
    /// toast land together so a reader never observes half a tick.
    pub async fn apply_tick(
        &self,
        lines: HashMap<StreamId, DisplayLine>,
        playback: PlaybackSnapshot,
        toast: Option<Toast>,
    ) {
        let toasted = toast.is_some();
        {
            let mut state = self.inner.lock().await;
            state.display_lines.extend(lines);
            state.playback = playback;
            if toast.is_some() {
                state.toast = toast;
            }
            state.tick += 1;
        }
        if toasted {
            self.changed.notify_one();
        }
    }

    /// Publish a command result.  Wakes the renderer so the next frame, and
    /// the next key press, see it.
    pub async fn set_playback(&self, playback: PlaybackSnapshot) {
        self.inner.lock().await.playback = playback;
        self.changed.notify_one();
    }

    pub async fn push_toast(&self, message: impl Into<String>, severity: ToastSeverity) {
        let toast = Toast::new(message, severity, Instant::now());
        self.inner.lock().await.toast = Some(toast);
        self.changed.notify_one();
    }

    /// Resolves when a toast or a playback change has landed since the last
    /// call.
    pub async fn changed(&self) {
        self.changed.notified().await;
    }
}
