/// Stable index of a configured stream (its position in the config list).
pub type StreamId = usize;

/// A configured audio source.  Built once at startup, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stream {
    pub id: StreamId,
    pub name: String,
    pub url: String,
    /// Per-stream now-playing JSON endpoint, if the station publishes one.
    pub metadata_url: Option<String>,
    /// Selector inside an NTS-style `results[]` payload (matched against
    /// `channel_name`, case-insensitively).
    pub metadata_channel: Option<String>,
}

/// Lifecycle of the single playback slot.
///
/// ```text
///   Idle ── play ──▶ Starting ── spawned ──▶ Playing
///    ▲                  │                       │
///    └──── failed ──────┘        stop ──▶ Stopping ──▶ Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Starting,
    Playing,
    Stopping,
}

impl PlaybackStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Playing => "playing",
            Self::Stopping => "stopping",
        }
    }
}

/// Observable copy of the controller's state, as published to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackSnapshot {
    pub is_playing: bool,
    pub active_stream_id: Option<StreamId>,
    pub process_alive: bool,
}

impl PlaybackSnapshot {
    pub fn idle() -> Self {
        Self::default()
    }

    /// True when `id` is the stream currently producing audio.
    pub fn is_playing_stream(&self, id: StreamId) -> bool {
        self.is_playing && self.active_stream_id == Some(id)
    }
}

/// Commands the input layer issues against the playback controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Play { stream_id: StreamId },
    Switch { stream_id: StreamId },
    Stop,
}

/// Decide what Enter/Space on `selected` means given the current playback.
pub fn toggle_command(selected: StreamId, playback: &PlaybackSnapshot) -> Command {
    match playback.active_stream_id {
        Some(active) if playback.is_playing && active == selected => Command::Stop,
        Some(_) if playback.is_playing => Command::Switch {
            stream_id: selected,
        },
        _ => Command::Play {
            stream_id: selected,
        },
    }
}
