//! Shared data model for radio-gaga: configuration, stream/playback types,
//! now-playing resolution and the UI state that crosses thread boundaries.

pub mod config;
pub mod nowplaying;
pub mod platform;
pub mod protocol;
pub mod state;
