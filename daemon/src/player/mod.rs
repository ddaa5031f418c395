//! Video playback for the portrait
//!
//! The controller only sees the [`PlaybackEngine`] trait. The production
//! backend, [`MpvEngine`], runs `mpv` as a child process and drives it over its
//! JSON IPC socket:
//!
//! - `mpv`: process lifecycle and the request/reply loop
//! - `protocol`: wire format of IPC requests, replies and events

mod mpv;
mod protocol;

pub use mpv::{MpvEngine, MpvOptions, remove_socket};

use common::PortraitError;
use std::path::Path;
use std::time::Duration;

/// A single active video session
pub trait PlaybackEngine {
    /// Resume playback from the current position
    async fn play(&mut self) -> Result<(), PortraitError>;

    async fn pause(&mut self) -> Result<(), PortraitError>;

    /// Replace the current video, optionally leaving it paused on its first frame
    async fn load(&mut self, path: &Path, paused: bool) -> Result<(), PortraitError>;

    /// Seek to a fraction of the clip, `0.0` being the first frame
    async fn set_position(&mut self, fraction: f64) -> Result<(), PortraitError>;

    /// Length of the current clip
    async fn duration(&mut self) -> Result<Duration, PortraitError>;

    /// Stop playback and release the player
    async fn quit(&mut self) -> Result<(), PortraitError>;
}
