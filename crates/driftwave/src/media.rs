//! Platform media session
//!
//! Lock-screen metadata goes out through `MediaSession`. Hardware media
//! keys come back in as `MediaAction`s on the controller's event stream.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::mode::SessionMode;

pub const ARTIST: &str = "Driftwave";

/// What the platform shows for the playing session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub title: String,
    pub artist: String,
    /// Encodes the mode and its band or variant
    pub album: String,
}

impl MediaMetadata {
    pub fn for_mode(mode: &SessionMode) -> Self {
        Self {
            title: mode.title(),
            artist: ARTIST.to_string(),
            album: mode.category(),
        }
    }
}

/// External play/pause/stop intents (hardware keys, lock screen)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaAction {
    Play,
    Pause,
    Stop,
}

/// Outward notification sink. Nothing reads state back from it.
pub trait MediaSession: Send + Sync {
    fn publish(&self, metadata: &MediaMetadata);

    fn clear(&self) {}
}

/// Discards everything
#[derive(Debug, Default)]
pub struct NullMediaSession;

impl MediaSession for NullMediaSession {
    fn publish(&self, _metadata: &MediaMetadata) {}
}

/// Logs metadata through tracing
#[derive(Debug, Default)]
pub struct LoggingMediaSession;

impl MediaSession for LoggingMediaSession {
    fn publish(&self, metadata: &MediaMetadata) {
        info!(title = %metadata.title, album = %metadata.album, "now playing");
    }

    fn clear(&self) {
        info!("now playing cleared");
    }
}

/// Keeps every publish for inspection
#[derive(Debug, Default)]
pub struct MemoryMediaSession {
    published: Mutex<Vec<MediaMetadata>>,
    current: Mutex<Option<MediaMetadata>>,
}

impl MemoryMediaSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<MediaMetadata> {
        self.published.lock().expect("media history mutex poisoned").clone()
    }

    pub fn current(&self) -> Option<MediaMetadata> {
        self.current.lock().expect("media current mutex poisoned").clone()
    }
}

impl MediaSession for MemoryMediaSession {
    fn publish(&self, metadata: &MediaMetadata) {
        self.published
            .lock()
            .expect("media history mutex poisoned")
            .push(metadata.clone());
        *self.current.lock().expect("media current mutex poisoned") = Some(metadata.clone());
    }

    fn clear(&self) {
        *self.current.lock().expect("media current mutex poisoned") = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::NoiseVariant;

    #[test]
    fn test_metadata_for_tone_pair() {
        let metadata = MediaMetadata::for_mode(&SessionMode::tone_pair(6.0));
        assert_eq!(metadata.title, "Theta Binaural Beats - 6 Hz");
        assert_eq!(metadata.artist, "Driftwave");
        assert_eq!(metadata.album, "Binaural Beats (Theta)");
    }

    #[test]
    fn test_memory_session_tracks_current() {
        let session = MemoryMediaSession::new();
        session.publish(&MediaMetadata::for_mode(&SessionMode::noise(NoiseVariant::Pink)));
        assert_eq!(session.current().unwrap().title, "Pink Noise");

        session.clear();
        assert!(session.current().is_none());
        assert_eq!(session.history().len(), 1);
    }
}
