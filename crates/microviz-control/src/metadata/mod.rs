//! Now-playing metadata
//!
//! Title and artist are cosmetic. [`MetadataProvider::current_track`] never
//! fails: any error from the underlying [`TrackSource`] is logged at debug
//! level and replaced by `"Unknown"` values.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::Result;

pub mod mpris;

pub use mpris::MprisSource;

/// Placeholder for missing title or artist
pub const UNKNOWN: &str = "Unknown";

/// Title/artist of the active media session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NowPlaying {
    pub title: String,
    pub artist: String,
}

impl NowPlaying {
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
        }
    }

    /// Both fields set to [`UNKNOWN`]
    pub fn unknown() -> Self {
        Self::new(UNKNOWN, UNKNOWN)
    }
}

impl Default for NowPlaying {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Something that can look up the current track
#[async_trait]
pub trait TrackSource: Send + Sync {
    async fn now_playing(&self) -> Result<NowPlaying>;
}

/// Source that never queries anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMetadata;

#[async_trait]
impl TrackSource for NoMetadata {
    async fn now_playing(&self) -> Result<NowPlaying> {
        Ok(NowPlaying::unknown())
    }
}

/// Infallible front for a [`TrackSource`]
#[derive(Clone)]
pub struct MetadataProvider {
    source: Arc<dyn TrackSource>,
}

impl MetadataProvider {
    pub fn new(source: impl TrackSource + 'static) -> Self {
        Self {
            source: Arc::new(source),
        }
    }

    /// Query MPRIS players on the session bus
    pub fn mpris() -> Self {
        Self::new(MprisSource::default())
    }

    /// Always report unknown
    pub fn disabled() -> Self {
        Self::new(NoMetadata)
    }

    /// Current title and artist, `"Unknown"` on any failure
    pub async fn current_track(&self) -> NowPlaying {
        match self.source.now_playing().await {
            Ok(track) => track,
            Err(e) => {
                debug!("Now-playing lookup failed: {}", e);
                NowPlaying::unknown()
            }
        }
    }
}

impl Default for MetadataProvider {
    fn default() -> Self {
        Self::mpris()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ControlError;

    struct Failing;

    #[async_trait]
    impl TrackSource for Failing {
        async fn now_playing(&self) -> Result<NowPlaying> {
            Err(ControlError::Metadata("service unavailable".to_string()))
        }
    }

    struct Fixed;

    #[async_trait]
    impl TrackSource for Fixed {
        async fn now_playing(&self) -> Result<NowPlaying> {
            Ok(NowPlaying::new("Song", "Band"))
        }
    }

    #[tokio::test]
    async fn test_failing_source_degrades_to_unknown() {
        let provider = MetadataProvider::new(Failing);
        for _ in 0..3 {
            assert_eq!(provider.current_track().await, NowPlaying::unknown());
        }
    }

    #[tokio::test]
    async fn test_successful_source_passes_through() {
        let provider = MetadataProvider::new(Fixed);
        let track = provider.current_track().await;
        assert_eq!(track.title, "Song");
        assert_eq!(track.artist, "Band");
    }

    #[tokio::test]
    async fn test_disabled_provider() {
        let provider = MetadataProvider::disabled();
        assert_eq!(provider.current_track().await, NowPlaying::unknown());
    }
}
