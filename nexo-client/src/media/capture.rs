use crate::error::DeviceError;
use crate::media::{MIME_TYPE_OPUS, MIME_TYPE_VP8, MediaTrack, TrackKind, TrackSource};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Capture device acquisition.
#[async_trait]
pub trait CaptureDevices: Send + Sync {
    /// Camera for `Video`, microphone for `Audio`.
    async fn acquire(&self, kind: TrackKind) -> Result<MediaTrack, DeviceError>;

    async fn acquire_display(&self) -> Result<MediaTrack, DeviceError>;
}

/// Hands out track handles without touching hardware.
///
/// Used by the CLI and by tests; individual kinds can be denied to exercise
/// the device error path.
pub struct SyntheticCapture {
    video_codec: String,
    audio_codec: String,
    screen_codec: String,
    denied: Mutex<HashSet<TrackKind>>,
    display_denied: Mutex<bool>,
}

impl Default for SyntheticCapture {
    fn default() -> Self {
        Self {
            video_codec: MIME_TYPE_VP8.to_owned(),
            audio_codec: MIME_TYPE_OPUS.to_owned(),
            screen_codec: MIME_TYPE_VP8.to_owned(),
            denied: Mutex::new(HashSet::new()),
            display_denied: Mutex::new(false),
        }
    }
}

impl SyntheticCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Screen tracks use `codec`; a codec different from the camera's forces
    /// renegotiation when sharing starts.
    pub fn with_screen_codec(mut self, codec: impl Into<String>) -> Self {
        self.screen_codec = codec.into();
        self
    }

    pub fn deny(&self, kind: TrackKind) {
        if let Ok(mut denied) = self.denied.lock() {
            denied.insert(kind);
        }
    }

    pub fn deny_display(&self) {
        if let Ok(mut denied) = self.display_denied.lock() {
            *denied = true;
        }
    }

    fn is_denied(&self, kind: TrackKind) -> bool {
        self.denied
            .lock()
            .map(|denied| denied.contains(&kind))
            .unwrap_or(false)
    }
}

#[async_trait]
impl CaptureDevices for SyntheticCapture {
    async fn acquire(&self, kind: TrackKind) -> Result<MediaTrack, DeviceError> {
        if self.is_denied(kind) {
            warn!("Synthetic {} capture denied", kind);
            return Err(DeviceError::PermissionDenied(kind));
        }

        let track = match kind {
            TrackKind::Audio => MediaTrack::new(TrackSource::Microphone, self.audio_codec.clone()),
            TrackKind::Video => MediaTrack::new(TrackSource::Camera, self.video_codec.clone()),
        };
        debug!("Synthetic {} track {} acquired", kind, track.id());
        Ok(track)
    }

    async fn acquire_display(&self) -> Result<MediaTrack, DeviceError> {
        let denied = self.display_denied.lock().map(|d| *d).unwrap_or(false);
        if denied {
            return Err(DeviceError::Display("screen capture was cancelled".to_owned()));
        }
        Ok(MediaTrack::new(TrackSource::Screen, self.screen_codec.clone()))
    }
}
