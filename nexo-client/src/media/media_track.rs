use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

pub const MIME_TYPE_OPUS: &str = "audio/opus";
pub const MIME_TYPE_VP8: &str = "video/VP8";
pub const MIME_TYPE_H264: &str = "video/H264";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TrackKind {
    Audio,
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => f.write_str("audio"),
            TrackKind::Video => f.write_str("video"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackSource {
    Camera,
    Microphone,
    Screen,
}

impl TrackSource {
    pub fn kind(self) -> TrackKind {
        match self {
            TrackSource::Microphone => TrackKind::Audio,
            TrackSource::Camera | TrackSource::Screen => TrackKind::Video,
        }
    }
}

#[derive(Debug)]
struct TrackInner {
    id: String,
    source: TrackSource,
    codec: String,
    enabled: AtomicBool,
    stopped: AtomicBool,
}

/// Handle to one local capture track.
///
/// Clones share the same enabled/stopped flags, so muting through any clone
/// is seen by every peer connection the track is bound to.
#[derive(Debug, Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

impl MediaTrack {
    pub fn new(source: TrackSource, codec: impl Into<String>) -> Self {
        let id = format!("{}-{}", source.kind(), Uuid::new_v4().simple());
        Self::with_id(id, source, codec)
    }

    pub fn with_id(id: impl Into<String>, source: TrackSource, codec: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(TrackInner {
                id: id.into(),
                source,
                codec: codec.into(),
                enabled: AtomicBool::new(true),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.source.kind()
    }

    pub fn source(&self) -> TrackSource {
        self.inner.source
    }

    pub fn codec(&self) -> &str {
        &self.inner.codec
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Mute or unmute at the source. The track stays bound to its senders.
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }
}

impl PartialEq for MediaTrack {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for MediaTrack {}
