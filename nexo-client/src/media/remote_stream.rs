use crate::media::TrackKind;
use nexo_core::ParticipantId;
use std::sync::{Arc, RwLock};

/// Description of one inbound track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub track_id: String,
    pub stream_id: String,
    pub kind: TrackKind,
}

#[derive(Debug)]
struct RemoteStreamInner {
    participant_id: ParticipantId,
    session_id: u64,
    stream_id: String,
    tracks: RwLock<Vec<RemoteTrack>>,
}

/// Inbound media of one peer session, handed to the rendering layer.
#[derive(Debug, Clone)]
pub struct RemoteStream {
    inner: Arc<RemoteStreamInner>,
}

impl RemoteStream {
    pub(crate) fn new(participant_id: ParticipantId, session_id: u64, first: RemoteTrack) -> Self {
        Self {
            inner: Arc::new(RemoteStreamInner {
                participant_id,
                session_id,
                stream_id: first.stream_id.clone(),
                tracks: RwLock::new(vec![first]),
            }),
        }
    }

    pub fn participant_id(&self) -> &ParticipantId {
        &self.inner.participant_id
    }

    pub fn session_id(&self) -> u64 {
        self.inner.session_id
    }

    pub fn stream_id(&self) -> &str {
        &self.inner.stream_id
    }

    pub fn tracks(&self) -> Vec<RemoteTrack> {
        match self.inner.tracks.read() {
            Ok(tracks) => tracks.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn has_kind(&self, kind: TrackKind) -> bool {
        self.tracks().iter().any(|t| t.kind == kind)
    }

    /// Returns `false` when the track was already known.
    pub(crate) fn push(&self, track: RemoteTrack) -> bool {
        let mut tracks = match self.inner.tracks.write() {
            Ok(tracks) => tracks,
            Err(poisoned) => poisoned.into_inner(),
        };
        if tracks.iter().any(|t| t.track_id == track.track_id) {
            return false;
        }
        tracks.push(track);
        true
    }
}

impl PartialEq for RemoteStream {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Entry of the reactive remote-stream list exposed to the UI.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteParticipant {
    pub participant_id: ParticipantId,
    pub stream: RemoteStream,
}
