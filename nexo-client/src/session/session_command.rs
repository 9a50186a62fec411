use crate::error::SessionResult;
use crate::media::{MediaTrack, TrackKind};
use crate::session::SignalingState;
use nexo_core::{IceCandidatePayload, SessionDescription};
use std::collections::BTreeMap;
use tokio::sync::oneshot;

/// Point-in-time view of a peer session, for inspection.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: SignalingState,
    pub bound_tracks: BTreeMap<TrackKind, MediaTrack>,
    pub queued_candidates: usize,
    pub has_remote_description: bool,
    pub renegotiation_pending: bool,
    /// A renegotiation request is out and no grant has arrived yet.
    pub awaiting_grant: bool,
}

/// Inbox of a peer session actor. Processed strictly in order.
#[derive(Debug)]
pub enum SessionCommand {
    /// Produce and send an offer if the session is idle.
    Initiate,

    RemoteOffer(SessionDescription),

    RemoteAnswer(SessionDescription),

    RemoteCandidate(IceCandidatePayload),

    /// Make the outbound senders carry exactly `tracks` (one per kind).
    BindTracks {
        tracks: Vec<MediaTrack>,
        reply: oneshot::Sender<SessionResult<()>>,
    },

    /// The peer wants the next offer on the established connection.
    RenegotiationRequested,

    /// The peer holds its offers until ours has been answered.
    RenegotiationGranted,

    Snapshot(oneshot::Sender<SessionSnapshot>),
}
