use crate::media::RemoteTrack;
use nexo_core::{IceCandidatePayload, ParticipantId};

/// Connection-level state reported by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Events a peer session surfaces to the room loop.
///
/// Every event carries the `session_id` of the session that produced it so
/// events from an already disposed session can be told apart.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Local ICE candidate gathered, to be trickled to the remote side.
    CandidateGenerated {
        participant_id: ParticipantId,
        session_id: u64,
        candidate: IceCandidatePayload,
    },

    /// Remote media arrived.
    RemoteTrack {
        participant_id: ParticipantId,
        session_id: u64,
        track: RemoteTrack,
    },

    StateChanged {
        participant_id: ParticipantId,
        session_id: u64,
        state: PeerConnectionState,
    },

    /// The session stayed mid-negotiation past the configured deadline.
    NegotiationTimedOut {
        participant_id: ParticipantId,
        session_id: u64,
    },

    /// The transport for the session could not be built.
    SetupFailed {
        participant_id: ParticipantId,
        session_id: u64,
    },
}

impl TransportEvent {
    pub fn participant_id(&self) -> &ParticipantId {
        match self {
            TransportEvent::CandidateGenerated { participant_id, .. }
            | TransportEvent::RemoteTrack { participant_id, .. }
            | TransportEvent::StateChanged { participant_id, .. }
            | TransportEvent::NegotiationTimedOut { participant_id, .. }
            | TransportEvent::SetupFailed { participant_id, .. } => participant_id,
        }
    }

    pub fn session_id(&self) -> u64 {
        match self {
            TransportEvent::CandidateGenerated { session_id, .. }
            | TransportEvent::RemoteTrack { session_id, .. }
            | TransportEvent::StateChanged { session_id, .. }
            | TransportEvent::NegotiationTimedOut { session_id, .. }
            | TransportEvent::SetupFailed { session_id, .. } => *session_id,
        }
    }
}
