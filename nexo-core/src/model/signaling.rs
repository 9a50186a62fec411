use crate::model::participant::ParticipantId;
use crate::model::room::RoomId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl IceServerConfig {
    pub fn stun(urls: Vec<String>) -> Self {
        Self {
            urls,
            username: None,
            credential: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Opaque negotiation payload carried by `call-offer` / `call-answer`.
///
/// `tiebreaker` is only set on offers and decides which side backs off
/// when both peers offer at the same time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiebreaker: Option<u64>,
}

impl SessionDescription {
    pub fn offer(sdp: String, tiebreaker: u64) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp,
            tiebreaker: Some(tiebreaker),
        }
    }

    pub fn answer(sdp: String) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp,
            tiebreaker: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidatePayload {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default, rename = "sdpMLineIndex")]
    pub sdp_m_line_index: Option<u16>,
}

/// Messages exchanged with the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum SignalMessage {
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        room_id: RoomId,
        participant_id: ParticipantId,
    },
    #[serde(rename_all = "camelCase")]
    JoinedRoom {
        room_id: RoomId,
        #[serde(default)]
        participants: Vec<ParticipantId>,
    },
    #[serde(rename_all = "camelCase")]
    LeaveRoom {
        room_id: RoomId,
        participant_id: ParticipantId,
    },
    #[serde(rename_all = "camelCase")]
    ParticipantJoined { participant_id: ParticipantId },
    #[serde(rename_all = "camelCase")]
    ParticipantLeft { participant_id: ParticipantId },
    #[serde(rename_all = "camelCase")]
    CallOffer {
        to: ParticipantId,
        from: ParticipantId,
        sdp_offer: SessionDescription,
    },
    #[serde(rename_all = "camelCase")]
    CallAnswer {
        to: ParticipantId,
        from: ParticipantId,
        sdp_answer: SessionDescription,
    },
    IceCandidate {
        to: ParticipantId,
        from: ParticipantId,
        candidate: IceCandidatePayload,
    },
    /// Asks the peer for the next turn to offer on an established session.
    RenegotiationRequest { to: ParticipantId, from: ParticipantId },
    /// Hands the next offer to the peer; the sender holds its own until then.
    RenegotiationGrant { to: ParticipantId, from: ParticipantId },
    ChatMessage {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<ParticipantId>,
    },
}

/// Discriminant of [`SignalMessage`], used as a subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    JoinRoom,
    JoinedRoom,
    LeaveRoom,
    ParticipantJoined,
    ParticipantLeft,
    CallOffer,
    CallAnswer,
    IceCandidate,
    RenegotiationRequest,
    RenegotiationGrant,
    ChatMessage,
}

impl SignalMessage {
    pub fn kind(&self) -> SignalKind {
        match self {
            SignalMessage::JoinRoom { .. } => SignalKind::JoinRoom,
            SignalMessage::JoinedRoom { .. } => SignalKind::JoinedRoom,
            SignalMessage::LeaveRoom { .. } => SignalKind::LeaveRoom,
            SignalMessage::ParticipantJoined { .. } => SignalKind::ParticipantJoined,
            SignalMessage::ParticipantLeft { .. } => SignalKind::ParticipantLeft,
            SignalMessage::CallOffer { .. } => SignalKind::CallOffer,
            SignalMessage::CallAnswer { .. } => SignalKind::CallAnswer,
            SignalMessage::IceCandidate { .. } => SignalKind::IceCandidate,
            SignalMessage::RenegotiationRequest { .. } => SignalKind::RenegotiationRequest,
            SignalMessage::RenegotiationGrant { .. } => SignalKind::RenegotiationGrant,
            SignalMessage::ChatMessage { .. } => SignalKind::ChatMessage,
        }
    }

    /// Recipient of a point-to-point message; `None` for room broadcasts.
    pub fn recipient(&self) -> Option<&ParticipantId> {
        match self {
            SignalMessage::CallOffer { to, .. }
            | SignalMessage::CallAnswer { to, .. }
            | SignalMessage::IceCandidate { to, .. }
            | SignalMessage::RenegotiationRequest { to, .. }
            | SignalMessage::RenegotiationGrant { to, .. } => Some(to),
            _ => None,
        }
    }

    pub fn sender(&self) -> Option<&ParticipantId> {
        match self {
            SignalMessage::CallOffer { from, .. }
            | SignalMessage::CallAnswer { from, .. }
            | SignalMessage::IceCandidate { from, .. }
            | SignalMessage::RenegotiationRequest { from, .. }
            | SignalMessage::RenegotiationGrant { from, .. } => Some(from),
            SignalMessage::ChatMessage { from, .. } => from.as_ref(),
            SignalMessage::JoinRoom { participant_id, .. }
            | SignalMessage::LeaveRoom { participant_id, .. } => Some(participant_id),
            _ => None,
        }
    }
}
