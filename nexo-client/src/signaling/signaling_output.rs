use crate::signaling::SignalingChannel;
use async_trait::async_trait;
use nexo_core::{IceCandidatePayload, ParticipantId, SessionDescription, SignalMessage};
use std::sync::Arc;
use tracing::warn;

/// Outgoing half of negotiation, as used by peer sessions.
///
/// Delivery is best effort: failures are logged by the implementation and
/// never surface to the session.
#[async_trait]
pub trait SignalingOutput: Send + Sync {
    async fn send_offer(&self, participant_id: ParticipantId, offer: SessionDescription);

    async fn send_answer(&self, participant_id: ParticipantId, answer: SessionDescription);

    async fn send_ice(&self, participant_id: ParticipantId, candidate: IceCandidatePayload);

    async fn send_renegotiation_request(&self, participant_id: ParticipantId);

    async fn send_renegotiation_grant(&self, participant_id: ParticipantId);
}

/// Sends negotiation messages through a [`SignalingChannel`].
pub struct RelayOutput {
    channel: Arc<dyn SignalingChannel>,
}

impl RelayOutput {
    pub fn new(channel: Arc<dyn SignalingChannel>) -> Self {
        Self { channel }
    }

    fn deliver(&self, message: SignalMessage) {
        let kind = message.kind();
        if let Err(e) = self.channel.send(message) {
            warn!("Dropping outgoing {:?}: {}", kind, e);
        }
    }
}

#[async_trait]
impl SignalingOutput for RelayOutput {
    async fn send_offer(&self, participant_id: ParticipantId, offer: SessionDescription) {
        self.deliver(SignalMessage::CallOffer {
            to: participant_id,
            from: self.channel.local_id().clone(),
            sdp_offer: offer,
        });
    }

    async fn send_answer(&self, participant_id: ParticipantId, answer: SessionDescription) {
        self.deliver(SignalMessage::CallAnswer {
            to: participant_id,
            from: self.channel.local_id().clone(),
            sdp_answer: answer,
        });
    }

    async fn send_ice(&self, participant_id: ParticipantId, candidate: IceCandidatePayload) {
        self.deliver(SignalMessage::IceCandidate {
            to: participant_id,
            from: self.channel.local_id().clone(),
            candidate,
        });
    }

    async fn send_renegotiation_request(&self, participant_id: ParticipantId) {
        self.deliver(SignalMessage::RenegotiationRequest {
            to: participant_id,
            from: self.channel.local_id().clone(),
        });
    }

    async fn send_renegotiation_grant(&self, participant_id: ParticipantId) {
        self.deliver(SignalMessage::RenegotiationGrant {
            to: participant_id,
            from: self.channel.local_id().clone(),
        });
    }
}
