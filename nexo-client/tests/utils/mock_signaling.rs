use async_trait::async_trait;
use nexo_client::{ConnectionRegistry, SignalingOutput};
use nexo_core::{IceCandidatePayload, ParticipantId, SessionDescription};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::{Mutex, mpsc};

#[derive(Debug, Clone)]
pub enum CapturedSignal {
    Offer {
        participant_id: ParticipantId,
        desc: SessionDescription,
    },
    Answer {
        participant_id: ParticipantId,
        desc: SessionDescription,
    },
    Ice {
        participant_id: ParticipantId,
        candidate: IceCandidatePayload,
    },
    RenegotiationRequest {
        participant_id: ParticipantId,
    },
    RenegotiationGrant {
        participant_id: ParticipantId,
    },
}

/// Mock SignalingOutput that captures all outgoing signals.
#[derive(Clone)]
pub struct MockSignalingOutput {
    /// Channel to send captured signals.
    tx: mpsc::UnboundedSender<CapturedSignal>,
    /// All captured signals (for verification).
    signals: Arc<Mutex<Vec<CapturedSignal>>>,
}

impl MockSignalingOutput {
    /// Create a new MockSignalingOutput and its receiver channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CapturedSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let signaling = Self {
            tx,
            signals: Arc::new(Mutex::new(Vec::new())),
        };
        (signaling, rx)
    }

    /// Create a MockSignalingOutput without a receiver (signals are only stored).
    pub fn new_stored_only() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self {
            tx,
            signals: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn offers_for(&self, participant_id: &ParticipantId) -> Vec<SessionDescription> {
        self.signals
            .lock()
            .await
            .iter()
            .filter_map(|s| match s {
                CapturedSignal::Offer {
                    participant_id: id,
                    desc,
                } if id == participant_id => Some(desc.clone()),
                _ => None,
            })
            .collect()
    }

    /// Get the SDP answer for a specific participant (if any).
    pub async fn get_answer_for(&self, participant_id: &ParticipantId) -> Option<SessionDescription> {
        self.signals.lock().await.iter().find_map(|s| match s {
            CapturedSignal::Answer {
                participant_id: id,
                desc,
            } if id == participant_id => Some(desc.clone()),
            _ => None,
        })
    }

    /// Get all ICE candidates for a specific participant.
    pub async fn get_ice_candidates_for(
        &self,
        participant_id: &ParticipantId,
    ) -> Vec<IceCandidatePayload> {
        self.signals
            .lock()
            .await
            .iter()
            .filter_map(|s| match s {
                CapturedSignal::Ice {
                    participant_id: id,
                    candidate,
                } if id == participant_id => Some(candidate.clone()),
                _ => None,
            })
            .collect()
    }

    async fn capture(&self, signal: CapturedSignal) {
        self.signals.lock().await.push(signal.clone());
        let _ = self.tx.send(signal);
    }
}

impl Default for MockSignalingOutput {
    fn default() -> Self {
        Self::new_stored_only()
    }
}

#[async_trait]
impl SignalingOutput for MockSignalingOutput {
    async fn send_offer(&self, participant_id: ParticipantId, offer: SessionDescription) {
        tracing::debug!("[MockSignaling] send_offer to {}", participant_id);
        self.capture(CapturedSignal::Offer {
            participant_id,
            desc: offer,
        })
        .await;
    }

    async fn send_answer(&self, participant_id: ParticipantId, answer: SessionDescription) {
        tracing::debug!("[MockSignaling] send_answer to {}", participant_id);
        self.capture(CapturedSignal::Answer {
            participant_id,
            desc: answer,
        })
        .await;
    }

    async fn send_ice(&self, participant_id: ParticipantId, candidate: IceCandidatePayload) {
        tracing::debug!("[MockSignaling] send_ice to {}", participant_id);
        self.capture(CapturedSignal::Ice {
            participant_id,
            candidate,
        })
        .await;
    }

    async fn send_renegotiation_request(&self, participant_id: ParticipantId) {
        tracing::debug!("[MockSignaling] send_renegotiation_request to {}", participant_id);
        self.capture(CapturedSignal::RenegotiationRequest { participant_id })
            .await;
    }

    async fn send_renegotiation_grant(&self, participant_id: ParticipantId) {
        tracing::debug!("[MockSignaling] send_renegotiation_grant to {}", participant_id);
        self.capture(CapturedSignal::RenegotiationGrant { participant_id })
            .await;
    }
}

/// Delivers straight into the peer registry, as if the relay were instant.
pub struct LoopbackOutput {
    local_id: ParticipantId,
    peer: OnceLock<ConnectionRegistry>,
    offers: AtomicUsize,
    requests: AtomicUsize,
}

impl LoopbackOutput {
    pub fn new(local_id: ParticipantId) -> Arc<Self> {
        Arc::new(Self {
            local_id,
            peer: OnceLock::new(),
            offers: AtomicUsize::new(0),
            requests: AtomicUsize::new(0),
        })
    }

    pub fn connect(&self, peer: ConnectionRegistry) {
        let _ = self.peer.set(peer);
    }

    pub fn offers_sent(&self) -> usize {
        self.offers.load(Ordering::SeqCst)
    }

    pub fn renegotiation_requests_sent(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignalingOutput for LoopbackOutput {
    async fn send_offer(&self, _participant_id: ParticipantId, offer: SessionDescription) {
        self.offers.fetch_add(1, Ordering::SeqCst);
        if let Some(peer) = self.peer.get() {
            let _ = peer.get_or_create(&self.local_id).deliver_offer(offer);
        }
    }

    async fn send_answer(&self, _participant_id: ParticipantId, answer: SessionDescription) {
        if let Some(session) = self.peer.get().and_then(|p| p.get(&self.local_id)) {
            let _ = session.deliver_answer(answer);
        }
    }

    async fn send_ice(&self, _participant_id: ParticipantId, candidate: IceCandidatePayload) {
        if let Some(session) = self.peer.get().and_then(|p| p.get(&self.local_id)) {
            let _ = session.deliver_candidate(candidate);
        }
    }

    async fn send_renegotiation_request(&self, _participant_id: ParticipantId) {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if let Some(session) = self.peer.get().and_then(|p| p.get(&self.local_id)) {
            let _ = session.deliver_renegotiation_request();
        }
    }

    async fn send_renegotiation_grant(&self, _participant_id: ParticipantId) {
        if let Some(session) = self.peer.get().and_then(|p| p.get(&self.local_id)) {
            let _ = session.deliver_renegotiation_grant();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_signaling_captures_answer() {
        let (signaling, mut rx) = MockSignalingOutput::new();
        let participant_id = ParticipantId::generate();
        let answer = SessionDescription::answer("test-sdp".to_string());

        signaling
            .send_answer(participant_id.clone(), answer.clone())
            .await;

        let msg = rx.recv().await.unwrap();
        assert!(matches!(msg, CapturedSignal::Answer { .. }));
        assert_eq!(signaling.get_answer_for(&participant_id).await, Some(answer));
    }

    #[tokio::test]
    async fn test_mock_signaling_captures_ice() {
        let signaling = MockSignalingOutput::new_stored_only();
        let participant_id = ParticipantId::generate();
        let candidate = IceCandidatePayload {
            candidate: "candidate:123".to_string(),
            ..Default::default()
        };

        signaling
            .send_ice(participant_id.clone(), candidate.clone())
            .await;

        let candidates = signaling.get_ice_candidates_for(&participant_id).await;
        assert_eq!(candidates, vec![candidate]);
    }
}
