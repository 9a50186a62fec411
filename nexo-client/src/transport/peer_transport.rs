use crate::media::MediaTrack;
use crate::transport::{TransportConfig, TransportEvent};
use anyhow::Result;
use async_trait::async_trait;
use nexo_core::{IceCandidatePayload, ParticipantId, SessionDescription};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Outcome of swapping the track behind an outbound sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSwap {
    /// Same codec; the sender now carries the new track without renegotiation.
    InPlace,
    /// Capabilities changed; a fresh offer is needed.
    RequiresRenegotiation,
}

/// One peer connection handle, as seen by the negotiation engine.
///
/// `create_offer` and `create_answer` also install the description locally.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn create_offer(&self) -> Result<String>;

    async fn create_answer(&self) -> Result<String>;

    async fn set_remote_description(&self, desc: &SessionDescription) -> Result<()>;

    /// Discard the pending local offer and return to a stable signaling state.
    async fn rollback(&self) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: &IceCandidatePayload) -> Result<()>;

    async fn add_track(&self, track: &MediaTrack) -> Result<()>;

    async fn replace_track(&self, current: &MediaTrack, next: &MediaTrack) -> Result<TrackSwap>;

    async fn remove_track(&self, track: &MediaTrack) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Builds transports for new sessions. Events are pushed into `event_tx`.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(
        &self,
        participant_id: ParticipantId,
        session_id: u64,
        config: TransportConfig,
        event_tx: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn PeerTransport>>;
}
