use crate::media::TrackKind;
use nexo_core::ParticipantId;
use thiserror::Error;

/// Capture device could not be acquired. The call continues without that kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("permission to use the {0} device was denied")]
    PermissionDenied(TrackKind),

    #[error("no {0} device is available")]
    Unavailable(TrackKind),

    #[error("screen capture failed: {0}")]
    Display(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// Relay unreachable; the message was dropped.
    #[error("signaling delivery failed: {0}")]
    SignalingDelivery(String),

    /// A description could not be applied; the session kept its last good state.
    #[error("negotiation with {participant} failed: {reason}")]
    NegotiationState {
        participant: ParticipantId,
        reason: String,
    },

    #[error("ice candidate from {participant} dropped: {reason}")]
    IceCandidate {
        participant: ParticipantId,
        reason: String,
    },

    #[error("transport error: {0:#}")]
    Transport(anyhow::Error),

    #[error("session with {0} is closed")]
    SessionClosed(ParticipantId),

    #[error("room controller is no longer running")]
    ControllerStopped,
}

pub type SessionResult<T> = Result<T, SessionError>;
