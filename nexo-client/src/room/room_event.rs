use crate::error::DeviceError;
use crate::media::RemoteStream;
use crate::signaling::ChannelStatus;
use nexo_core::{ParticipantId, RoomId};

/// Notifications for the UI layer.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// Presence announced to the relay.
    Joined(RoomId),

    ParticipantJoined(ParticipantId),

    ParticipantLeft(ParticipantId),

    RemoteStreamAdded {
        participant_id: ParticipantId,
        stream: RemoteStream,
    },

    RemoteStreamRemoved(ParticipantId),

    Chat {
        from: Option<ParticipantId>,
        message: String,
    },

    /// A capture device could not be used; the call goes on without it.
    DeviceError(DeviceError),

    SignalingStatus(ChannelStatus),

    /// The session was disposed after a failure and can be recreated.
    SessionFailed {
        participant_id: ParticipantId,
        reason: String,
    },

    Left(RoomId),
}
