use crate::error::SessionResult;
use crate::signaling::ChannelStatus;
use nexo_core::SignalMessage;
use tokio::sync::oneshot;

/// Inbox of the room controller: relay traffic and user actions.
#[derive(Debug)]
pub enum RoomCommand {
    Signal(SignalMessage),

    ChannelStatus(ChannelStatus),

    ToggleCamera(oneshot::Sender<Option<bool>>),

    ToggleMic(oneshot::Sender<Option<bool>>),

    StartScreenShare(oneshot::Sender<SessionResult<()>>),

    StopScreenShare(oneshot::Sender<bool>),

    SendChat {
        message: String,
        reply: oneshot::Sender<SessionResult<()>>,
    },

    /// Hang up: stop media, dispose sessions, tell the relay we left.
    EndCall(oneshot::Sender<()>),
}
