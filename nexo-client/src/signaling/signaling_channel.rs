use crate::error::SessionResult;
use nexo_core::{ParticipantId, SignalKind, SignalMessage};
use std::sync::Arc;

pub type SignalHandler = Arc<dyn Fn(SignalMessage) + Send + Sync>;

pub type StatusHandler = Arc<dyn Fn(ChannelStatus) + Send + Sync>;

/// Connectivity of the relay connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Connected,
    Disconnected,
    /// Back online after an outage; room membership must be announced again.
    Reconnected,
}

/// Message transport between participants, via the relay.
///
/// Point-to-point messages addressed to someone else are never dispatched.
/// Handlers are invoked in arrival order.
pub trait SignalingChannel: Send + Sync {
    fn local_id(&self) -> &ParticipantId;

    /// Fire-and-forget. Fails with `SignalingDelivery` while offline.
    fn send(&self, message: SignalMessage) -> SessionResult<()>;

    fn subscribe(&self, kind: SignalKind, handler: SignalHandler);

    fn subscribe_status(&self, handler: StatusHandler);
}
