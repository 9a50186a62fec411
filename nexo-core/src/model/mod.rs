mod participant;
mod room;
mod signaling;
mod topology;

pub use participant::ParticipantId;
pub use room::RoomId;
pub use signaling::{
    IceCandidatePayload, IceServerConfig, SdpKind, SessionDescription, SignalKind, SignalMessage,
};
pub use topology::RoomTopology;
