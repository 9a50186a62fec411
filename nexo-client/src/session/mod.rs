mod connection_registry;
mod peer_session;
mod session_command;
mod session_handle;
mod signaling_state;

pub use connection_registry::*;
pub use peer_session::SessionContext;
pub use session_command::*;
pub use session_handle::*;
pub use signaling_state::*;
