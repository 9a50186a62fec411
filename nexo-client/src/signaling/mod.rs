mod signaling_channel;
mod signaling_output;
mod subscriptions;
mod ws_channel;

pub use signaling_channel::*;
pub use signaling_output::*;
pub use subscriptions::*;
pub use ws_channel::*;
