pub mod mock_signaling;

pub use mock_relay::*;
pub use mock_signaling::*;
pub use mock_transport::*;
pub use signal_helpers::*;
pub use ws_relay::*;
