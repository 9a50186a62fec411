mod test_webrtc_glare;
mod test_webrtc_negotiation;

use nexo_client::{PeerConnectionState, TransportConfig, TransportEvent};
use tokio::sync::mpsc;

/// Timeout for a real peer connection to come up (ms).
pub const CONNECTION_TIMEOUT_MS: u64 = 10_000;

/// Host candidates only; tests never leave the machine.
pub fn local_config() -> TransportConfig {
    TransportConfig {
        ice_servers: vec![],
    }
}

/// Drain `events` until the connection reports `Connected`.
pub async fn wait_connected(events: &mut mpsc::UnboundedReceiver<TransportEvent>) -> bool {
    crate::utils::wait_for_event(events, CONNECTION_TIMEOUT_MS, |event| {
        matches!(
            event,
            TransportEvent::StateChanged {
                state: PeerConnectionState::Connected,
                ..
            }
        )
    })
    .await
    .is_some()
}
