use nexo_core::IceServerConfig;
use nexo_core::utils::DEFAULT_STUN_ADDRS;
use serde::{Deserialize, Serialize};

/// NAT traversal endpoints every peer connection is built with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    pub ice_servers: Vec<IceServerConfig>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServerConfig::stun(
                DEFAULT_STUN_ADDRS.iter().map(|s| (*s).to_owned()).collect(),
            )],
        }
    }
}

impl TransportConfig {
    pub fn with_turn(mut self, url: String, username: String, credential: String) -> Self {
        self.ice_servers.push(IceServerConfig {
            urls: vec![url],
            username: Some(username),
            credential: Some(credential),
        });
        self
    }
}
