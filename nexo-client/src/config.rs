use crate::transport::TransportConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff used by the websocket channel between reconnect attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(16)).unwrap_or(u64::MAX);
        let ms = self
            .initial_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub relay_url: String,
    pub transport: TransportConfig,
    pub reconnect: ReconnectPolicy,
    /// Sessions stuck mid-negotiation longer than this are disposed.
    /// `None` keeps them pending until closed.
    pub negotiation_timeout_ms: Option<u64>,
    /// How long a cached room topology may be used to resume.
    pub topology_ttl_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: "ws://localhost:8000/ws".to_owned(),
            transport: TransportConfig::default(),
            reconnect: ReconnectPolicy::default(),
            negotiation_timeout_ms: None,
            topology_ttl_secs: 30,
        }
    }
}

impl ClientConfig {
    pub fn negotiation_timeout(&self) -> Option<Duration> {
        self.negotiation_timeout_ms.map(Duration::from_millis)
    }

    pub fn topology_ttl(&self) -> Duration {
        Duration::from_secs(self.topology_ttl_secs)
    }
}
