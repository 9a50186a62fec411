use anyhow::{Context, Result};
use nexo_core::{ParticipantId, RoomId, RoomTopology};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// Short-lived on-disk copy of the room topology, used to resume after a
/// restart.
#[derive(Debug, Clone)]
pub struct TopologyCache {
    path: PathBuf,
    ttl: Duration,
}

impl TopologyCache {
    pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            path: path.into(),
            ttl,
        }
    }

    pub fn save(&self, topology: &RoomTopology) -> Result<()> {
        let mut snapshot = topology.clone();
        snapshot.touch();
        let json = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        debug!(
            "Saved topology of {} ({} participant(s))",
            snapshot.room_id,
            snapshot.len()
        );
        Ok(())
    }

    /// Snapshot for `local` in `room`, if one exists and is still fresh.
    pub fn load(&self, room: &RoomId, local: &ParticipantId) -> Option<RoomTopology> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read {}: {}", self.path.display(), e);
                return None;
            }
        };

        let topology: RoomTopology = match serde_json::from_str(&raw) {
            Ok(topology) => topology,
            Err(e) => {
                warn!("Ignoring corrupt topology cache: {}", e);
                return None;
            }
        };

        if !topology.matches(room, local) {
            debug!("Cached topology belongs to another room or participant");
            return None;
        }
        if topology.is_expired(self.ttl) {
            debug!("Cached topology of {} expired", topology.room_id);
            return None;
        }
        Some(topology)
    }

    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("failed to remove {}", self.path.display())),
        }
    }
}
