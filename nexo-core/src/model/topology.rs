use crate::model::participant::ParticipantId;
use crate::model::room::RoomId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Participants believed to be in a room, as seen by one local participant.
///
/// Serializable so a client can stash it across a reload and resume the
/// previous sessions. The local participant is never part of `participants`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomTopology {
    pub room_id: RoomId,
    pub local_participant: ParticipantId,
    pub participants: BTreeSet<ParticipantId>,
    pub updated_at_ms: u64,
}

impl RoomTopology {
    pub fn new(room_id: RoomId, local_participant: ParticipantId) -> Self {
        Self {
            room_id,
            local_participant,
            participants: BTreeSet::new(),
            updated_at_ms: now_ms(),
        }
    }

    /// Returns `false` for the local participant and for already known ids.
    pub fn insert(&mut self, participant: ParticipantId) -> bool {
        if participant == self.local_participant {
            return false;
        }
        let inserted = self.participants.insert(participant);
        if inserted {
            self.touch();
        }
        inserted
    }

    pub fn remove(&mut self, participant: &ParticipantId) -> bool {
        let removed = self.participants.remove(participant);
        if removed {
            self.touch();
        }
        removed
    }

    pub fn contains(&self, participant: &ParticipantId) -> bool {
        self.participants.contains(participant)
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn clear(&mut self) {
        self.participants.clear();
        self.touch();
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        now_ms().saturating_sub(self.updated_at_ms) > ttl.as_millis() as u64
    }

    /// Whether this snapshot can seed a session for `local` in `room`.
    pub fn matches(&self, room: &RoomId, local: &ParticipantId) -> bool {
        &self.room_id == room && &self.local_participant == local
    }

    /// Mark the snapshot as fresh.
    pub fn touch(&mut self) {
        self.updated_at_ms = now_ms();
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
