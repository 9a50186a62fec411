use crate::session::{SessionContext, SessionHandle, peer_session};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::join_all;
use nexo_core::ParticipantId;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// Owns at most one live peer session per remote participant.
#[derive(Clone)]
pub struct ConnectionRegistry {
    sessions: Arc<DashMap<ParticipantId, SessionHandle>>,
    context: Arc<SessionContext>,
    next_session_id: Arc<AtomicU64>,
}

impl ConnectionRegistry {
    pub fn new(context: SessionContext) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            context: Arc::new(context),
            next_session_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn local_id(&self) -> &ParticipantId {
        &self.context.local_id
    }

    /// Existing session for `participant_id`, or a freshly spawned one.
    ///
    /// The map entry stays locked while the session is spawned, so concurrent
    /// callers always end up with the same handle.
    pub fn get_or_create(&self, participant_id: &ParticipantId) -> SessionHandle {
        match self.sessions.entry(participant_id.clone()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
                info!(
                    "Creating peer session {} for {}",
                    session_id, participant_id
                );
                let handle = peer_session::spawn(
                    Arc::clone(&self.context),
                    participant_id.clone(),
                    session_id,
                );
                entry.insert(handle.clone());
                handle
            }
        }
    }

    pub fn get(&self, participant_id: &ParticipantId) -> Option<SessionHandle> {
        self.sessions.get(participant_id).map(|h| h.value().clone())
    }

    pub fn contains(&self, participant_id: &ParticipantId) -> bool {
        self.sessions.contains_key(participant_id)
    }

    /// Whether `session_id` is the live session for `participant_id`.
    pub fn is_current(&self, participant_id: &ParticipantId, session_id: u64) -> bool {
        self.sessions
            .get(participant_id)
            .is_some_and(|h| h.session_id() == session_id)
    }

    /// Close and drop the session. Returns `false` if there was none.
    pub async fn remove(&self, participant_id: &ParticipantId) -> bool {
        let Some((_, handle)) = self.sessions.remove(participant_id) else {
            return false;
        };
        info!("Disposing peer session with {}", participant_id);
        handle.close().await;
        true
    }

    /// Like [`remove`](Self::remove), but only if `session_id` is still the
    /// live session. Events of an already replaced session are ignored.
    pub async fn remove_session(&self, participant_id: &ParticipantId, session_id: u64) -> bool {
        let Some((_, handle)) = self
            .sessions
            .remove_if(participant_id, |_, h| h.session_id() == session_id)
        else {
            debug!(
                "Session {} for {} is not current; nothing to dispose",
                session_id, participant_id
            );
            return false;
        };
        info!("Disposing peer session {} with {}", session_id, participant_id);
        handle.close().await;
        true
    }

    pub fn all(&self) -> Vec<SessionHandle> {
        self.sessions.iter().map(|e| e.value().clone()).collect()
    }

    pub fn participants(&self) -> Vec<ParticipantId> {
        let mut ids: Vec<_> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Dispose every session.
    pub async fn clear(&self) {
        let ids: Vec<_> = self.sessions.iter().map(|e| e.key().clone()).collect();
        let handles: Vec<_> = ids
            .iter()
            .filter_map(|id| self.sessions.remove(id).map(|(_, h)| h))
            .collect();
        if handles.is_empty() {
            return;
        }
        info!("Disposing {} peer session(s)", handles.len());
        join_all(handles.iter().map(SessionHandle::close)).await;
    }
}
