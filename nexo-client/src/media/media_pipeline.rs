use crate::media::{
    LocalMediaState, LocalStream, MediaTrack, RemoteParticipant, RemoteStream, RemoteTrack,
    TrackSource,
};
use crate::session::ConnectionRegistry;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::join_all;
use nexo_core::ParticipantId;
use std::sync::Arc;
use tokio::sync::{RwLock, watch};
use tracing::{debug, info, warn};

/// Binds local capture to every peer session and collects inbound streams.
pub struct MediaPipeline {
    local: Arc<RwLock<LocalMediaState>>,
    remote: DashMap<ParticipantId, RemoteStream>,
    remote_tx: watch::Sender<Vec<RemoteParticipant>>,
    local_tx: watch::Sender<LocalStream>,
    outbound_tx: watch::Sender<Vec<MediaTrack>>,
}

impl Default for MediaPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaPipeline {
    pub fn new() -> Self {
        let (remote_tx, _) = watch::channel(Vec::new());
        let (local_tx, _) = watch::channel(LocalStream::default());
        let (outbound_tx, _) = watch::channel(Vec::new());

        Self {
            local: Arc::new(RwLock::new(LocalMediaState::default())),
            remote: DashMap::new(),
            remote_tx,
            local_tx,
            outbound_tx,
        }
    }

    pub fn local_state(&self) -> Arc<RwLock<LocalMediaState>> {
        Arc::clone(&self.local)
    }

    /// Outbound set that newly created sessions bind on startup.
    pub fn outbound_tracks(&self) -> watch::Receiver<Vec<MediaTrack>> {
        self.outbound_tx.subscribe()
    }

    pub fn local_stream(&self) -> watch::Receiver<LocalStream> {
        self.local_tx.subscribe()
    }

    pub fn remote_streams(&self) -> watch::Receiver<Vec<RemoteParticipant>> {
        self.remote_tx.subscribe()
    }

    pub fn remote_stream(&self, participant_id: &ParticipantId) -> Option<RemoteStream> {
        self.remote.get(participant_id).map(|s| s.value().clone())
    }

    /// Mutate the local sources and rebind every active session before
    /// returning.
    ///
    /// The write lock is held for the whole pass. The new outbound set is
    /// published before the session list is taken, so a session created
    /// concurrently either starts from the new set or is in the list.
    pub async fn bind_local_source<F, R>(&self, registry: &ConnectionRegistry, update: F) -> R
    where
        F: FnOnce(&mut LocalMediaState) -> R,
    {
        let mut state = self.local.write().await;
        let result = update(&mut state);
        let tracks = state.outbound_tracks();
        self.outbound_tx.send_replace(tracks.clone());

        let sessions = registry.all();
        let outcomes = join_all(
            sessions
                .iter()
                .map(|session| session.bind_tracks(tracks.clone())),
        )
        .await;

        for (session, outcome) in sessions.iter().zip(outcomes) {
            if let Err(e) = outcome {
                warn!(
                    "Failed to rebind local media for {}: {}",
                    session.participant_id(),
                    e
                );
            }
        }

        self.local_tx.send_replace(state.local_stream());
        debug!("Local media bound to {} session(s)", sessions.len());
        result
    }

    pub async fn start_screen_share(&self, registry: &ConnectionRegistry, screen: MediaTrack) {
        info!("Starting screen share with track {}", screen.id());
        let previous = self
            .bind_local_source(registry, |state| state.start_screen(screen))
            .await;
        if let Some(previous) = previous {
            previous.stop();
        }
    }

    /// Returns `false` when no share was active.
    pub async fn stop_screen_share(&self, registry: &ConnectionRegistry) -> bool {
        let screen = self
            .bind_local_source(registry, |state| state.stop_screen())
            .await;
        match screen {
            Some(screen) => {
                info!("Stopped screen share {}", screen.id());
                screen.stop();
                true
            }
            None => false,
        }
    }

    /// Flip camera or microphone enablement. Senders are left untouched.
    pub async fn toggle(&self, source: TrackSource) -> Option<bool> {
        let mut state = self.local.write().await;
        let enabled = state.toggle(source);
        self.local_tx.send_replace(state.local_stream());
        enabled
    }

    pub async fn stop_all(&self) {
        let mut state = self.local.write().await;
        state.stop_all();
        self.outbound_tx.send_replace(Vec::new());
        self.local_tx.send_replace(state.local_stream());
    }

    /// Register inbound media for a session.
    ///
    /// Returns the stream the first time media arrives for `session_id`; later
    /// tracks of the same session are attached to it and yield `None`.
    pub fn on_remote_track(
        &self,
        participant_id: &ParticipantId,
        session_id: u64,
        track: RemoteTrack,
    ) -> Option<RemoteStream> {
        let created = match self.remote.entry(participant_id.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().session_id() == session_id {
                    entry.get().push(track);
                    None
                } else {
                    let stream = RemoteStream::new(participant_id.clone(), session_id, track);
                    entry.insert(stream.clone());
                    Some(stream)
                }
            }
            Entry::Vacant(entry) => {
                let stream = RemoteStream::new(participant_id.clone(), session_id, track);
                entry.insert(stream.clone());
                Some(stream)
            }
        };

        if created.is_some() {
            self.publish_remote();
        }
        created
    }

    pub fn remove_remote(&self, participant_id: &ParticipantId) -> Option<RemoteStream> {
        let removed = self.remote.remove(participant_id).map(|(_, stream)| stream);
        if removed.is_some() {
            self.publish_remote();
        }
        removed
    }

    pub fn clear_remote(&self) {
        self.remote.clear();
        self.publish_remote();
    }

    fn publish_remote(&self) {
        let mut list: Vec<RemoteParticipant> = self
            .remote
            .iter()
            .map(|entry| RemoteParticipant {
                participant_id: entry.key().clone(),
                stream: entry.value().clone(),
            })
            .collect();
        list.sort_by(|a, b| a.participant_id.cmp(&b.participant_id));
        self.remote_tx.send_replace(list);
    }
}
