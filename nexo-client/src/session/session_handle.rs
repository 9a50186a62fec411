use crate::error::{SessionError, SessionResult};
use crate::media::MediaTrack;
use crate::session::{SessionCommand, SessionSnapshot, SignalingState};
use nexo_core::{IceCandidatePayload, ParticipantId, SessionDescription};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::warn;

pub(crate) struct SessionShared {
    pub(crate) participant_id: ParticipantId,
    pub(crate) session_id: u64,
    pub(crate) cmd_tx: mpsc::UnboundedSender<SessionCommand>,
    pub(crate) state_rx: watch::Receiver<SignalingState>,
    pub(crate) transitions: broadcast::Sender<SignalingState>,
    pub(crate) shutdown_tx: watch::Sender<bool>,
    pub(crate) task: Mutex<Option<JoinHandle<()>>>,
}

/// Cheap, cloneable reference to a live peer session.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<SessionShared>,
}

impl SessionHandle {
    pub(crate) fn new(shared: SessionShared) -> Self {
        Self {
            inner: Arc::new(shared),
        }
    }

    pub fn participant_id(&self) -> &ParticipantId {
        &self.inner.participant_id
    }

    pub fn session_id(&self) -> u64 {
        self.inner.session_id
    }

    pub fn state(&self) -> SignalingState {
        *self.inner.state_rx.borrow()
    }

    /// Every transition from now on, in order.
    pub fn subscribe_state(&self) -> broadcast::Receiver<SignalingState> {
        self.inner.transitions.subscribe()
    }

    /// Both handles point at the same session object.
    pub fn same_session(&self, other: &SessionHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_closed(&self) -> bool {
        self.state() == SignalingState::Closed || self.inner.cmd_tx.is_closed()
    }

    pub fn initiate(&self) -> SessionResult<()> {
        self.send(SessionCommand::Initiate)
    }

    pub fn deliver_offer(&self, offer: SessionDescription) -> SessionResult<()> {
        self.send(SessionCommand::RemoteOffer(offer))
    }

    pub fn deliver_answer(&self, answer: SessionDescription) -> SessionResult<()> {
        self.send(SessionCommand::RemoteAnswer(answer))
    }

    pub fn deliver_candidate(&self, candidate: IceCandidatePayload) -> SessionResult<()> {
        self.send(SessionCommand::RemoteCandidate(candidate))
    }

    pub fn deliver_renegotiation_request(&self) -> SessionResult<()> {
        self.send(SessionCommand::RenegotiationRequested)
    }

    pub fn deliver_renegotiation_grant(&self) -> SessionResult<()> {
        self.send(SessionCommand::RenegotiationGranted)
    }

    /// Resolves once the session has applied the new binding.
    pub async fn bind_tracks(&self, tracks: Vec<MediaTrack>) -> SessionResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::BindTracks { tracks, reply })?;
        rx.await
            .map_err(|_| SessionError::SessionClosed(self.participant_id().clone()))?
    }

    pub async fn snapshot(&self) -> SessionResult<SessionSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Snapshot(reply))?;
        rx.await
            .map_err(|_| SessionError::SessionClosed(self.participant_id().clone()))
    }

    /// Wait until the session reports `target`; `false` on timeout.
    pub async fn wait_for_state(&self, target: SignalingState, timeout: Duration) -> bool {
        let mut rx = self.inner.state_rx.clone();
        matches!(
            tokio::time::timeout(timeout, rx.wait_for(|s| *s == target)).await,
            Ok(Ok(_))
        )
    }

    /// Stop the actor, discarding whatever step is in flight, and wait for
    /// the transport to be closed.
    pub(crate) async fn close(&self) {
        let _ = self.inner.shutdown_tx.send(true);
        let task = self.inner.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(
                    "Peer session task for {} ended abnormally: {}",
                    self.participant_id(),
                    e
                );
            }
        }
    }

    fn send(&self, cmd: SessionCommand) -> SessionResult<()> {
        self.inner
            .cmd_tx
            .send(cmd)
            .map_err(|_| SessionError::SessionClosed(self.participant_id().clone()))
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("participant_id", self.participant_id())
            .field("session_id", &self.session_id())
            .field("state", &self.state())
            .finish()
    }
}
