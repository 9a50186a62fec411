use crate::error::{SessionError, SessionResult};
use crate::media::{LocalStream, MediaPipeline, RemoteParticipant};
use crate::room::{RoomCommand, RoomEvent};
use crate::session::{ConnectionRegistry, SessionHandle};
use nexo_core::{ParticipantId, RoomId, RoomTopology};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

/// Control surface of a running [`RoomController`](crate::RoomController).
///
/// Cloneable. The controller leaves the room once every handle is dropped.
#[derive(Clone)]
pub struct RoomHandle {
    local_id: ParticipantId,
    room_id: RoomId,
    command_tx: mpsc::UnboundedSender<RoomCommand>,
    registry: ConnectionRegistry,
    media: Arc<MediaPipeline>,
    events: broadcast::Sender<RoomEvent>,
    topology_rx: watch::Receiver<Option<RoomTopology>>,
}

impl RoomHandle {
    pub(crate) fn new(
        local_id: ParticipantId,
        room_id: RoomId,
        command_tx: mpsc::UnboundedSender<RoomCommand>,
        registry: ConnectionRegistry,
        media: Arc<MediaPipeline>,
        events: broadcast::Sender<RoomEvent>,
        topology_rx: watch::Receiver<Option<RoomTopology>>,
    ) -> Self {
        Self {
            local_id,
            room_id,
            command_tx,
            registry,
            media,
            events,
            topology_rx,
        }
    }

    pub fn local_id(&self) -> &ParticipantId {
        &self.local_id
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// New camera flag, `None` without a camera.
    pub async fn toggle_camera(&self) -> SessionResult<Option<bool>> {
        self.request(RoomCommand::ToggleCamera).await
    }

    pub async fn toggle_mic(&self) -> SessionResult<Option<bool>> {
        self.request(RoomCommand::ToggleMic).await
    }

    /// Resolves after every session sends the screen instead of the camera.
    pub async fn start_screen_share(&self) -> SessionResult<()> {
        self.request(RoomCommand::StartScreenShare).await?
    }

    /// `false` when nothing was being shared.
    pub async fn stop_screen_share(&self) -> SessionResult<bool> {
        self.request(RoomCommand::StopScreenShare).await
    }

    pub async fn send_chat(&self, message: impl Into<String>) -> SessionResult<()> {
        let message = message.into();
        self.request(|reply| RoomCommand::SendChat { message, reply })
            .await?
    }

    pub async fn end_call(&self) -> SessionResult<()> {
        self.request(RoomCommand::EndCall).await
    }

    pub fn local_stream(&self) -> watch::Receiver<LocalStream> {
        self.media.local_stream()
    }

    pub fn remote_streams(&self) -> watch::Receiver<Vec<RemoteParticipant>> {
        self.media.remote_streams()
    }

    /// `None` before joining and after leaving.
    pub fn topology(&self) -> watch::Receiver<Option<RoomTopology>> {
        self.topology_rx.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.events.subscribe()
    }

    pub fn session(&self, participant_id: &ParticipantId) -> Option<SessionHandle> {
        self.registry.get(participant_id)
    }

    pub fn participants(&self) -> Vec<ParticipantId> {
        self.registry.participants()
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        !self.command_tx.is_closed()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> SessionResult<T> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(make(reply))
            .map_err(|_| SessionError::ControllerStopped)?;
        rx.await.map_err(|_| SessionError::ControllerStopped)
    }
}
