use crate::config::ClientConfig;
use crate::error::SessionError;
use crate::media::{CaptureDevices, MediaPipeline, MediaTrack, TrackKind, TrackSource};
use crate::room::{RoomCommand, RoomEvent, RoomHandle};
use crate::session::{ConnectionRegistry, SessionContext};
use crate::signaling::{ChannelStatus, RelayOutput, SignalingChannel, SignalingOutput};
use crate::transport::{PeerConnectionState, TransportEvent, TransportFactory};
use nexo_core::{ParticipantId, RoomId, RoomTopology, SignalKind, SignalMessage};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 256;

const SUBSCRIBED_KINDS: [SignalKind; 9] = [
    SignalKind::JoinedRoom,
    SignalKind::ParticipantJoined,
    SignalKind::ParticipantLeft,
    SignalKind::CallOffer,
    SignalKind::CallAnswer,
    SignalKind::IceCandidate,
    SignalKind::RenegotiationRequest,
    SignalKind::RenegotiationGrant,
    SignalKind::ChatMessage,
];

/// Drives one local participant's membership in one room.
///
/// Relay messages, user actions and transport events are all funnelled into
/// a single loop, so room-level decisions never race each other.
pub struct RoomController {
    local_id: ParticipantId,
    room_id: RoomId,
    channel: Arc<dyn SignalingChannel>,
    output: Arc<dyn SignalingOutput>,
    capture: Arc<dyn CaptureDevices>,
    registry: ConnectionRegistry,
    media: Arc<MediaPipeline>,
    command_rx: mpsc::UnboundedReceiver<RoomCommand>,
    // Weak so the loop ends once every `RoomHandle` is gone.
    command_tx: mpsc::WeakUnboundedSender<RoomCommand>,
    transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    events: broadcast::Sender<RoomEvent>,
    topology_tx: watch::Sender<Option<RoomTopology>>,
    resume: Option<RoomTopology>,
    topology_ttl: Duration,
}

impl RoomController {
    pub fn new(
        local_id: ParticipantId,
        room_id: RoomId,
        channel: Arc<dyn SignalingChannel>,
        factory: Arc<dyn TransportFactory>,
        capture: Arc<dyn CaptureDevices>,
        config: &ClientConfig,
    ) -> (Self, RoomHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (topology_tx, topology_rx) = watch::channel(None);

        let output: Arc<dyn SignalingOutput> = Arc::new(RelayOutput::new(Arc::clone(&channel)));
        let media = Arc::new(MediaPipeline::new());

        let registry = ConnectionRegistry::new(SessionContext {
            local_id: local_id.clone(),
            factory,
            signaling: Arc::clone(&output),
            outbound_tracks: media.outbound_tracks(),
            event_tx: transport_tx,
            transport_config: config.transport.clone(),
            negotiation_timeout: config.negotiation_timeout(),
        });

        let handle = RoomHandle::new(
            local_id.clone(),
            room_id.clone(),
            command_tx.clone(),
            registry.clone(),
            Arc::clone(&media),
            events.clone(),
            topology_rx,
        );

        let controller = Self {
            local_id,
            room_id,
            channel,
            output,
            capture,
            registry,
            media,
            command_rx,
            command_tx: command_tx.downgrade(),
            transport_rx,
            events,
            topology_tx,
            resume: None,
            topology_ttl: config.topology_ttl(),
        };

        (controller, handle)
    }

    /// Seed the sessions from a snapshot saved before a restart.
    pub fn with_resume(mut self, topology: Option<RoomTopology>) -> Self {
        self.resume = topology;
        self
    }

    /// Event loop. Should be run through `tokio::spawn`.
    pub async fn run(mut self) {
        info!(
            "Room controller for {} in {} started",
            self.local_id, self.room_id
        );

        self.acquire_local_media().await;
        self.subscribe_signals();
        self.topology_tx
            .send_replace(Some(RoomTopology::new(self.room_id.clone(), self.local_id.clone())));
        self.announce();
        self.resume_sessions();

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if self.handle_command(cmd).await.is_break() {
                                break;
                            }
                        }
                        None => {
                            info!("All room handles dropped. Leaving room.");
                            self.end_call().await;
                            break;
                        }
                    }
                }

                evt = self.transport_rx.recv() => {
                    match evt {
                        Some(e) => self.handle_transport_event(e).await,
                        None => {
                            warn!("Transport channel closed unexpectedly");
                            break;
                        }
                    }
                }
            }
        }

        info!("Room controller finished");
    }

    async fn acquire_local_media(&mut self) {
        let camera = self.acquire(TrackKind::Video).await;
        let microphone = self.acquire(TrackKind::Audio).await;

        self.media
            .bind_local_source(&self.registry, |state| {
                state.set_camera(camera);
                state.set_microphone(microphone);
            })
            .await;
    }

    async fn acquire(&self, kind: TrackKind) -> Option<MediaTrack> {
        match self.capture.acquire(kind).await {
            Ok(track) => Some(track),
            Err(e) => {
                warn!("Continuing without {}: {}", kind, e);
                self.emit(RoomEvent::DeviceError(e));
                None
            }
        }
    }

    fn subscribe_signals(&self) {
        for kind in SUBSCRIBED_KINDS {
            let tx = self.command_tx.clone();
            self.channel.subscribe(
                kind,
                Arc::new(move |msg| {
                    if let Some(tx) = tx.upgrade() {
                        let _ = tx.send(RoomCommand::Signal(msg));
                    }
                }),
            );
        }

        let tx = self.command_tx.clone();
        self.channel.subscribe_status(Arc::new(move |status| {
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(RoomCommand::ChannelStatus(status));
            }
        }));
    }

    fn announce(&self) {
        info!("Announcing {} in room {}", self.local_id, self.room_id);
        let join = SignalMessage::JoinRoom {
            room_id: self.room_id.clone(),
            participant_id: self.local_id.clone(),
        };
        match self.channel.send(join) {
            Ok(()) => self.emit(RoomEvent::Joined(self.room_id.clone())),
            Err(e) => warn!("Failed to announce presence: {}", e),
        }
    }

    fn resume_sessions(&mut self) {
        let Some(snapshot) = self.resume.take() else {
            return;
        };
        if !snapshot.matches(&self.room_id, &self.local_id) {
            debug!("Discarding topology snapshot of another room");
            return;
        }
        if snapshot.is_expired(self.topology_ttl) {
            debug!("Discarding expired topology snapshot");
            return;
        }

        info!(
            "Resuming {} session(s) from topology snapshot",
            snapshot.len()
        );
        for participant in snapshot.participants {
            self.connect_to(participant);
        }
    }

    /// Make sure a session toward `participant` exists and has offered.
    fn connect_to(&self, participant: ParticipantId) {
        if participant == self.local_id {
            return;
        }
        self.update_topology(|t| t.insert(participant.clone()));
        let session = self.registry.get_or_create(&participant);
        if let Err(e) = session.initiate() {
            warn!("Failed to initiate toward {}: {}", participant, e);
        }
    }

    async fn handle_command(&mut self, cmd: RoomCommand) -> ControlFlow<()> {
        match cmd {
            RoomCommand::Signal(msg) => self.handle_signal(msg).await,

            RoomCommand::ChannelStatus(status) => {
                self.emit(RoomEvent::SignalingStatus(status));
                if status == ChannelStatus::Reconnected {
                    self.on_reconnected().await;
                }
            }

            RoomCommand::ToggleCamera(reply) => {
                let _ = reply.send(self.media.toggle(TrackSource::Camera).await);
            }

            RoomCommand::ToggleMic(reply) => {
                let _ = reply.send(self.media.toggle(TrackSource::Microphone).await);
            }

            RoomCommand::StartScreenShare(reply) => {
                let res = match self.capture.acquire_display().await {
                    Ok(screen) => {
                        self.media.start_screen_share(&self.registry, screen).await;
                        Ok(())
                    }
                    Err(e) => {
                        warn!("Screen share unavailable: {}", e);
                        self.emit(RoomEvent::DeviceError(e.clone()));
                        Err(SessionError::Device(e))
                    }
                };
                let _ = reply.send(res);
            }

            RoomCommand::StopScreenShare(reply) => {
                let _ = reply.send(self.media.stop_screen_share(&self.registry).await);
            }

            RoomCommand::SendChat { message, reply } => {
                let res = self.channel.send(SignalMessage::ChatMessage {
                    message,
                    from: Some(self.local_id.clone()),
                });
                let _ = reply.send(res);
            }

            RoomCommand::EndCall(reply) => {
                self.end_call().await;
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    async fn handle_signal(&mut self, msg: SignalMessage) {
        match msg {
            SignalMessage::JoinedRoom {
                room_id,
                participants,
            } => {
                if room_id != self.room_id {
                    debug!("Ignoring joined-room for {}", room_id);
                    return;
                }
                info!(
                    "Joined {} with {} existing participant(s)",
                    room_id,
                    participants.len()
                );
                for participant in participants {
                    self.connect_to(participant);
                }
            }

            SignalMessage::ParticipantJoined { participant_id } => {
                if participant_id == self.local_id {
                    return;
                }
                info!("Participant {} joined", participant_id);

                // A rejoin means the remote side starts from scratch.
                if self.registry.contains(&participant_id) {
                    info!("{} rejoined, dropping the previous session", participant_id);
                    self.dispose(&participant_id).await;
                }
                self.emit(RoomEvent::ParticipantJoined(participant_id.clone()));
                self.connect_to(participant_id);
            }

            SignalMessage::ParticipantLeft { participant_id } => {
                info!("Participant {} left", participant_id);
                self.update_topology(|t| t.remove(&participant_id));
                self.dispose(&participant_id).await;
                self.emit(RoomEvent::ParticipantLeft(participant_id));
            }

            SignalMessage::CallOffer {
                from, sdp_offer, ..
            } => {
                if from == self.local_id {
                    return;
                }
                self.update_topology(|t| t.insert(from.clone()));
                let session = self.registry.get_or_create(&from);
                if let Err(e) = session.deliver_offer(sdp_offer) {
                    warn!("Failed to deliver offer from {}: {}", from, e);
                }
            }

            SignalMessage::CallAnswer {
                from, sdp_answer, ..
            } => match self.registry.get(&from) {
                Some(session) => {
                    if let Err(e) = session.deliver_answer(sdp_answer) {
                        warn!("Failed to deliver answer from {}: {}", from, e);
                    }
                }
                None => warn!("Answer from {} without a session", from),
            },

            SignalMessage::IceCandidate {
                from, candidate, ..
            } => match self.registry.get(&from) {
                Some(session) => {
                    if let Err(e) = session.deliver_candidate(candidate) {
                        debug!("Dropping candidate from {}: {}", from, e);
                    }
                }
                None => debug!("Dropping candidate from {} without a session", from),
            },

            SignalMessage::RenegotiationRequest { from, .. } => match self.registry.get(&from) {
                Some(session) => {
                    if let Err(e) = session.deliver_renegotiation_request() {
                        debug!("Dropping renegotiation request from {}: {}", from, e);
                    }
                }
                None => warn!("Renegotiation request from {} without a session", from),
            },

            SignalMessage::RenegotiationGrant { from, .. } => match self.registry.get(&from) {
                Some(session) => {
                    if let Err(e) = session.deliver_renegotiation_grant() {
                        debug!("Dropping renegotiation grant from {}: {}", from, e);
                    }
                }
                None => warn!("Renegotiation grant from {} without a session", from),
            },

            SignalMessage::ChatMessage { message, from } => {
                if from.as_ref() == Some(&self.local_id) {
                    return;
                }
                self.emit(RoomEvent::Chat { from, message });
            }

            SignalMessage::JoinRoom { .. } | SignalMessage::LeaveRoom { .. } => {
                debug!("Ignoring client-to-relay message");
            }
        }
    }

    /// The relay lost our membership: start over with everyone we knew.
    async fn on_reconnected(&mut self) {
        info!("Relay reconnected, re-announcing presence");
        for participant in self.registry.participants() {
            self.dispose(&participant).await;
        }
        self.announce();

        let known = self
            .topology_tx
            .borrow()
            .as_ref()
            .map(|t| t.participants.clone())
            .unwrap_or_default();
        for participant in known {
            self.connect_to(participant);
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        let participant_id = event.participant_id().clone();
        if !self.registry.is_current(&participant_id, event.session_id()) {
            debug!(
                "Dropping event of stale session {} for {}",
                event.session_id(),
                participant_id
            );
            return;
        }

        match event {
            TransportEvent::CandidateGenerated { candidate, .. } => {
                self.output.send_ice(participant_id, candidate).await;
            }

            TransportEvent::RemoteTrack {
                session_id, track, ..
            } => {
                if let Some(stream) = self.media.on_remote_track(&participant_id, session_id, track) {
                    info!("Remote stream from {} available", participant_id);
                    self.emit(RoomEvent::RemoteStreamAdded {
                        participant_id,
                        stream,
                    });
                }
            }

            TransportEvent::StateChanged {
                session_id, state, ..
            } => match state {
                PeerConnectionState::Failed => {
                    self.fail_session(&participant_id, session_id, "connection failed")
                        .await;
                }
                other => debug!("Connection to {} is {:?}", participant_id, other),
            },

            TransportEvent::NegotiationTimedOut { session_id, .. } => {
                self.fail_session(&participant_id, session_id, "negotiation timed out")
                    .await;
            }

            TransportEvent::SetupFailed { session_id, .. } => {
                self.fail_session(&participant_id, session_id, "transport setup failed")
                    .await;
            }
        }
    }

    async fn fail_session(&mut self, participant_id: &ParticipantId, session_id: u64, reason: &str) {
        warn!("Session with {} failed: {}", participant_id, reason);
        if self.registry.remove_session(participant_id, session_id).await {
            self.drop_remote_stream(participant_id);
            self.emit(RoomEvent::SessionFailed {
                participant_id: participant_id.clone(),
                reason: reason.to_owned(),
            });
        }
    }

    async fn dispose(&mut self, participant_id: &ParticipantId) {
        self.registry.remove(participant_id).await;
        self.drop_remote_stream(participant_id);
    }

    fn drop_remote_stream(&self, participant_id: &ParticipantId) {
        if self.media.remove_remote(participant_id).is_some() {
            self.emit(RoomEvent::RemoteStreamRemoved(participant_id.clone()));
        }
    }

    async fn end_call(&mut self) {
        info!("Leaving room {}", self.room_id);
        self.media.stop_all().await;
        self.registry.clear().await;
        self.media.clear_remote();
        self.topology_tx.send_replace(None);

        let leave = SignalMessage::LeaveRoom {
            room_id: self.room_id.clone(),
            participant_id: self.local_id.clone(),
        };
        if let Err(e) = self.channel.send(leave) {
            warn!("Failed to announce departure: {}", e);
        }
        self.emit(RoomEvent::Left(self.room_id.clone()));
    }

    fn update_topology(&self, update: impl FnOnce(&mut RoomTopology) -> bool) {
        self.topology_tx.send_if_modified(|topology| match topology {
            Some(topology) => update(topology),
            None => false,
        });
    }

    fn emit(&self, event: RoomEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
