use crate::error::{SessionError, SessionResult};
use crate::media::{MediaTrack, TrackKind};
use crate::session::{
    SessionCommand, SessionHandle, SessionShared, SessionSnapshot, SignalingState,
    local_offer_wins,
};
use crate::signaling::SignalingOutput;
use crate::transport::{PeerTransport, TrackSwap, TransportConfig, TransportEvent, TransportFactory};
use nexo_core::{IceCandidatePayload, ParticipantId, SdpKind, SessionDescription};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::time::{Instant, sleep_until};
use anyhow::{Result, anyhow};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const TRANSITION_CAPACITY: usize = 64;

/// Everything a peer session needs from its surroundings.
#[derive(Clone)]
pub struct SessionContext {
    pub local_id: ParticipantId,
    pub factory: Arc<dyn TransportFactory>,
    pub signaling: Arc<dyn SignalingOutput>,
    /// Current outbound set; read once when the session starts.
    pub outbound_tracks: watch::Receiver<Vec<MediaTrack>>,
    pub event_tx: mpsc::UnboundedSender<TransportEvent>,
    pub transport_config: TransportConfig,
    pub negotiation_timeout: Option<Duration>,
}

/// Spawn the actor for one remote participant and return its handle.
pub(crate) fn spawn(
    context: Arc<SessionContext>,
    participant_id: ParticipantId,
    session_id: u64,
) -> SessionHandle {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(SignalingState::Idle);
    let (transitions, _) = broadcast::channel(TRANSITION_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(run_session(
        context,
        participant_id.clone(),
        session_id,
        cmd_rx,
        shutdown_rx,
        state_tx,
        transitions.clone(),
    ));

    SessionHandle::new(SessionShared {
        participant_id,
        session_id,
        cmd_tx,
        state_rx,
        transitions,
        shutdown_tx,
        task: Mutex::new(Some(task)),
    })
}

async fn run_session(
    context: Arc<SessionContext>,
    participant_id: ParticipantId,
    session_id: u64,
    cmd_rx: mpsc::UnboundedReceiver<SessionCommand>,
    mut shutdown_rx: watch::Receiver<bool>,
    state_tx: watch::Sender<SignalingState>,
    transitions: broadcast::Sender<SignalingState>,
) {
    let created = tokio::select! {
        biased;
        _ = shutdown_rx.changed() => {
            state_tx.send_replace(SignalingState::Closed);
            return;
        }
        res = context.factory.create(
            participant_id.clone(),
            session_id,
            context.transport_config.clone(),
            context.event_tx.clone(),
        ) => res,
    };

    let transport = match created {
        Ok(transport) => transport,
        Err(e) => {
            error!(
                "Failed to create transport for {} (session {}): {:?}",
                participant_id, session_id, e
            );
            let _ = context.event_tx.send(TransportEvent::SetupFailed {
                participant_id,
                session_id,
            });
            state_tx.send_replace(SignalingState::Closed);
            let _ = transitions.send(SignalingState::Closed);
            return;
        }
    };

    let session = PeerSession {
        participant_id,
        session_id,
        local_id: context.local_id.clone(),
        transport,
        signaling: Arc::clone(&context.signaling),
        event_tx: context.event_tx.clone(),
        state: SignalingState::Idle,
        state_tx,
        transitions,
        has_remote_description: false,
        pending_candidates: VecDeque::new(),
        bound: BTreeMap::new(),
        local_tiebreaker: None,
        offer_origin: SignalingState::Idle,
        renegotiation_pending: false,
        awaiting_grant: false,
        grant_owed: false,
        granted: false,
        negotiation_timeout: context.negotiation_timeout,
        deadline: None,
    };

    let initial = context.outbound_tracks.borrow().clone();
    session.run(initial, cmd_rx, shutdown_rx).await;
}

struct PeerSession {
    participant_id: ParticipantId,
    session_id: u64,
    local_id: ParticipantId,
    transport: Arc<dyn PeerTransport>,
    signaling: Arc<dyn SignalingOutput>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    state: SignalingState,
    state_tx: watch::Sender<SignalingState>,
    transitions: broadcast::Sender<SignalingState>,
    has_remote_description: bool,
    pending_candidates: VecDeque<IceCandidatePayload>,
    bound: BTreeMap<TrackKind, MediaTrack>,
    local_tiebreaker: Option<u64>,
    // State to fall back to when the local offer is rolled back.
    offer_origin: SignalingState,
    renegotiation_pending: bool,
    // Renegotiation turn: only one side may offer on an established
    // connection at a time, since a renegotiation offer cannot be rolled back.
    awaiting_grant: bool,
    grant_owed: bool,
    granted: bool,
    negotiation_timeout: Option<Duration>,
    deadline: Option<Instant>,
}

impl PeerSession {
    async fn run(
        mut self,
        initial: Vec<MediaTrack>,
        mut cmd_rx: mpsc::UnboundedReceiver<SessionCommand>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        info!(
            "Peer session {} with {} started",
            self.session_id, self.participant_id
        );

        let cancelled = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => true,
            res = self.bind_tracks(initial) => {
                if let Err(e) = res {
                    warn!("Initial media binding for {} failed: {}", self.participant_id, e);
                }
                false
            }
        };

        if !cancelled {
            loop {
                let deadline = self.deadline;
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    cmd = cmd_rx.recv() => {
                        let Some(cmd) = cmd else {
                            debug!("Command channel for {} closed", self.participant_id);
                            break;
                        };
                        let finished = tokio::select! {
                            biased;
                            _ = shutdown_rx.changed() => false,
                            _ = self.handle(cmd) => true,
                        };
                        if !finished {
                            debug!("Discarding in-flight step for {}", self.participant_id);
                            break;
                        }
                    }
                    _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                        self.on_negotiation_deadline();
                    }
                }
            }
        }

        self.shutdown().await;
    }

    async fn handle(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Initiate => self.initiate().await,
            SessionCommand::RemoteOffer(offer) => self.on_remote_offer(offer).await,
            SessionCommand::RemoteAnswer(answer) => self.on_remote_answer(answer).await,
            SessionCommand::RemoteCandidate(candidate) => self.on_remote_candidate(candidate).await,
            SessionCommand::BindTracks { tracks, reply } => {
                let res = self.bind_tracks(tracks).await;
                let _ = reply.send(res);
            }
            SessionCommand::RenegotiationRequested => self.on_renegotiation_request().await,
            SessionCommand::RenegotiationGranted => self.on_renegotiation_grant().await,
            SessionCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    async fn initiate(&mut self) {
        match self.state {
            SignalingState::Idle => self.send_offer().await,
            other => debug!(
                "Ignoring initiate toward {} in state {}",
                self.participant_id, other
            ),
        }
    }

    async fn send_offer(&mut self) {
        let sdp = match self.transport.create_offer().await {
            Ok(sdp) => sdp,
            Err(e) => {
                error!("Failed to create offer for {}: {:?}", self.participant_id, e);
                return;
            }
        };

        let tiebreaker = Uuid::new_v4().as_u64_pair().0;
        self.local_tiebreaker = Some(tiebreaker);
        self.offer_origin = self.state;
        self.set_state(SignalingState::HaveLocalOffer);

        self.signaling
            .send_offer(
                self.participant_id.clone(),
                SessionDescription::offer(sdp, tiebreaker),
            )
            .await;
    }

    async fn on_remote_offer(&mut self, offer: SessionDescription) {
        if offer.kind != SdpKind::Offer {
            self.reject(format!("expected an offer, got {:?}", offer.kind));
            return;
        }
        // The turn we handed out has been used.
        self.granted = false;

        if self.state == SignalingState::HaveLocalOffer {
            let local = self.local_tiebreaker.unwrap_or_default();
            if local_offer_wins(local, &self.local_id, offer.tiebreaker, &self.participant_id) {
                info!(
                    "Offer collision with {}: keeping local offer",
                    self.participant_id
                );
                return;
            }

            info!(
                "Offer collision with {}: rolling back local offer",
                self.participant_id
            );
            if let Err(e) = self.transport.rollback().await {
                self.reject(format!("rollback failed: {e:#}"));
                return;
            }
            self.local_tiebreaker = None;
            // A rolled back renegotiation still has changes to announce.
            if self.offer_origin == SignalingState::Stable {
                self.renegotiation_pending = true;
            }
            self.set_state(self.offer_origin);
        }

        self.accept_offer(offer).await;
    }

    async fn accept_offer(&mut self, offer: SessionDescription) {
        if let Err(e) = self.transport.set_remote_description(&offer).await {
            self.reject(format!("remote offer rejected: {e:#}"));
            return;
        }
        self.has_remote_description = true;
        self.set_state(SignalingState::HaveRemoteOffer);
        self.flush_candidates().await;

        // The applied offer stays; a repeated offer retries the answer.
        let sdp = match self.transport.create_answer().await {
            Ok(sdp) => sdp,
            Err(e) => {
                self.reject(format!("answer could not be created: {e:#}"));
                return;
            }
        };
        self.set_state(SignalingState::Stable);
        self.signaling
            .send_answer(self.participant_id.clone(), SessionDescription::answer(sdp))
            .await;

        self.on_stable().await;
    }

    async fn on_remote_answer(&mut self, answer: SessionDescription) {
        if self.state != SignalingState::HaveLocalOffer {
            self.reject(format!("unexpected answer in state {}", self.state));
            return;
        }
        if answer.kind != SdpKind::Answer {
            self.reject(format!("expected an answer, got {:?}", answer.kind));
            return;
        }

        if let Err(e) = self.transport.set_remote_description(&answer).await {
            self.reject(format!("remote answer rejected: {e:#}"));
            return;
        }
        self.has_remote_description = true;
        self.local_tiebreaker = None;
        self.set_state(SignalingState::Stable);
        self.flush_candidates().await;

        self.on_stable().await;
    }

    async fn on_remote_candidate(&mut self, candidate: IceCandidatePayload) {
        if !self.has_remote_description {
            self.pending_candidates.push_back(candidate);
            debug!(
                "Queued ICE candidate from {} ({} pending)",
                self.participant_id,
                self.pending_candidates.len()
            );
            return;
        }
        self.apply_candidate(candidate).await;
    }

    async fn flush_candidates(&mut self) {
        if !self.pending_candidates.is_empty() {
            debug!(
                "Applying {} queued candidate(s) from {}",
                self.pending_candidates.len(),
                self.participant_id
            );
        }
        while let Some(candidate) = self.pending_candidates.pop_front() {
            self.apply_candidate(candidate).await;
        }
    }

    async fn apply_candidate(&mut self, candidate: IceCandidatePayload) {
        if let Err(e) = self.transport.add_ice_candidate(&candidate).await {
            let err = SessionError::IceCandidate {
                participant: self.participant_id.clone(),
                reason: format!("{e:#}"),
            };
            warn!("{}", err);
        }
    }

    /// Align the outbound senders with `tracks`, at most one per kind.
    ///
    /// Each kind is handled on its own: a failing kind keeps its previous
    /// sender and the others still move on. All failures are reported
    /// together.
    async fn bind_tracks(&mut self, tracks: Vec<MediaTrack>) -> SessionResult<()> {
        if self.state == SignalingState::Closed {
            return Err(SessionError::SessionClosed(self.participant_id.clone()));
        }

        let mut desired: BTreeMap<TrackKind, MediaTrack> =
            tracks.into_iter().map(|t| (t.kind(), t)).collect();
        let mut needs_offer = false;
        let mut failures = Vec::new();

        for kind in [TrackKind::Audio, TrackKind::Video] {
            match self.bind_kind(kind, desired.remove(&kind)).await {
                Ok(renegotiate) => needs_offer |= renegotiate,
                Err(e) => {
                    warn!(
                        "Binding {} for {} failed: {:#}",
                        kind, self.participant_id, e
                    );
                    failures.push(format!("{kind}: {e:#}"));
                }
            }
        }

        if needs_offer {
            self.request_renegotiation().await;
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(SessionError::Transport(anyhow!(
                "track binding for {} failed ({})",
                self.participant_id,
                failures.join("; ")
            )))
        }
    }

    /// Move the `kind` sender to `next`. Returns whether an offer is needed.
    async fn bind_kind(&mut self, kind: TrackKind, next: Option<MediaTrack>) -> Result<bool> {
        let current = self.bound.get(&kind).cloned();
        match (current, next) {
            (None, None) => Ok(false),
            (Some(current), None) => {
                self.transport.remove_track(&current).await?;
                self.bound.remove(&kind);
                Ok(true)
            }
            (None, Some(track)) => {
                self.transport.add_track(&track).await?;
                self.bound.insert(kind, track);
                Ok(true)
            }
            (Some(current), Some(track)) if current == track => Ok(false),
            (Some(current), Some(track)) => {
                let swap = self.transport.replace_track(&current, &track).await?;
                debug!(
                    "Replaced {} sender for {}: {} -> {} ({:?})",
                    kind,
                    self.participant_id,
                    current.id(),
                    track.id(),
                    swap
                );
                self.bound.insert(kind, track);
                Ok(swap == TrackSwap::RequiresRenegotiation)
            }
        }
    }

    /// The side with the smaller id offers freely on an established
    /// connection; the other asks for a turn first.
    fn leads_renegotiation(&self) -> bool {
        self.local_id < self.participant_id
    }

    async fn request_renegotiation(&mut self) {
        match self.state {
            SignalingState::Stable if self.leads_renegotiation() => {
                if self.granted {
                    debug!(
                        "Holding renegotiation with {} until its offer arrives",
                        self.participant_id
                    );
                    self.renegotiation_pending = true;
                    return;
                }
                info!("Renegotiating with {}", self.participant_id);
                self.send_offer().await;
            }
            SignalingState::Stable => {
                if self.awaiting_grant {
                    return;
                }
                info!("Asking {} for a renegotiation turn", self.participant_id);
                self.awaiting_grant = true;
                self.signaling
                    .send_renegotiation_request(self.participant_id.clone())
                    .await;
            }
            SignalingState::HaveLocalOffer | SignalingState::HaveRemoteOffer => {
                self.renegotiation_pending = true;
            }
            // The first offer carries whatever is bound by then.
            SignalingState::Idle | SignalingState::Closed => {}
        }
    }

    async fn on_renegotiation_request(&mut self) {
        if !self.leads_renegotiation() {
            self.reject("renegotiation request from the leading side".to_owned());
            return;
        }
        if self.state == SignalingState::Stable {
            self.grant_turn().await;
        } else {
            debug!(
                "Renegotiation request from {} deferred until stable",
                self.participant_id
            );
            self.grant_owed = true;
        }
    }

    async fn grant_turn(&mut self) {
        self.grant_owed = false;
        self.granted = true;
        debug!("Granting renegotiation turn to {}", self.participant_id);
        self.signaling
            .send_renegotiation_grant(self.participant_id.clone())
            .await;
    }

    async fn on_renegotiation_grant(&mut self) {
        self.awaiting_grant = false;
        if self.state == SignalingState::Stable {
            info!("Renegotiating with {}", self.participant_id);
            self.send_offer().await;
        } else {
            // Ask again once the current exchange is over.
            self.renegotiation_pending = true;
        }
    }

    async fn on_stable(&mut self) {
        if self.grant_owed {
            self.grant_turn().await;
        }
        if self.renegotiation_pending {
            self.renegotiation_pending = false;
            self.request_renegotiation().await;
        }
    }

    fn on_negotiation_deadline(&mut self) {
        self.deadline = None;
        if !self.state.is_negotiating() {
            return;
        }
        warn!(
            "Negotiation with {} timed out in state {}",
            self.participant_id, self.state
        );
        let _ = self.event_tx.send(TransportEvent::NegotiationTimedOut {
            participant_id: self.participant_id.clone(),
            session_id: self.session_id,
        });
    }

    fn reject(&self, reason: String) {
        let err = SessionError::NegotiationState {
            participant: self.participant_id.clone(),
            reason,
        };
        warn!("{} (state stays {})", err, self.state);
    }

    fn set_state(&mut self, next: SignalingState) {
        if self.state == next {
            return;
        }
        debug!(
            "Session with {}: {} -> {}",
            self.participant_id, self.state, next
        );
        self.state = next;
        self.deadline = match self.negotiation_timeout {
            Some(timeout) if next.is_negotiating() => Some(Instant::now() + timeout),
            _ => None,
        };
        self.state_tx.send_replace(next);
        let _ = self.transitions.send(next);
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            bound_tracks: self.bound.clone(),
            queued_candidates: self.pending_candidates.len(),
            has_remote_description: self.has_remote_description,
            renegotiation_pending: self.renegotiation_pending,
            awaiting_grant: self.awaiting_grant,
        }
    }

    async fn shutdown(&mut self) {
        self.pending_candidates.clear();
        if let Err(e) = self.transport.close().await {
            warn!(
                "Failed to close transport for {}: {:?}",
                self.participant_id, e
            );
        }
        self.set_state(SignalingState::Closed);
        info!(
            "Peer session {} with {} closed",
            self.session_id, self.participant_id
        );
    }
}
