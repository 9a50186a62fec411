use crate::media::{MIME_TYPE_OPUS, MediaTrack, RemoteTrack, TrackKind};
use crate::transport::{
    PeerConnectionState, PeerTransport, TrackSwap, TransportConfig, TransportEvent,
    TransportFactory,
};
use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use nexo_core::{IceCandidatePayload, ParticipantId, SdpKind, SessionDescription};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{API, APIBuilder};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

struct Sender {
    track: MediaTrack,
    rtp: Arc<RTCRtpSender>,
}

/// webrtc-rs peer connection for one remote participant.
///
/// webrtc-rs cannot roll back a local offer, so [`rollback`] swaps in a
/// fresh `RTCPeerConnection` instead. That is only possible before the first
/// exchange completed; a live connection refuses.
///
/// [`rollback`]: PeerTransport::rollback
pub struct ConnectionWrapper {
    pub participant_id: ParticipantId,
    session_id: u64,
    stream_id: String,
    api: API,
    rtc_config: RTCConfiguration,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    peer_connection: RwLock<Arc<RTCPeerConnection>>,
    // Callbacks of a replaced connection compare against this and go quiet.
    generation: Arc<AtomicU64>,
    // Outbound senders keyed by the local track id.
    senders: Mutex<HashMap<String, Sender>>,
}

impl ConnectionWrapper {
    /// Build the peer connection and wire its callbacks into `event_tx`.
    pub async fn new(
        participant_id: ParticipantId,
        session_id: u64,
        stream_id: String,
        config: TransportConfig,
        event_tx: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Self> {
        let mut m = MediaEngine::default();
        m.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut m)?;

        let api = APIBuilder::new()
            .with_media_engine(m)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: config
                .ice_servers
                .into_iter()
                .map(|server| RTCIceServer {
                    urls: server.urls,
                    username: server.username.unwrap_or_default(),
                    credential: server.credential.unwrap_or_default(),
                })
                .collect(),
            ..Default::default()
        };

        let generation = Arc::new(AtomicU64::new(0));
        let peer_connection = Arc::new(api.new_peer_connection(rtc_config.clone()).await?);

        let wrapper = Self {
            participant_id,
            session_id,
            stream_id,
            api,
            rtc_config,
            event_tx,
            peer_connection: RwLock::new(Arc::clone(&peer_connection)),
            generation,
            senders: Mutex::new(HashMap::new()),
        };
        wrapper.install_callbacks(&peer_connection, 0);
        Ok(wrapper)
    }

    /// The connection currently in use.
    pub async fn peer_connection(&self) -> Arc<RTCPeerConnection> {
        Arc::clone(&*self.peer_connection.read().await)
    }

    fn install_callbacks(&self, peer_connection: &RTCPeerConnection, generation: u64) {
        let session_id = self.session_id;

        let state_tx = self.event_tx.clone();
        let state_gen = Arc::clone(&self.generation);
        let uid_state = self.participant_id.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let tx = state_tx.clone();
                let current = Arc::clone(&state_gen);
                let uid = uid_state.clone();

                Box::pin(async move {
                    if current.load(Ordering::SeqCst) != generation {
                        return;
                    }
                    info!("Peer connection state changed for {}: {:?}", uid, s);
                    let state = match s {
                        RTCPeerConnectionState::New => PeerConnectionState::New,
                        RTCPeerConnectionState::Connecting => PeerConnectionState::Connecting,
                        RTCPeerConnectionState::Connected => PeerConnectionState::Connected,
                        RTCPeerConnectionState::Disconnected => PeerConnectionState::Disconnected,
                        RTCPeerConnectionState::Failed => PeerConnectionState::Failed,
                        RTCPeerConnectionState::Closed => PeerConnectionState::Closed,
                        RTCPeerConnectionState::Unspecified => return,
                    };
                    let _ = tx.send(TransportEvent::StateChanged {
                        participant_id: uid,
                        session_id,
                        state,
                    });
                })
            },
        ));

        // Trickle ICE
        let ice_tx = self.event_tx.clone();
        let ice_gen = Arc::clone(&self.generation);
        let uid_ice = self.participant_id.clone();
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let tx = ice_tx.clone();
            let current = Arc::clone(&ice_gen);
            let uid = uid_ice.clone();

            Box::pin(async move {
                let Some(candidate) = c else { return };
                if current.load(Ordering::SeqCst) != generation {
                    return;
                }
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                let _ = tx.send(TransportEvent::CandidateGenerated {
                    participant_id: uid,
                    session_id,
                    candidate: IceCandidatePayload {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_m_line_index: init.sdp_mline_index,
                    },
                });
            })
        }));

        let track_tx = self.event_tx.clone();
        let track_gen = Arc::clone(&self.generation);
        let uid_track = self.participant_id.clone();
        peer_connection.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let tx = track_tx.clone();
                let current = Arc::clone(&track_gen);
                let uid = uid_track.clone();

                Box::pin(async move {
                    if current.load(Ordering::SeqCst) != generation {
                        return;
                    }
                    let kind = match track.kind() {
                        RTPCodecType::Audio => TrackKind::Audio,
                        RTPCodecType::Video => TrackKind::Video,
                        other => {
                            debug!("Ignoring remote track of kind {:?} from {}", other, uid);
                            return;
                        }
                    };
                    let _ = tx.send(TransportEvent::RemoteTrack {
                        participant_id: uid,
                        session_id,
                        track: RemoteTrack {
                            track_id: track.id(),
                            stream_id: track.stream_id(),
                            kind,
                        },
                    });
                })
            },
        ));
    }

    fn local_track(&self, track: &MediaTrack) -> Arc<dyn TrackLocal + Send + Sync> {
        let (clock_rate, channels) = match track.kind() {
            TrackKind::Audio => (48_000, 2),
            TrackKind::Video => (90_000, 0),
        };
        let sdp_fmtp_line = if track.codec() == MIME_TYPE_OPUS {
            "minptime=10;useinbandfec=1".to_owned()
        } else {
            String::new()
        };

        Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: track.codec().to_owned(),
                clock_rate,
                channels,
                sdp_fmtp_line,
                rtcp_feedback: vec![],
            },
            track.id().to_owned(),
            self.stream_id.clone(),
        ))
    }

    async fn attach(&self, track: &MediaTrack) -> Result<()> {
        let sender = self
            .peer_connection()
            .await
            .add_track(self.local_track(track))
            .await
            .with_context(|| format!("failed to add {} track {}", track.kind(), track.id()))?;

        // RTCP has to be drained for the interceptors to work.
        let rtcp_sender = Arc::clone(&sender);
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while let Ok((_, _)) = rtcp_sender.read(&mut rtcp_buf).await {}
        });

        self.senders.lock().await.insert(
            track.id().to_owned(),
            Sender {
                track: track.clone(),
                rtp: sender,
            },
        );
        debug!(
            "Added {} track {} for {}",
            track.kind(),
            track.id(),
            self.participant_id
        );
        Ok(())
    }
}

#[async_trait]
impl PeerTransport for ConnectionWrapper {
    async fn create_offer(&self) -> Result<String> {
        let pc = self.peer_connection().await;
        let offer = pc.create_offer(None).await?;
        pc.set_local_description(offer.clone()).await?;
        Ok(offer.sdp)
    }

    async fn create_answer(&self) -> Result<String> {
        let pc = self.peer_connection().await;
        let answer = pc.create_answer(None).await?;
        pc.set_local_description(answer.clone()).await?;
        Ok(answer.sdp)
    }

    async fn set_remote_description(&self, desc: &SessionDescription) -> Result<()> {
        let desc = match desc.kind {
            SdpKind::Offer => RTCSessionDescription::offer(desc.sdp.clone())?,
            SdpKind::Answer => RTCSessionDescription::answer(desc.sdp.clone())?,
        };
        self.peer_connection()
            .await
            .set_remote_description(desc)
            .await?;
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let mut current = self.peer_connection.write().await;
        let state = current.signaling_state();
        if state != RTCSignalingState::HaveLocalOffer {
            bail!("no local offer to roll back (signaling state {})", state);
        }
        if current.current_remote_description().await.is_some() {
            bail!("cannot discard a renegotiation offer on an established connection");
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let fresh = Arc::new(
            self.api
                .new_peer_connection(self.rtc_config.clone())
                .await
                .context("failed to rebuild peer connection")?,
        );
        self.install_callbacks(&fresh, generation);
        let stale = std::mem::replace(&mut *current, fresh);
        drop(current);

        if let Err(e) = stale.close().await {
            warn!(
                "Failed to close discarded connection for {}: {}",
                self.participant_id, e
            );
        }

        let mut tracks: Vec<MediaTrack> = self
            .senders
            .lock()
            .await
            .drain()
            .map(|(_, sender)| sender.track)
            .collect();
        tracks.sort_by_key(|t| t.kind());
        for track in &tracks {
            self.attach(track).await?;
        }

        info!(
            "Discarded local offer for {}: rebuilt connection with {} track(s)",
            self.participant_id,
            tracks.len()
        );
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidatePayload) -> Result<()> {
        if candidate.candidate.trim().is_empty() {
            return Err(anyhow!("empty candidate line"));
        }
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate.clone(),
            sdp_mid: candidate.sdp_mid.clone(),
            sdp_mline_index: candidate.sdp_m_line_index,
            ..Default::default()
        };
        self.peer_connection().await.add_ice_candidate(init).await?;
        Ok(())
    }

    async fn add_track(&self, track: &MediaTrack) -> Result<()> {
        self.attach(track).await
    }

    async fn replace_track(&self, current: &MediaTrack, next: &MediaTrack) -> Result<TrackSwap> {
        if current.codec() != next.codec() {
            info!(
                "Codec change {} -> {} for {}, re-adding sender",
                current.codec(),
                next.codec(),
                self.participant_id
            );
            self.remove_track(current).await?;
            self.attach(next).await?;
            return Ok(TrackSwap::RequiresRenegotiation);
        }

        let mut senders = self.senders.lock().await;
        let sender = senders
            .remove(current.id())
            .ok_or_else(|| anyhow!("no sender for track {}", current.id()))?;
        if let Err(e) = sender.rtp.replace_track(Some(self.local_track(next))).await {
            senders.insert(current.id().to_owned(), sender);
            return Err(e).context("sender rejected replacement track");
        }
        senders.insert(
            next.id().to_owned(),
            Sender {
                track: next.clone(),
                rtp: sender.rtp,
            },
        );
        Ok(TrackSwap::InPlace)
    }

    async fn remove_track(&self, track: &MediaTrack) -> Result<()> {
        let sender = self.senders.lock().await.remove(track.id());
        match sender {
            Some(sender) => {
                self.peer_connection()
                    .await
                    .remove_track(&sender.rtp)
                    .await?;
                Ok(())
            }
            None => {
                warn!("No sender for track {} to remove", track.id());
                Ok(())
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.peer_connection().await.close().await?;
        Ok(())
    }
}

/// Creates a [`ConnectionWrapper`] per session.
pub struct WebRtcTransportFactory {
    stream_id: String,
}

impl WebRtcTransportFactory {
    /// Every outbound track is grouped under a stream named after the local
    /// participant.
    pub fn new(local_id: &ParticipantId) -> Self {
        Self {
            stream_id: format!("stream-{}", local_id),
        }
    }
}

#[async_trait]
impl TransportFactory for WebRtcTransportFactory {
    async fn create(
        &self,
        participant_id: ParticipantId,
        session_id: u64,
        config: TransportConfig,
        event_tx: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn PeerTransport>> {
        let wrapper = ConnectionWrapper::new(
            participant_id,
            session_id,
            self.stream_id.clone(),
            config,
            event_tx,
        )
        .await?;
        Ok(Arc::new(wrapper))
    }
}
