use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use nexo_client::{
    ConnectionWrapper, MIME_TYPE_H264, MIME_TYPE_OPUS, MIME_TYPE_VP8, MediaTrack, PeerTransport,
    TrackSource, TrackSwap, TransportEvent,
};
use nexo_core::{ParticipantId, SessionDescription};
use tokio::sync::mpsc;
use webrtc::peer_connection::signaling_state::RTCSignalingState;

use super::{local_config, wait_connected};
use crate::integration::init_tracing;

async fn connection_toward(
    remote: &str,
    local: &str,
) -> (Arc<ConnectionWrapper>, mpsc::UnboundedReceiver<TransportEvent>) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let wrapper = ConnectionWrapper::new(
        ParticipantId::from(remote),
        1,
        format!("stream-{local}"),
        local_config(),
        event_tx,
    )
    .await
    .expect("Failed to build peer connection");
    (Arc::new(wrapper), event_rx)
}

struct Trickle {
    applied: Arc<AtomicUsize>,
    rejected: Arc<AtomicUsize>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Apply every candidate `events` carries to `target`.
fn trickle(
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    target: Arc<ConnectionWrapper>,
) -> Trickle {
    let applied = Arc::new(AtomicUsize::new(0));
    let rejected = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = mpsc::unbounded_channel();

    let (ok, bad) = (Arc::clone(&applied), Arc::clone(&rejected));
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::CandidateGenerated { candidate, .. } => {
                    match target.add_ice_candidate(&candidate).await {
                        Ok(()) => ok.fetch_add(1, Ordering::SeqCst),
                        Err(e) => {
                            tracing::warn!("Candidate rejected: {:#}", e);
                            bad.fetch_add(1, Ordering::SeqCst)
                        }
                    };
                }
                other => {
                    let _ = tx.send(other);
                }
            }
        }
    });

    Trickle {
        applied,
        rejected,
        events: rx,
    }
}

#[tokio::test]
async fn test_offer_answer_connects_with_trickled_candidates() {
    init_tracing();

    let (alice_side, alice_events) = connection_toward("bob", "alice").await;
    let (bob_side, bob_events) = connection_toward("alice", "bob").await;
    alice_side
        .add_track(&MediaTrack::with_id("alice-mic", TrackSource::Microphone, MIME_TYPE_OPUS))
        .await
        .unwrap();
    bob_side
        .add_track(&MediaTrack::with_id("bob-mic", TrackSource::Microphone, MIME_TYPE_OPUS))
        .await
        .unwrap();

    let offer = alice_side.create_offer().await.expect("Failed to create offer");
    bob_side
        .set_remote_description(&SessionDescription::offer(offer, 1))
        .await
        .expect("Offer rejected");
    let answer = bob_side.create_answer().await.expect("Failed to create answer");
    alice_side
        .set_remote_description(&SessionDescription::answer(answer))
        .await
        .expect("Answer rejected");

    for side in [&alice_side, &bob_side] {
        assert_eq!(
            side.peer_connection().await.signaling_state(),
            RTCSignalingState::Stable
        );
    }

    // Candidates gathered so far were buffered; both descriptions are in place now.
    let mut to_bob = trickle(alice_events, Arc::clone(&bob_side));
    let mut to_alice = trickle(bob_events, Arc::clone(&alice_side));

    assert!(wait_connected(&mut to_bob.events).await, "Alice never connected");
    assert!(wait_connected(&mut to_alice.events).await, "Bob never connected");
    assert!(to_bob.applied.load(Ordering::SeqCst) > 0);
    assert!(to_alice.applied.load(Ordering::SeqCst) > 0);
    assert_eq!(to_bob.rejected.load(Ordering::SeqCst), 0);
    assert_eq!(to_alice.rejected.load(Ordering::SeqCst), 0);

    alice_side.close().await.unwrap();
    bob_side.close().await.unwrap();
}

#[tokio::test]
async fn test_replace_track_in_place_only_for_same_codec() {
    init_tracing();

    let (alice_side, _events) = connection_toward("bob", "alice").await;
    let camera = MediaTrack::with_id("cam-1", TrackSource::Camera, MIME_TYPE_VP8);
    alice_side.add_track(&camera).await.unwrap();
    alice_side.create_offer().await.unwrap();

    let screen = MediaTrack::with_id("screen-1", TrackSource::Screen, MIME_TYPE_VP8);
    let swap = alice_side.replace_track(&camera, &screen).await.unwrap();
    assert_eq!(swap, TrackSwap::InPlace);

    let pc = alice_side.peer_connection().await;
    let mut track_ids = Vec::new();
    for sender in pc.get_senders().await {
        if let Some(track) = sender.track().await {
            track_ids.push(track.id().to_owned());
        }
    }
    assert_eq!(track_ids, vec!["screen-1".to_string()]);

    let h264 = MediaTrack::with_id("screen-h264", TrackSource::Screen, MIME_TYPE_H264);
    let swap = alice_side.replace_track(&screen, &h264).await.unwrap();
    assert_eq!(swap, TrackSwap::RequiresRenegotiation);

    // The old sender is emptied; the replacement got a sender of its own.
    let mut track_ids = Vec::new();
    for sender in pc.get_senders().await {
        if let Some(track) = sender.track().await {
            track_ids.push(track.id().to_owned());
        }
    }
    assert_eq!(track_ids, vec!["screen-h264".to_string()]);

    alice_side.close().await.unwrap();
}
