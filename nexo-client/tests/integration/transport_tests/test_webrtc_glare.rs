use std::sync::Arc;
use std::time::Duration;

use nexo_client::{
    ConnectionWrapper, MIME_TYPE_OPUS, MediaPipeline, MediaTrack, PeerTransport, SignalingState,
    TrackSource, WebRtcTransportFactory,
};
use nexo_core::{ParticipantId, SessionDescription};
use tokio::sync::mpsc;
use webrtc::peer_connection::signaling_state::RTCSignalingState;

use super::{local_config, wait_connected};
use crate::integration::init_tracing;
use crate::utils::{LoopbackOutput, create_registry_with, forward_candidates, state_timeout};

#[tokio::test]
async fn test_discarding_local_offer_rebuilds_connection() {
    init_tracing();

    let (alice_tx, _alice_events) = mpsc::unbounded_channel();
    let (bob_tx, _bob_events) = mpsc::unbounded_channel();
    let alice_side = ConnectionWrapper::new(
        ParticipantId::from("bob"),
        1,
        "stream-alice".to_owned(),
        local_config(),
        alice_tx,
    )
    .await
    .unwrap();
    let bob_side = ConnectionWrapper::new(
        ParticipantId::from("alice"),
        1,
        "stream-bob".to_owned(),
        local_config(),
        bob_tx,
    )
    .await
    .unwrap();
    let mic = MediaTrack::with_id("bob-mic", TrackSource::Microphone, MIME_TYPE_OPUS);
    bob_side.add_track(&mic).await.unwrap();

    let alice_offer = alice_side.create_offer().await.unwrap();
    bob_side.create_offer().await.unwrap();
    let discarded = bob_side.peer_connection().await;

    bob_side.rollback().await.expect("Pending first offer can be discarded");
    let rebuilt = bob_side.peer_connection().await;
    assert!(!Arc::ptr_eq(&discarded, &rebuilt));
    assert_eq!(rebuilt.signaling_state(), RTCSignalingState::Stable);
    assert_eq!(rebuilt.get_senders().await.len(), 1, "Bound track re-attached");

    bob_side
        .set_remote_description(&SessionDescription::offer(alice_offer, 2))
        .await
        .expect("Rebuilt connection accepts the remote offer");
    let answer = bob_side.create_answer().await.unwrap();
    alice_side
        .set_remote_description(&SessionDescription::answer(answer))
        .await
        .unwrap();
    assert_eq!(
        alice_side.peer_connection().await.signaling_state(),
        RTCSignalingState::Stable
    );

    // An established connection keeps its renegotiation offer.
    bob_side.create_offer().await.unwrap();
    let live = bob_side.peer_connection().await;
    assert!(bob_side.rollback().await.is_err());
    assert!(Arc::ptr_eq(&live, &bob_side.peer_connection().await));

    alice_side.close().await.unwrap();
    bob_side.close().await.unwrap();
}

#[tokio::test]
async fn test_simultaneous_initiate_connects_real_peers() {
    init_tracing();

    let alice = ParticipantId::from("alice");
    let bob = ParticipantId::from("bob");
    let alice_out = LoopbackOutput::new(alice.clone());
    let bob_out = LoopbackOutput::new(bob.clone());
    let alice_media = MediaPipeline::new();
    let bob_media = MediaPipeline::new();

    let (alice_registry, alice_events) = create_registry_with(
        &alice,
        alice_out.clone(),
        Arc::new(WebRtcTransportFactory::new(&alice)),
        local_config(),
        &alice_media,
        None,
    );
    let (bob_registry, bob_events) = create_registry_with(
        &bob,
        bob_out.clone(),
        Arc::new(WebRtcTransportFactory::new(&bob)),
        local_config(),
        &bob_media,
        None,
    );
    alice_out.connect(bob_registry.clone());
    bob_out.connect(alice_registry.clone());
    let mut alice_events = forward_candidates(alice_events, alice_out.clone());
    let mut bob_events = forward_candidates(bob_events, bob_out.clone());

    for (media, registry, owner) in [
        (&alice_media, &alice_registry, "alice"),
        (&bob_media, &bob_registry, "bob"),
    ] {
        media
            .bind_local_source(registry, |state| {
                state.set_microphone(Some(MediaTrack::with_id(
                    format!("{owner}-mic"),
                    TrackSource::Microphone,
                    MIME_TYPE_OPUS,
                )));
            })
            .await;
    }

    let to_bob = alice_registry.get_or_create(&bob);
    let to_alice = bob_registry.get_or_create(&alice);
    to_bob.initiate().unwrap();
    to_alice.initiate().unwrap();

    let settle = state_timeout() * 3;
    assert!(to_bob.wait_for_state(SignalingState::Stable, settle).await);
    assert!(to_alice.wait_for_state(SignalingState::Stable, settle).await);
    assert!(wait_connected(&mut alice_events).await, "Alice never connected");
    assert!(wait_connected(&mut bob_events).await, "Bob never connected");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(to_bob.state(), SignalingState::Stable);
    assert_eq!(to_alice.state(), SignalingState::Stable);
    assert!(to_bob.same_session(&alice_registry.get(&bob).unwrap()));
    assert!(to_alice.same_session(&bob_registry.get(&alice).unwrap()));

    alice_registry.clear().await;
    bob_registry.clear().await;
}
