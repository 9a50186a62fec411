use std::sync::Arc;

use nexo_client::{MediaPipeline, SignalingState};
use nexo_core::{ParticipantId, SdpKind, SessionDescription};

use crate::integration::init_tracing;
use crate::utils::{
    MockSdp, MockSignalingOutput, MockTransportFactory, create_test_registry, state_timeout,
    wait_for_answer, wait_for_offer,
};

#[tokio::test]
async fn test_initiator_reaches_stable_exactly_once() {
    init_tracing();

    let alice = ParticipantId::from("alice");
    let bob = ParticipantId::from("bob");
    let (signaling, mut signal_rx) = MockSignalingOutput::new();
    let factory = MockTransportFactory::new();
    let media = MediaPipeline::new();
    let (registry, _events) =
        create_test_registry(&alice, Arc::new(signaling.clone()), &factory, &media, None);

    let session = registry.get_or_create(&bob);
    let mut transitions = session.subscribe_state();
    session.initiate().expect("Failed to initiate");

    let offer = wait_for_offer(&mut signal_rx, &bob)
        .await
        .expect("No offer sent");
    assert_eq!(offer.kind, SdpKind::Offer);
    assert!(offer.tiebreaker.is_some(), "Offers carry a tiebreaker");
    assert_eq!(session.state(), SignalingState::HaveLocalOffer);

    session
        .deliver_answer(SessionDescription::answer(MockSdp::empty()))
        .expect("Failed to deliver answer");
    assert!(
        session
            .wait_for_state(SignalingState::Stable, state_timeout())
            .await
    );

    // A duplicate answer is rejected without a transition.
    session
        .deliver_answer(SessionDescription::answer(MockSdp::empty()))
        .expect("Failed to deliver answer");
    let snapshot = session.snapshot().await.expect("Session gone");
    assert_eq!(snapshot.state, SignalingState::Stable);

    let mut seen = Vec::new();
    while let Ok(state) = transitions.try_recv() {
        seen.push(state);
    }
    assert_eq!(
        seen,
        vec![SignalingState::HaveLocalOffer, SignalingState::Stable]
    );
}

#[tokio::test]
async fn test_answerer_passes_through_have_remote_offer() {
    init_tracing();

    let alice = ParticipantId::from("alice");
    let bob = ParticipantId::from("bob");
    let (signaling, mut signal_rx) = MockSignalingOutput::new();
    let factory = MockTransportFactory::new();
    let media = MediaPipeline::new();
    let (registry, _events) =
        create_test_registry(&alice, Arc::new(signaling.clone()), &factory, &media, None);

    let session = registry.get_or_create(&bob);
    let mut transitions = session.subscribe_state();
    session
        .deliver_offer(SessionDescription::offer(MockSdp::empty(), 7))
        .expect("Failed to deliver offer");

    let answer = wait_for_answer(&mut signal_rx, &bob)
        .await
        .expect("No answer sent");
    assert_eq!(answer.kind, SdpKind::Answer);
    assert!(answer.tiebreaker.is_none());
    assert!(
        session
            .wait_for_state(SignalingState::Stable, state_timeout())
            .await
    );

    assert_eq!(
        transitions.recv().await.unwrap(),
        SignalingState::HaveRemoteOffer
    );
    assert_eq!(transitions.recv().await.unwrap(), SignalingState::Stable);

    // Initiate outside idle is a no-op.
    session.initiate().unwrap();
    let snapshot = session.snapshot().await.unwrap();
    assert_eq!(snapshot.state, SignalingState::Stable);
    assert!(signaling.offers_for(&bob).await.is_empty());
}
