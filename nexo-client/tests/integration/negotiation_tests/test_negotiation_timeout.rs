use std::sync::Arc;
use std::time::Duration;

use nexo_client::{MediaPipeline, SignalingState, TransportEvent};
use nexo_core::ParticipantId;

use crate::integration::init_tracing;
use crate::utils::{MockSignalingOutput, MockTransportFactory, create_test_registry, wait_for_event};

#[tokio::test]
async fn test_unanswered_offer_times_out() {
    init_tracing();

    let alice = ParticipantId::from("alice");
    let bob = ParticipantId::from("bob");
    let factory = MockTransportFactory::new();
    let media = MediaPipeline::new();
    let (registry, mut events) = create_test_registry(
        &alice,
        Arc::new(MockSignalingOutput::new_stored_only()),
        &factory,
        &media,
        Some(Duration::from_millis(50)),
    );

    let session = registry.get_or_create(&bob);
    session.initiate().unwrap();

    let event = wait_for_event(&mut events, 2000, |e| {
        matches!(e, TransportEvent::NegotiationTimedOut { .. })
    })
    .await
    .expect("Expected a negotiation timeout");
    assert_eq!(event.participant_id(), &bob);
    assert_eq!(event.session_id(), session.session_id());
    assert_eq!(session.state(), SignalingState::HaveLocalOffer);
}

#[tokio::test]
async fn test_transport_setup_failure_closes_session() {
    init_tracing();

    let alice = ParticipantId::from("alice");
    let bob = ParticipantId::from("bob");
    let factory = MockTransportFactory::new();
    factory.fail_for(&bob);
    let media = MediaPipeline::new();
    let (registry, mut events) = create_test_registry(
        &alice,
        Arc::new(MockSignalingOutput::new_stored_only()),
        &factory,
        &media,
        None,
    );

    let session = registry.get_or_create(&bob);

    let event = wait_for_event(&mut events, 2000, |e| {
        matches!(e, TransportEvent::SetupFailed { .. })
    })
    .await;
    assert!(event.is_some(), "Expected SetupFailed");
    assert!(
        session
            .wait_for_state(SignalingState::Closed, Duration::from_secs(1))
            .await
    );
    assert!(session.is_closed());
}
