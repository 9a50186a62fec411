use std::time::Duration;

use nexo_client::{MediaPipeline, SignalingState};
use nexo_core::ParticipantId;

use crate::integration::init_tracing;
use crate::utils::{
    LoopbackOutput, MockTransportFactory, create_test_registry, forward_candidates, state_timeout,
};

#[tokio::test]
async fn test_simultaneous_initiate_rolls_back_exactly_once() {
    init_tracing();

    let alice = ParticipantId::from("alice");
    let bob = ParticipantId::from("bob");
    let alice_out = LoopbackOutput::new(alice.clone());
    let bob_out = LoopbackOutput::new(bob.clone());
    let factory = MockTransportFactory::new();
    let alice_media = MediaPipeline::new();
    let bob_media = MediaPipeline::new();

    let (alice_registry, alice_events) =
        create_test_registry(&alice, alice_out.clone(), &factory, &alice_media, None);
    let (bob_registry, bob_events) =
        create_test_registry(&bob, bob_out.clone(), &factory, &bob_media, None);
    alice_out.connect(bob_registry.clone());
    bob_out.connect(alice_registry.clone());

    let _alice_events = forward_candidates(alice_events, alice_out.clone());
    let _bob_events = forward_candidates(bob_events, bob_out.clone());

    // Both initiates are queued before either actor runs.
    let to_bob = alice_registry.get_or_create(&bob);
    let to_alice = bob_registry.get_or_create(&alice);
    to_bob.initiate().unwrap();
    to_alice.initiate().unwrap();

    assert!(to_bob.wait_for_state(SignalingState::Stable, state_timeout()).await);
    assert!(to_alice.wait_for_state(SignalingState::Stable, state_timeout()).await);

    // Let stray messages drain, then check nothing moved.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(factory.total_rollbacks(), 1, "Exactly one side rolls back");
    assert_eq!(to_bob.state(), SignalingState::Stable);
    assert_eq!(to_alice.state(), SignalingState::Stable);

    assert_eq!(factory.created_for(&alice), 1);
    assert_eq!(factory.created_for(&bob), 1);
}
