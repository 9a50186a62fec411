use std::sync::{Arc, Mutex};

use nexo_client::{
    ChannelStatus, ReconnectPolicy, SessionError, SignalingChannel, WsSignalingChannel,
};
use nexo_core::{IceCandidatePayload, ParticipantId, SignalKind, SignalMessage};

use crate::integration::init_tracing;
use crate::utils::{SIGNAL_TIMEOUT_MS, WsTestRelay, wait_until};

fn candidate_for(to: &str) -> SignalMessage {
    SignalMessage::IceCandidate {
        to: ParticipantId::from(to),
        from: ParticipantId::from("alice"),
        candidate: IceCandidatePayload {
            candidate: format!("candidate:1 1 udp 2122260223 10.0.0.1 5000 typ host ({to})"),
            sdp_mid: Some("0".to_owned()),
            sdp_m_line_index: Some(0),
        },
    }
}

fn chat(message: &str) -> SignalMessage {
    SignalMessage::ChatMessage {
        message: message.to_owned(),
        from: Some(ParticipantId::from("bob")),
    }
}

#[tokio::test]
async fn test_ws_channel_survives_relay_outage() {
    init_tracing();

    let mut relay = WsTestRelay::start().await.unwrap();
    let policy = ReconnectPolicy {
        initial_delay_ms: 20,
        max_delay_ms: 100,
    };
    let channel = WsSignalingChannel::connect(&relay.url, ParticipantId::from("bob"), policy)
        .await
        .unwrap();

    let statuses = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&statuses);
    channel.subscribe_status(Arc::new(move |s| sink.lock().unwrap().push(s)));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    channel.subscribe(
        SignalKind::IceCandidate,
        Arc::new(move |msg| sink.lock().unwrap().push(msg)),
    );

    let mut first = relay.next_socket().await.expect("Initial connection");
    assert!(wait_until(SIGNAL_TIMEOUT_MS, || channel.is_connected()).await);

    // Only messages addressed to us are dispatched; order is preserved, so
    // once ours arrived the foreign one has been handled too.
    first.push(&candidate_for("carol")).await.unwrap();
    first.push(&candidate_for("bob")).await.unwrap();
    assert!(wait_until(SIGNAL_TIMEOUT_MS, || !seen.lock().unwrap().is_empty()).await);
    assert_eq!(*seen.lock().unwrap(), vec![candidate_for("bob")]);

    channel.send(chat("hello")).unwrap();
    assert_eq!(first.next_signal().await, Some(chat("hello")));

    // Cut the socket and keep the relay unreachable.
    relay.set_offline(true);
    drop(first);
    assert!(
        wait_until(SIGNAL_TIMEOUT_MS, || statuses
            .lock()
            .unwrap()
            .contains(&ChannelStatus::Disconnected))
        .await
    );
    assert!(!channel.is_connected());
    let err = channel.send(chat("lost")).unwrap_err();
    assert!(
        matches!(err, SessionError::SignalingDelivery(_)),
        "unexpected error {err:?}"
    );

    relay.set_offline(false);
    let mut second = relay.next_socket().await.expect("Reconnection");
    assert!(
        wait_until(SIGNAL_TIMEOUT_MS, || statuses
            .lock()
            .unwrap()
            .contains(&ChannelStatus::Reconnected))
        .await
    );
    let sequence: Vec<_> = statuses
        .lock()
        .unwrap()
        .iter()
        .copied()
        .filter(|s| *s != ChannelStatus::Connected)
        .collect();
    assert_eq!(
        sequence,
        vec![ChannelStatus::Disconnected, ChannelStatus::Reconnected]
    );

    // The message dropped while offline is not replayed.
    channel.send(chat("back")).unwrap();
    assert_eq!(second.next_signal().await, Some(chat("back")));

    // Closing flushes what was already queued.
    channel.send(chat("bye")).unwrap();
    channel.close().await;
    assert_eq!(second.next_signal().await, Some(chat("bye")));
    assert_eq!(second.next_signal().await, None);
    assert!(!channel.is_connected());
    assert!(channel.send(chat("after close")).is_err());
}
