use crate::config::ReconnectPolicy;
use crate::error::{SessionError, SessionResult};
use crate::signaling::{
    ChannelStatus, SignalHandler, SignalingChannel, StatusHandler, Subscriptions,
};
use futures::{SinkExt, StreamExt};
use nexo_core::{ParticipantId, SignalKind, SignalMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

type Outbound = Arc<watch::Sender<Option<mpsc::UnboundedSender<Message>>>>;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Relay connection over a websocket, reconnecting with backoff.
pub struct WsSignalingChannel {
    subscriptions: Arc<Subscriptions>,
    outbound: Outbound,
    shutdown_tx: watch::Sender<bool>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl WsSignalingChannel {
    /// Open the first connection. Later outages are retried in the background
    /// until [`close`](Self::close) is called.
    pub async fn connect(
        url: &str,
        local_id: ParticipantId,
        policy: ReconnectPolicy,
    ) -> SessionResult<Arc<Self>> {
        info!("Connecting to relay: {}", url);
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| SessionError::SignalingDelivery(format!("failed to connect: {e}")))?;
        info!("Connected to relay");

        let subscriptions = Arc::new(Subscriptions::new(local_id));
        let (outbound, _) = watch::channel(None);
        let outbound = Arc::new(outbound);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let supervisor = tokio::spawn(supervise(
            url.to_owned(),
            ws,
            Arc::clone(&subscriptions),
            Arc::clone(&outbound),
            policy,
            shutdown_rx,
        ));

        Ok(Arc::new(Self {
            subscriptions,
            outbound,
            shutdown_tx,
            supervisor: Mutex::new(Some(supervisor)),
        }))
    }

    pub fn is_connected(&self) -> bool {
        self.outbound.borrow().is_some()
    }

    /// Flush queued messages and stop reconnecting.
    pub async fn close(&self) {
        self.outbound.send_replace(None);
        let _ = self.shutdown_tx.send(true);
        let task = self.supervisor.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Relay supervisor ended abnormally: {}", e);
            }
        }
    }
}

impl SignalingChannel for WsSignalingChannel {
    fn local_id(&self) -> &ParticipantId {
        self.subscriptions.local_id()
    }

    fn send(&self, message: SignalMessage) -> SessionResult<()> {
        let json = serde_json::to_string(&message)
            .map_err(|e| SessionError::SignalingDelivery(format!("serialize failed: {e}")))?;

        let outbound = self.outbound.borrow();
        let Some(tx) = outbound.as_ref() else {
            warn!("Relay offline, dropping {:?}", message.kind());
            return Err(SessionError::SignalingDelivery("relay is offline".to_owned()));
        };
        debug!("Sending {:?}", message.kind());
        tx.send(Message::Text(json.into()))
            .map_err(|_| SessionError::SignalingDelivery("relay connection closed".to_owned()))
    }

    fn subscribe(&self, kind: SignalKind, handler: SignalHandler) {
        self.subscriptions.add(kind, handler);
    }

    fn subscribe_status(&self, handler: StatusHandler) {
        self.subscriptions.add_status(handler);
    }
}

async fn supervise(
    url: String,
    first: WsStream,
    subscriptions: Arc<Subscriptions>,
    outbound: Outbound,
    policy: ReconnectPolicy,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut next = Some(first);
    let mut attempt = 0u32;
    let mut reconnecting = false;

    loop {
        let ws = match next.take() {
            Some(ws) => ws,
            None => {
                let delay = policy.delay(attempt);
                attempt = attempt.saturating_add(1);
                debug!("Reconnecting to relay in {:?} (attempt {})", delay, attempt);

                let connected = tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    res = async {
                        tokio::time::sleep(delay).await;
                        connect_async(url.as_str()).await
                    } => res,
                };
                match connected {
                    Ok((ws, _)) => ws,
                    Err(e) => {
                        warn!("Relay reconnect failed: {}", e);
                        continue;
                    }
                }
            }
        };

        attempt = 0;
        let (tx, rx) = mpsc::unbounded_channel();
        outbound.send_replace(Some(tx));
        if reconnecting {
            info!("Reconnected to relay");
            subscriptions.notify_status(ChannelStatus::Reconnected);
        } else {
            subscriptions.notify_status(ChannelStatus::Connected);
        }

        let closed = run_connection(ws, rx, Arc::clone(&subscriptions), &mut shutdown_rx).await;
        outbound.send_replace(None);
        if closed {
            break;
        }

        warn!("Relay connection lost");
        subscriptions.notify_status(ChannelStatus::Disconnected);
        reconnecting = true;
    }

    info!("Relay connection closed");
}

/// Pump one websocket until it drops. Returns `true` when closed locally.
async fn run_connection(
    ws: WsStream,
    mut rx: mpsc::UnboundedReceiver<Message>,
    subscriptions: Arc<Subscriptions>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> bool {
    let (mut sink, mut stream) = ws.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = sink.send(msg).await {
                error!("Failed to send WebSocket message: {}", e);
                return;
            }
        }
        let _ = sink.close().await;
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    match serde_json::from_str::<SignalMessage>(text.as_str()) {
                        Ok(signal) => {
                            subscriptions.dispatch(signal);
                        }
                        Err(e) => warn!("Invalid SignalMessage from relay: {:?}", e),
                    }
                }
                Ok(Message::Close(_)) => {
                    info!("Relay sent close frame");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    error!("WebSocket error: {}", e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
            false
        }
        _ = (&mut recv_task) => {
            send_task.abort();
            false
        }
        _ = shutdown_rx.changed() => {
            // The sender was dropped by `close`, so the send task drains and exits.
            if tokio::time::timeout(DRAIN_TIMEOUT, &mut send_task).await.is_err() {
                send_task.abort();
            }
            recv_task.abort();
            true
        }
    }
}
