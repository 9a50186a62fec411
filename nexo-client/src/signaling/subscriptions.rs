use crate::signaling::{ChannelStatus, SignalHandler, StatusHandler};
use dashmap::DashMap;
use nexo_core::{ParticipantId, SignalKind, SignalMessage};
use std::sync::RwLock;
use tracing::{debug, trace};

/// Handler table shared by the channel implementations.
pub struct Subscriptions {
    local_id: ParticipantId,
    handlers: DashMap<SignalKind, Vec<SignalHandler>>,
    status: RwLock<Vec<StatusHandler>>,
}

impl Subscriptions {
    pub fn new(local_id: ParticipantId) -> Self {
        Self {
            local_id,
            handlers: DashMap::new(),
            status: RwLock::new(Vec::new()),
        }
    }

    pub fn local_id(&self) -> &ParticipantId {
        &self.local_id
    }

    pub fn add(&self, kind: SignalKind, handler: SignalHandler) {
        self.handlers.entry(kind).or_default().push(handler);
    }

    pub fn add_status(&self, handler: StatusHandler) {
        match self.status.write() {
            Ok(mut handlers) => handlers.push(handler),
            Err(poisoned) => poisoned.into_inner().push(handler),
        }
    }

    /// Hand `message` to every handler of its kind.
    ///
    /// Returns `false` when the message was addressed to another participant
    /// and therefore dropped.
    pub fn dispatch(&self, message: SignalMessage) -> bool {
        if let Some(to) = message.recipient() {
            if to != &self.local_id {
                debug!(
                    "Dropping {:?} addressed to {} (local is {})",
                    message.kind(),
                    to,
                    self.local_id
                );
                return false;
            }
        }

        // Clone out so a handler can subscribe without deadlocking the map.
        let handlers = self
            .handlers
            .get(&message.kind())
            .map(|h| h.value().clone())
            .unwrap_or_default();

        if handlers.is_empty() {
            trace!("No handler for {:?}", message.kind());
            return true;
        }

        for handler in &handlers {
            handler(message.clone());
        }
        true
    }

    pub fn notify_status(&self, status: ChannelStatus) {
        let handlers = match self.status.read() {
            Ok(handlers) => handlers.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        for handler in handlers {
            handler(status);
        }
    }
}
