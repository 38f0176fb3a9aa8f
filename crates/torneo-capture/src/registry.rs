//! Session registry — one live capture session per channel, with an
//! optional expected-author filter. The event loop offers every incoming
//! message to the registry first; a routed message is consumed by the
//! session and never reaches command parsing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use torneo_core::types::IncomingMessage;

/// What scopes a capture session: the conversation channel, plus an
/// optional author the session exclusively listens to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub channel_id: String,
    pub author_id: Option<String>,
}

struct SessionSlot {
    author_id: Option<String>,
    tx: mpsc::Sender<IncomingMessage>,
}

/// Maps active channels to their session input feeds.
#[derive(Default)]
pub struct SessionRegistry {
    slots: Mutex<HashMap<String, SessionSlot>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session for `key`. Returns `None` if the channel already has
    /// one — a second bulk command in the same channel must wait.
    pub fn claim(
        self: &Arc<Self>,
        key: SessionKey,
    ) -> Option<(SessionGuard, mpsc::Receiver<IncomingMessage>)> {
        let mut slots = match self.slots.lock() {
            Ok(s) => s,
            Err(p) => p.into_inner(),
        };
        if slots.contains_key(&key.channel_id) {
            return None;
        }
        let (tx, rx) = mpsc::channel(32);
        slots.insert(
            key.channel_id.clone(),
            SessionSlot { author_id: key.author_id.clone(), tx },
        );
        let guard = SessionGuard { registry: Arc::clone(self), channel_id: key.channel_id };
        Some((guard, rx))
    }

    /// Offer a message to the active session on its channel, if any.
    /// Returns true when the message was consumed by a session.
    pub fn route(&self, msg: &IncomingMessage) -> bool {
        let slots = match self.slots.lock() {
            Ok(s) => s,
            Err(p) => p.into_inner(),
        };
        let Some(slot) = slots.get(&msg.channel_id) else {
            return false;
        };
        if let Some(expected) = &slot.author_id
            && expected != &msg.author_id
        {
            return false;
        }
        // try_send so a stalled session can never block the event loop
        if slot.tx.try_send(msg.clone()).is_err() {
            tracing::warn!(channel = %msg.channel_id, "capture session feed full, dropping message");
        }
        true
    }

    fn release(&self, channel_id: &str) {
        let mut slots = match self.slots.lock() {
            Ok(s) => s,
            Err(p) => p.into_inner(),
        };
        slots.remove(channel_id);
    }
}

/// Releases the channel on drop, so commit, sentinel-discard, and timeout
/// paths all free the key without remembering to.
pub struct SessionGuard {
    registry: Arc<SessionRegistry>,
    channel_id: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.release(&self.channel_id);
    }
}
