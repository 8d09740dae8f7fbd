//! Auth state-change stream.
//!
//! DESIGN
//! ======
//! Sign-in and sign-out publish an [`AuthStateChange`] on a broadcast
//! channel. Consumers hold a [`Subscription`]; dropping it (or calling
//! [`Subscription::unsubscribe`]) detaches the consumer. Publishing with no
//! subscribers is not an error.

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEvent {
    SignedIn,
    SignedOut,
}

impl AuthEvent {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SignedIn => "SIGNED_IN",
            Self::SignedOut => "SIGNED_OUT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthStateChange {
    pub event: AuthEvent,
    /// Identity the transition applies to, when known.
    pub user_id: Option<String>,
    /// Tracked `user_sessions` row opened or closed by the transition.
    pub session_id: Option<String>,
}

#[derive(Clone)]
pub struct AuthEvents {
    tx: broadcast::Sender<AuthStateChange>,
}

impl AuthEvents {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, change: AuthStateChange) {
        // Err only means nobody is listening.
        let _ = self.tx.send(change);
    }

    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        Subscription { rx: self.tx.subscribe() }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for AuthEvents {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Subscription {
    rx: broadcast::Receiver<AuthStateChange>,
}

impl Subscription {
    /// Next transition, or `None` once every publisher is gone. A lagging
    /// subscriber skips what it missed.
    pub async fn next(&mut self) -> Option<AuthStateChange> {
        loop {
            match self.rx.recv().await {
                Ok(change) => return Some(change),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "auth event subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`Subscription::next`].
    pub fn try_next(&mut self) -> Option<AuthStateChange> {
        loop {
            match self.rx.try_recv() {
                Ok(change) => return Some(change),
                Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => return None,
            }
        }
    }

    /// Detach from the stream.
    pub fn unsubscribe(self) {}
}

/// Spawn a task that logs every auth transition until the stream closes.
pub fn spawn_event_logger(mut subscription: Subscription) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(change) = subscription.next().await {
            info!(
                event = change.event.as_str(),
                user_id = change.user_id.as_deref().unwrap_or("-"),
                session_id = change.session_id.as_deref().unwrap_or("-"),
                "auth state changed"
            );
        }
    })
}

#[cfg(test)]
#[path = "events_test.rs"]
mod tests;
