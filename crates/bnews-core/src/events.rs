//! Session-change notifications.
//!
//! The session manager publishes a [`SessionEvent`] after every state
//! change. Consumers either register a callback or take a bounded channel.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error};

use crate::error::ErrorKind;

/// Session state changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A login succeeded.
    LoggedIn { username: String },

    /// An account was created and is now signed in.
    Registered { username: String, nickname: String },

    /// Credentials were cleared, by the user or by a failed refresh.
    LoggedOut,

    /// Tokens were rotated.
    Refreshed,

    /// Rotation failed and the session was closed.
    RefreshFailed { kind: ErrorKind },
}

impl SessionEvent {
    /// True when the event leaves the session authenticated.
    pub fn is_authenticated(&self) -> bool {
        matches!(
            self,
            SessionEvent::LoggedIn { .. } | SessionEvent::Registered { .. } | SessionEvent::Refreshed
        )
    }
}

/// Sender half of an event channel.
pub type SessionEventTx = mpsc::Sender<Arc<SessionEvent>>;

/// Receiver half of an event channel.
pub type SessionEventRx = mpsc::Receiver<Arc<SessionEvent>>;

/// Capacity of channels created by [`SessionNotifier::subscribe_channel`].
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 32;

type Handler = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Handle returned by [`SessionNotifier::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: Vec<(u64, Handler)>,
    channels: Vec<SessionEventTx>,
}

/// Fan-out of session events to callbacks and channels.
///
/// Cloning yields another handle to the same subscriber set.
#[derive(Clone, Default)]
pub struct SessionNotifier {
    registry: Arc<Mutex<Registry>>,
}

impl fmt::Debug for SessionNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionNotifier")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl SessionNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a callback invoked for every subsequent event.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let mut registry = self.registry();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.handlers.push((id, Arc::new(handler)));
        Subscription(id)
    }

    /// Removes a callback. Returns false if it was already removed.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut registry = self.registry();
        let before = registry.handlers.len();
        registry.handlers.retain(|(id, _)| *id != subscription.0);
        registry.handlers.len() != before
    }

    /// Returns a bounded receiver for subsequent events.
    ///
    /// Delivery is best-effort: events are dropped while the channel is
    /// full. Dropping the receiver unsubscribes it on the next publish.
    pub fn subscribe_channel(&self) -> SessionEventRx {
        let (tx, rx) = mpsc::channel(DEFAULT_EVENT_CHANNEL_CAPACITY);
        self.registry().channels.push(tx);
        rx
    }

    /// Number of live callbacks and channels.
    pub fn subscriber_count(&self) -> usize {
        let registry = self.registry();
        registry.handlers.len() + registry.channels.iter().filter(|tx| !tx.is_closed()).count()
    }

    /// Delivers `event` to every current subscriber.
    ///
    /// Callbacks run after the registry lock is released, so they may
    /// subscribe or unsubscribe. A panicking callback is logged and skipped.
    pub fn publish(&self, event: &SessionEvent) {
        let handlers: Vec<Handler> = {
            let mut registry = self.registry();
            let shared = Arc::new(event.clone());
            registry.channels.retain(|tx| match tx.try_send(Arc::clone(&shared)) {
                Ok(()) | Err(TrySendError::Full(_)) => true,
                Err(TrySendError::Closed(_)) => false,
            });
            registry
                .handlers
                .iter()
                .map(|(_, handler)| Arc::clone(handler))
                .collect()
        };

        debug!(?event, handlers = handlers.len(), "publishing session event");
        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                error!(?event, "session event handler panicked");
            }
        }
    }
}
