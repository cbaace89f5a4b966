use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use super::SessionSnapshot;
use crate::events::{SessionNotifier, Subscription};
use crate::storage::CredentialStore;

/// UI-facing session state, re-read from the store on every event.
///
/// Dropping the view unsubscribes it.
pub struct SessionView {
    state: Arc<Mutex<SessionSnapshot>>,
    notifier: SessionNotifier,
    subscription: Subscription,
}

impl SessionView {
    pub(super) fn new(store: Arc<dyn CredentialStore>, notifier: SessionNotifier) -> Self {
        let state = Arc::new(Mutex::new(SessionSnapshot::read(store.as_ref())));
        let target = Arc::clone(&state);
        let subscription = notifier.subscribe(move |_| {
            let fresh = SessionSnapshot::read(store.as_ref());
            *target.lock().unwrap_or_else(PoisonError::into_inner) = fresh;
        });
        Self {
            state,
            notifier,
            subscription,
        }
    }

    pub fn is_authorized(&self) -> bool {
        self.snapshot().authorized
    }

    pub fn nickname(&self) -> Option<String> {
        self.snapshot().nickname
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl fmt::Debug for SessionView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionView")
            .field("state", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl Drop for SessionView {
    fn drop(&mut self) {
        self.notifier.unsubscribe(self.subscription);
    }
}
