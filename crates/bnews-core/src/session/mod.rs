//! Session lifecycle.
//!
//! [`SessionManager`] owns every operation that changes the stored session:
//! login, registration, logout and token rotation. It keeps the access and
//! refresh tokens consistent in the credential store and announces each
//! change through a [`SessionNotifier`].

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::{ApiClient, ApiResult};
use crate::auth::{AuthGateway, AuthTokens, HttpAuthGateway, LoginRequest, RegisterRequest};
use crate::config::Config;
use crate::error::{SessionError, SessionResult};
use crate::events::{SessionEvent, SessionNotifier};
use crate::storage::{CredentialStore, StorageError, StorageKey};

mod view;

pub use view::SessionView;

/// Point-in-time view of the stored session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub authorized: bool,
    pub username: Option<String>,
    pub nickname: Option<String>,
}

impl SessionSnapshot {
    /// Reads the snapshot from `store`. Read failures count as absent values.
    pub fn read(store: &dyn CredentialStore) -> Self {
        Self {
            authorized: read_lenient(store, StorageKey::AccessToken).is_some(),
            username: read_lenient(store, StorageKey::Username),
            nickname: read_lenient(store, StorageKey::Nickname),
        }
    }
}

/// Best-effort read: storage errors are logged and treated as absent.
fn read_lenient(store: &dyn CredentialStore, key: StorageKey) -> Option<String> {
    match store.load(key) {
        Ok(value) => value.filter(|v| !v.is_empty()),
        Err(err) => {
            warn!(%key, error = %err, "credential read failed");
            None
        }
    }
}

/// Single authority for session-affecting operations.
///
/// Mutating operations are serialized. Concurrent refreshes share one
/// rotation: callers that queued behind an in-flight refresh receive its
/// outcome, unless another operation changed the session in between.
pub struct SessionManager<G> {
    gateway: G,
    store: Arc<dyn CredentialStore>,
    notifier: SessionNotifier,
    op_lock: AsyncMutex<()>,
    refresh_epoch: AtomicU64,
    last_refresh: Mutex<Option<SessionResult<()>>>,
}

impl SessionManager<HttpAuthGateway> {
    /// Builds a manager that talks to the configured API.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built from `config`.
    pub fn connect(
        config: &Config,
        store: Arc<dyn CredentialStore>,
        notifier: SessionNotifier,
    ) -> ApiResult<Self> {
        let client = ApiClient::new(config, Arc::clone(&store))?;
        Ok(Self::new(HttpAuthGateway::new(client), store, notifier))
    }
}

impl<G: AuthGateway> SessionManager<G> {
    pub fn new(gateway: G, store: Arc<dyn CredentialStore>, notifier: SessionNotifier) -> Self {
        Self {
            gateway,
            store,
            notifier,
            op_lock: AsyncMutex::new(()),
            refresh_epoch: AtomicU64::new(0),
            last_refresh: Mutex::new(None),
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn notifier(&self) -> &SessionNotifier {
        &self.notifier
    }

    // ---- Queries ----------------------------------------------------------

    /// True iff an access token is stored.
    pub fn is_authorized(&self) -> bool {
        read_lenient(self.store.as_ref(), StorageKey::AccessToken).is_some()
    }

    /// Cached display name.
    pub fn nickname(&self) -> Option<String> {
        read_lenient(self.store.as_ref(), StorageKey::Nickname)
    }

    /// Username of the last successful login or registration.
    pub fn username(&self) -> Option<String> {
        read_lenient(self.store.as_ref(), StorageKey::Username)
    }

    /// Stored access token. Unlike the other queries, storage failures surface.
    ///
    /// # Errors
    /// Propagates credential store failures.
    pub fn access_token(&self) -> SessionResult<Option<String>> {
        Ok(self
            .store
            .load(StorageKey::AccessToken)?
            .filter(|t| !t.is_empty()))
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::read(self.store.as_ref())
    }

    /// Returns a live view refreshed after every session event.
    pub fn watch(&self) -> SessionView {
        SessionView::new(Arc::clone(&self.store), self.notifier.clone())
    }

    // ---- Operations -------------------------------------------------------

    /// Logs in and stores the issued tokens.
    ///
    /// # Errors
    /// Gateway errors propagate unchanged; the store is left untouched.
    pub async fn log_in(&self, username: &str, password: &str) -> SessionResult<()> {
        self.log_in_with_cancel(username, password, &CancellationToken::new())
            .await
    }

    /// [`log_in`](Self::log_in) that gives up when `cancel` fires before the
    /// tokens are written.
    ///
    /// # Errors
    /// `SessionError::Cancelled`, or any error from [`log_in`](Self::log_in).
    pub async fn log_in_with_cancel(
        &self,
        username: &str,
        password: &str,
        cancel: &CancellationToken,
    ) -> SessionResult<()> {
        let request = LoginRequest::new(username, password);
        let _guard = self.lock_ops(cancel).await?;
        self.forget_last_refresh();
        let tokens = until_cancelled(cancel, self.gateway.login(&request)).await??;

        let previous_user = read_lenient(self.store.as_ref(), StorageKey::Username);
        self.write_tokens(&tokens)?;
        self.store_lenient(StorageKey::Username, Some(username));
        match tokens.nickname.as_deref().filter(|n| !n.is_empty()) {
            Some(nickname) => self.store_lenient(StorageKey::Nickname, Some(nickname)),
            // Another account's display name must not carry over.
            None if previous_user.as_deref() != Some(username) => {
                self.store_lenient(StorageKey::Nickname, None);
            }
            None => {}
        }

        info!(username, "logged in");
        self.notifier.publish(&SessionEvent::LoggedIn {
            username: username.to_string(),
        });
        Ok(())
    }

    /// Creates an account, stores its tokens and the supplied nickname.
    ///
    /// # Errors
    /// Gateway errors propagate unchanged; the store is left untouched.
    pub async fn register(
        &self,
        nickname: &str,
        username: &str,
        password: &str,
    ) -> SessionResult<()> {
        self.register_with_cancel(nickname, username, password, &CancellationToken::new())
            .await
    }

    /// [`register`](Self::register) with cancellation.
    ///
    /// # Errors
    /// `SessionError::Cancelled`, or any error from [`register`](Self::register).
    pub async fn register_with_cancel(
        &self,
        nickname: &str,
        username: &str,
        password: &str,
        cancel: &CancellationToken,
    ) -> SessionResult<()> {
        let request = RegisterRequest::new(nickname, username, password);
        let _guard = self.lock_ops(cancel).await?;
        self.forget_last_refresh();
        let tokens = until_cancelled(cancel, self.gateway.register(&request)).await??;

        self.write_tokens(&tokens)?;
        self.store_lenient(StorageKey::Username, Some(username));
        self.store_lenient(StorageKey::Nickname, Some(nickname));

        info!(username, "registered");
        self.notifier.publish(&SessionEvent::Registered {
            username: username.to_string(),
            nickname: nickname.to_string(),
        });
        Ok(())
    }

    /// Clears the stored session. Idempotent and infallible.
    pub async fn log_out(&self) {
        let _guard = self.op_lock.lock().await;
        self.forget_last_refresh();
        self.clear_session();
        info!("logged out");
        self.notifier.publish(&SessionEvent::LoggedOut);
    }

    /// Rotates the token pair.
    ///
    /// Any failure closes the session before the error is returned.
    ///
    /// # Errors
    /// The gateway or storage error that ended the session.
    pub async fn refresh_session(&self) -> SessionResult<()> {
        self.refresh_session_with_cancel(&CancellationToken::new())
            .await
    }

    /// [`refresh_session`](Self::refresh_session) with cancellation.
    ///
    /// A cancelled refresh leaves the session as it was.
    ///
    /// # Errors
    /// `SessionError::Cancelled`, or any error from
    /// [`refresh_session`](Self::refresh_session).
    pub async fn refresh_session_with_cancel(
        &self,
        cancel: &CancellationToken,
    ) -> SessionResult<()> {
        let epoch = self.refresh_epoch.load(Ordering::SeqCst);
        let _guard = self.lock_ops(cancel).await?;

        if self.refresh_epoch.load(Ordering::SeqCst) != epoch {
            let shared = self
                .last_refresh
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(outcome) = shared {
                debug!("refresh coalesced with the one that just finished");
                return outcome;
            }
        }

        let rotated = until_cancelled(cancel, self.gateway.rotate_refresh_token()).await?;
        let outcome = match rotated {
            Ok(tokens) => self.write_tokens(&tokens).map_err(SessionError::from),
            Err(err) => Err(err),
        };

        match &outcome {
            Ok(()) => {
                info!("session refreshed");
                self.notifier.publish(&SessionEvent::Refreshed);
            }
            Err(err) => {
                warn!(error = %err, "refresh failed, closing session");
                self.clear_session();
                self.notifier
                    .publish(&SessionEvent::RefreshFailed { kind: err.kind() });
            }
        }

        *self
            .last_refresh
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(outcome.clone());
        self.refresh_epoch.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    // ---- Internals --------------------------------------------------------

    async fn lock_ops(&self, cancel: &CancellationToken) -> SessionResult<AsyncMutexGuard<'_, ()>> {
        until_cancelled(cancel, self.op_lock.lock()).await
    }

    /// Writes both tokens or neither.
    fn write_tokens(&self, tokens: &AuthTokens) -> Result<(), StorageError> {
        let previous_access = self.store.load(StorageKey::AccessToken)?;
        let previous_refresh = self.store.load(StorageKey::RefreshToken)?;

        let written = self.store.store_all(&[
            (StorageKey::AccessToken, Some(tokens.access_token.as_str())),
            (StorageKey::RefreshToken, Some(tokens.refresh_token.as_str())),
        ]);
        if let Err(err) = written {
            // Stores without batch writes may have applied the first half.
            if let Err(rollback) = self.store.store_all(&[
                (StorageKey::AccessToken, previous_access.as_deref()),
                (StorageKey::RefreshToken, previous_refresh.as_deref()),
            ]) {
                error!(error = %rollback, "failed to roll back token pair");
            }
            return Err(err);
        }
        Ok(())
    }

    /// Only a refresh that directly preceded the caller may be shared.
    fn forget_last_refresh(&self) {
        self.last_refresh
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Writes a non-critical field; failures are logged and dropped.
    fn store_lenient(&self, key: StorageKey, value: Option<&str>) {
        if let Err(err) = self.store.store(key, value) {
            warn!(%key, error = %err, "credential write dropped");
        }
    }

    fn clear_session(&self) {
        for key in StorageKey::ALL {
            if let Err(err) = self.store.store(key, None) {
                warn!(%key, error = %err, "failed to clear credential");
            }
        }
    }
}

/// Runs `fut` unless `cancel` fires first.
async fn until_cancelled<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> SessionResult<F::Output> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(SessionError::Cancelled),
        out = fut => Ok(out),
    }
}
