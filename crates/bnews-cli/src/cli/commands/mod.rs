//! CLI command handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use bnews_core::SessionManager;
use bnews_core::auth::HttpAuthGateway;
use bnews_core::config::Config;
use bnews_core::events::SessionNotifier;
use bnews_core::storage::{CredentialStore, FileStore};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub mod auth;
pub mod config;
pub mod news;

/// Credential store under `BNEWS_HOME`.
fn open_store() -> Arc<dyn CredentialStore> {
    Arc::new(FileStore::open_default())
}

fn session_manager(config: &Config) -> Result<SessionManager<HttpAuthGateway>> {
    let notifier = SessionNotifier::new();
    notifier.subscribe(|event| debug!(?event, "session changed"));
    SessionManager::connect(config, open_store(), notifier).context("build API client")
}

/// Token cancelled on Ctrl-C.
fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    cancel
}
