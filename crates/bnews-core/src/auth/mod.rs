//! Remote authentication gateway.
//!
//! [`AuthGateway`] is the seam between the session manager and the server.
//! [`HttpAuthGateway`] talks to the Breaking News API; tests substitute
//! scripted implementations.

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::{SessionError, SessionResult};

mod http;

pub use http::HttpAuthGateway;

/// Credentials for `POST /api/v1/login`.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Account details for `POST /api/v1/register`.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct RegisterRequest {
    pub nickname: String,
    pub username: String,
    pub password: String,
}

impl RegisterRequest {
    pub fn new(
        nickname: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            nickname: nickname.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("nickname", &self.nickname)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Token pair issued by the server.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    #[serde(alias = "access_token")]
    pub access_token: String,
    #[serde(alias = "refresh_token")]
    pub refresh_token: String,
    /// Display name, when the server includes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
}

impl AuthTokens {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            nickname: None,
        }
    }

    #[must_use]
    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = Some(nickname.into());
        self
    }

    /// Rejects pairs with an empty token.
    ///
    /// # Errors
    /// `SessionError::Decoding` naming the empty field.
    pub fn validate(&self) -> SessionResult<()> {
        if self.access_token.trim().is_empty() {
            return Err(SessionError::Decoding("empty access token".to_string()));
        }
        if self.refresh_token.trim().is_empty() {
            return Err(SessionError::Decoding("empty refresh token".to_string()));
        }
        Ok(())
    }
}

impl fmt::Debug for AuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthTokens")
            .field("access_token", &mask_token(&self.access_token))
            .field("refresh_token", &mask_token(&self.refresh_token))
            .field("nickname", &self.nickname)
            .finish()
    }
}

/// Masks a token for display, keeping a short prefix.
pub fn mask_token(token: &str) -> String {
    let prefix: String = token.chars().take(6).collect();
    if token.chars().count() <= 10 {
        "***".to_string()
    } else {
        format!("{prefix}***")
    }
}

/// Server-side authentication operations.
///
/// Implementations must not touch the credential store except to read the
/// refresh token for rotation.
pub trait AuthGateway: Send + Sync {
    /// Exchanges a username and password for a token pair.
    fn login(&self, request: &LoginRequest)
    -> impl Future<Output = SessionResult<AuthTokens>> + Send;

    /// Creates an account and returns its first token pair.
    fn register(
        &self,
        request: &RegisterRequest,
    ) -> impl Future<Output = SessionResult<AuthTokens>> + Send;

    /// Exchanges the stored refresh token for a fresh pair.
    fn rotate_refresh_token(&self) -> impl Future<Output = SessionResult<AuthTokens>> + Send;
}
