use tracing::{debug, warn};

use super::{AuthGateway, AuthTokens, LoginRequest, RegisterRequest};
use crate::api::{ApiClient, ApiError, ApiErrorKind, Authorization};
use crate::error::{AuthFailure, SessionError, SessionResult};
use crate::storage::StorageError;

const LOGIN_PATH: &str = "/api/v1/login";
const REGISTER_PATH: &str = "/api/v1/register";
const ROTATE_PATH: &str = "/api/v1/rotate_refresh_token";

/// Server codes meaning the username does not exist (normalized).
const UNKNOWN_USER_CODES: &[&str] = &[
    "usernotfound",
    "unknownuser",
    "nosuchuser",
    "userdoesnotexist",
];

/// Server codes meaning the password or token is wrong (normalized).
const BAD_CREDENTIAL_CODES: &[&str] = &[
    "invalidcredentials",
    "wrongpassword",
    "invalidpassword",
    "invalidtoken",
    "expiredtoken",
    "unauthorized",
];

/// [`AuthGateway`] backed by the Breaking News HTTP API.
#[derive(Debug, Clone)]
pub struct HttpAuthGateway {
    client: ApiClient,
}

impl HttpAuthGateway {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    async fn exchange<B: serde::Serialize + Sync>(
        &self,
        path: &str,
        body: Option<&B>,
        auth: Authorization,
    ) -> SessionResult<AuthTokens> {
        let tokens: AuthTokens = self
            .client
            .post_json(path, body, auth)
            .await
            .map_err(map_api_error)?;
        tokens.validate()?;
        debug!(path, "token pair received");
        Ok(tokens)
    }
}

impl AuthGateway for HttpAuthGateway {
    async fn login(&self, request: &LoginRequest) -> SessionResult<AuthTokens> {
        self.exchange(LOGIN_PATH, Some(request), Authorization::None)
            .await
    }

    async fn register(&self, request: &RegisterRequest) -> SessionResult<AuthTokens> {
        self.exchange(REGISTER_PATH, Some(request), Authorization::None)
            .await
    }

    async fn rotate_refresh_token(&self) -> SessionResult<AuthTokens> {
        self.exchange::<()>(ROTATE_PATH, None, Authorization::Refresh)
            .await
    }
}

fn code_in(err: &ApiError, codes: &[&str]) -> bool {
    err.normalized_code()
        .is_some_and(|code| codes.contains(&code.as_str()))
}

/// Maps a transport error onto the session error taxonomy.
pub(crate) fn map_api_error(err: ApiError) -> SessionError {
    let failure = match err.kind {
        ApiErrorKind::Timeout | ApiErrorKind::Network => {
            return SessionError::Network(err.message);
        }
        // A base URL that cannot be joined never reaches the server.
        ApiErrorKind::InvalidUrl => return SessionError::Network(err.message),
        ApiErrorKind::Parse => return SessionError::Decoding(err.message),
        ApiErrorKind::Storage => {
            let storage = err.storage.unwrap_or_else(|| StorageError::Io {
                path: "credential store".to_string(),
                message: err.message,
            });
            return SessionError::Storage(storage);
        }
        ApiErrorKind::MissingToken => AuthFailure::InvalidCredentials,
        ApiErrorKind::HttpStatus => match err.status {
            Some(status) if status >= 500 => {
                warn!(status, "server unavailable");
                return SessionError::Network(err.message);
            }
            Some(404) => AuthFailure::UserNotFound,
            _ if code_in(&err, UNKNOWN_USER_CODES) => AuthFailure::UserNotFound,
            Some(401 | 403) => AuthFailure::InvalidCredentials,
            Some(status) if (400..500).contains(&status) => AuthFailure::Rejected {
                status: Some(status),
                message: err.message,
            },
            _ => return SessionError::Network(err.message),
        },
        ApiErrorKind::Rejected => {
            if code_in(&err, UNKNOWN_USER_CODES) {
                AuthFailure::UserNotFound
            } else if code_in(&err, BAD_CREDENTIAL_CODES) {
                AuthFailure::InvalidCredentials
            } else {
                AuthFailure::Rejected {
                    status: None,
                    message: err.message,
                }
            }
        }
    };
    SessionError::Authentication(failure)
}
