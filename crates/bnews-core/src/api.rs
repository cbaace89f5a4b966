//! HTTP transport for the Breaking News API.
//!
//! Every response body uses the API's Either envelope: `{"Right": payload}`
//! on success and `{"Left": error}` on failure. Bare payloads are accepted
//! too. Credentials are read from the credential store per request.

use std::fmt;
use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::Config;
use crate::storage::{CredentialStore, StorageError, StorageKey};

const PLATFORM_HEADER: &str = "platform";
const ACCESS_TOKEN_HEADER: &str = "access_token";
const REFRESH_TOKEN_HEADER: &str = "refresh_token";

/// Categories of transport errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorKind {
    /// Non-2xx HTTP status.
    HttpStatus,
    /// Request timed out.
    Timeout,
    /// Connection-level failure.
    Network,
    /// Body could not be decoded.
    Parse,
    /// 2xx response carrying a `Left` envelope.
    Rejected,
    /// The request needs a token that is not stored.
    MissingToken,
    /// Credential store failure while reading a token.
    Storage,
    /// Base URL or path could not be joined.
    InvalidUrl,
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApiErrorKind::HttpStatus => "http_status",
            ApiErrorKind::Timeout => "timeout",
            ApiErrorKind::Network => "network",
            ApiErrorKind::Parse => "parse",
            ApiErrorKind::Rejected => "rejected",
            ApiErrorKind::MissingToken => "missing_token",
            ApiErrorKind::Storage => "storage",
            ApiErrorKind::InvalidUrl => "invalid_url",
        };
        f.write_str(s)
    }
}

/// Structured transport error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    /// HTTP status, when one was received.
    pub status: Option<u16>,
    /// Machine-readable error code from the server, if any.
    pub code: Option<String>,
    /// One-line summary suitable for display.
    pub message: String,
    /// Raw body or extra context.
    pub details: Option<String>,
    /// Credential store failure behind a `Storage` error.
    #[serde(skip)]
    pub storage: Option<StorageError>,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            code: None,
            message: message.into(),
            details: None,
            storage: None,
        }
    }

    /// Wraps a credential store failure hit while preparing a request.
    pub fn storage(err: StorageError) -> Self {
        Self {
            storage: Some(err.clone()),
            ..Self::new(ApiErrorKind::Storage, err.to_string())
        }
    }

    /// Builds an HTTP status error, pulling code/message out of a JSON body.
    pub fn http_status(status: u16, body: &str) -> Self {
        let (code, server_message) = serde_json::from_str::<Value>(body)
            .map(|json| error_fields(&json))
            .unwrap_or_default();

        let message = match &server_message {
            Some(msg) => format!("HTTP {status}: {msg}"),
            None => format!("HTTP {status}"),
        };

        Self {
            kind: ApiErrorKind::HttpStatus,
            status: Some(status),
            code,
            message,
            details: (!body.is_empty()).then(|| body.to_string()),
            storage: None,
        }
    }

    /// Builds an error from a `Left` envelope on a successful status.
    pub fn rejected(left: &Value) -> Self {
        let (code, message) = error_fields(left);
        Self {
            kind: ApiErrorKind::Rejected,
            status: None,
            message: message
                .or_else(|| code.clone())
                .unwrap_or_else(|| "request rejected".to_string()),
            code,
            details: Some(left.to_string()),
            storage: None,
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Parse, message)
    }

    fn from_reqwest(err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ApiErrorKind::Timeout
        } else if err.is_decode() {
            ApiErrorKind::Parse
        } else {
            ApiErrorKind::Network
        };
        Self::new(kind, err.to_string())
    }

    /// Server error code normalised for comparisons (`UserNotFound`,
    /// `user_not_found` and `user-not-found` all become `usernotfound`).
    pub fn normalized_code(&self) -> Option<String> {
        self.code.as_deref().map(|code| {
            code.chars()
                .filter(char::is_ascii_alphanumeric)
                .map(|c| c.to_ascii_lowercase())
                .collect()
        })
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

/// Result type for transport operations.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Extracts `(code, message)` from an error payload.
///
/// Accepts a bare string, `{"code", "message"}`, `{"error": "..."}` and
/// `{"error": {"code", "message"}}`. A `Left` wrapper is unwrapped first.
fn error_fields(value: &Value) -> (Option<String>, Option<String>) {
    let value = value.get("Left").unwrap_or(value);
    match value {
        Value::String(s) => (Some(s.clone()), Some(s.clone())),
        Value::Object(map) => {
            if let Some(inner @ Value::Object(_)) = map.get("error") {
                return error_fields(inner);
            }
            let text = |key: &str| map.get(key).and_then(Value::as_str).map(str::to_string);
            let code = text("code").or_else(|| text("error")).or_else(|| text("reason"));
            let message = text("message")
                .or_else(|| text("description"))
                .or_else(|| text("error"));
            (code, message)
        }
        _ => (None, None),
    }
}

/// Decodes a successful body, honouring the Either envelope.
fn decode_body<T: DeserializeOwned>(body: &str) -> ApiResult<T> {
    let trimmed = body.trim();
    let value: Value = if trimmed.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(trimmed)
            .map_err(|e| ApiError::parse(format!("invalid JSON body: {e}")))?
    };

    let payload = match value {
        Value::Object(mut map) if map.len() == 1 && map.contains_key("Left") => {
            let left = map.remove("Left").unwrap_or(Value::Null);
            return Err(ApiError::rejected(&left));
        }
        Value::Object(mut map) if map.len() == 1 && map.contains_key("Right") => {
            map.remove("Right").unwrap_or(Value::Null)
        }
        other => other,
    };

    serde_json::from_value(payload)
        .map_err(|e| ApiError::parse(format!("unexpected response shape: {e}")))
}

/// Which stored credential a request carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    /// No credential.
    None,
    /// Access token when one is stored, anonymous otherwise.
    OptionalAccess,
    /// Access token; fails with `MissingToken` when absent.
    Access,
    /// Refresh token; fails with `MissingToken` when absent.
    Refresh,
}

/// Thin wrapper over `reqwest::Client` bound to one API base URL.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    platform: HeaderValue,
    store: Arc<dyn CredentialStore>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Builds a client from configuration.
    ///
    /// # Errors
    /// `InvalidUrl` for an unparsable base URL, `Network` if the HTTP client
    /// cannot be built.
    pub fn new(config: &Config, store: Arc<dyn CredentialStore>) -> ApiResult<Self> {
        let base_url = config.effective_base_url();
        let base_url = Url::parse(&base_url).map_err(|e| {
            ApiError::new(ApiErrorKind::InvalidUrl, format!("{base_url}: {e}"))
        })?;
        let platform = HeaderValue::from_str(&config.api.platform).map_err(|e| {
            ApiError::new(ApiErrorKind::InvalidUrl, format!("invalid platform header: {e}"))
        })?;

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.api.timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(|e| ApiError::from_reqwest(&e))?;

        Ok(Self {
            http,
            base_url,
            platform,
            store,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Shared credential store used for request authorization.
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// `GET path?query` decoding the payload as `T`.
    ///
    /// # Errors
    /// Any [`ApiErrorKind`].
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
        auth: Authorization,
    ) -> ApiResult<T> {
        let mut url = self.endpoint(path)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        self.send(Method::GET, url, None, auth).await
    }

    /// `POST path` with an optional JSON body, decoding the payload as `T`.
    ///
    /// # Errors
    /// Any [`ApiErrorKind`].
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&B>,
        auth: Authorization,
    ) -> ApiResult<T> {
        let url = self.endpoint(path)?;
        let body = body
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| ApiError::parse(format!("failed to encode request: {e}")))?;
        self.send(Method::POST, url, body, auth).await
    }

    fn endpoint(&self, path: &str) -> ApiResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::new(ApiErrorKind::InvalidUrl, format!("{path}: {e}")))
    }

    fn auth_headers(&self, auth: Authorization) -> ApiResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(PLATFORM_HEADER, self.platform.clone());

        let (key, header, required) = match auth {
            Authorization::None => return Ok(headers),
            Authorization::OptionalAccess => (StorageKey::AccessToken, ACCESS_TOKEN_HEADER, false),
            Authorization::Access => (StorageKey::AccessToken, ACCESS_TOKEN_HEADER, true),
            Authorization::Refresh => (StorageKey::RefreshToken, REFRESH_TOKEN_HEADER, true),
        };

        let token = self
            .store
            .load(key)
            .map_err(ApiError::storage)?
            .filter(|t| !t.is_empty());

        match token {
            Some(token) => {
                let value = HeaderValue::from_str(&token)
                    .map_err(|e| ApiError::new(ApiErrorKind::MissingToken, e.to_string()))?;
                headers.insert(header, value);
            }
            None if required => {
                return Err(ApiError::new(
                    ApiErrorKind::MissingToken,
                    format!("no {key} stored"),
                ));
            }
            None => {}
        }
        Ok(headers)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
        auth: Authorization,
    ) -> ApiResult<T> {
        let headers = self.auth_headers(auth)?;
        debug!(%method, path = url.path(), "api request");

        let mut request = self.http.request(method, url).headers(headers);
        if let Some(body) = &body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| ApiError::from_reqwest(&e))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::from_reqwest(&e))?;
        debug!(status = status.as_u16(), bytes = text.len(), "api response");

        if status != StatusCode::NO_CONTENT && !status.is_success() {
            return Err(ApiError::http_status(status.as_u16(), &text));
        }
        decode_body(&text)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Payload {
        value: u32,
    }

    #[test]
    fn test_decode_right_envelope() {
        let payload: Payload = decode_body(r#"{"Right": {"value": 7}}"#).unwrap();
        assert_eq!(payload, Payload { value: 7 });
    }

    #[test]
    fn test_decode_bare_payload() {
        let payload: Payload = decode_body(r#"{"value": 3}"#).unwrap();
        assert_eq!(payload, Payload { value: 3 });
    }

    #[test]
    fn test_decode_left_envelope_is_rejection() {
        let err = decode_body::<Payload>(r#"{"Left": "UserNotFound"}"#).unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::Rejected);
        assert_eq!(err.code.as_deref(), Some("UserNotFound"));
        assert_eq!(err.normalized_code().as_deref(), Some("usernotfound"));
    }

    #[test]
    fn test_decode_wrong_shape_is_parse_error() {
        let err = decode_body::<Payload>(r#"{"Right": {"other": 1}}"#).unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::Parse);

        let err = decode_body::<Payload>("<html>").unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::Parse);
    }

    #[test]
    fn test_empty_body_decodes_as_null() {
        let value: Value = decode_body("  ").unwrap();
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn test_http_status_extracts_nested_message() {
        let body = json!({"error": {"code": "bad_password", "message": "Wrong password"}});
        let err = ApiError::http_status(401, &body.to_string());
        assert_eq!(err.status, Some(401));
        assert_eq!(err.code.as_deref(), Some("bad_password"));
        assert_eq!(err.message, "HTTP 401: Wrong password");
    }

    #[test]
    fn test_http_status_without_body() {
        let err = ApiError::http_status(503, "");
        assert_eq!(err.message, "HTTP 503");
        assert_eq!(err.details, None);
    }
}
