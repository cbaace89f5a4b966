//! Core Breaking News library (session lifecycle, credentials, API client).

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod news;
pub mod session;
pub mod storage;

pub use error::{AuthFailure, ErrorKind, SessionError, SessionResult};
pub use events::{SessionEvent, SessionNotifier};
pub use session::{SessionManager, SessionSnapshot, SessionView};
