//! Response helpers for integration tests against a mock API.

#![allow(dead_code)]

use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::ResponseTemplate;

/// Creates a temp BNEWS_HOME directory for test isolation.
pub fn temp_bnews_home() -> TempDir {
    TempDir::new().expect("create temp bnews home")
}

pub fn can_bind_localhost() -> bool {
    std::net::TcpListener::bind("127.0.0.1:0").is_ok()
}

/// `{"Right": payload}` with status 200.
pub fn right(payload: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "Right": payload }))
}

/// `{"Left": error}` with status 200.
pub fn left(error: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "Left": error }))
}

/// Token pair payload, optionally carrying a nickname.
pub fn tokens(access: &str, refresh: &str, nickname: Option<&str>) -> ResponseTemplate {
    let mut payload = json!({ "accessToken": access, "refreshToken": refresh });
    if let Some(nickname) = nickname {
        payload["nickname"] = json!(nickname);
    }
    right(payload)
}

/// A single article as served by `news_list`.
pub fn article(id: i64, title: &str, author: &str, created_at: &str) -> Value {
    json!({
        "id": id,
        "title": title,
        "text": format!("{title} body"),
        "authorName": author,
        "category": 1,
        "isPublished": true,
        "images": [],
        "createdAt": created_at,
    })
}

/// Reads the credential file written by the CLI.
pub fn stored_credentials(home: &TempDir) -> Value {
    let path = home.path().join("credentials.json");
    match std::fs::read_to_string(&path) {
        Ok(raw) => serde_json::from_str(&raw).expect("credentials are JSON"),
        Err(_) => json!({}),
    }
}

/// Seeds the credential file before running the CLI.
pub fn seed_credentials(home: &TempDir, values: &Value) {
    std::fs::write(
        home.path().join("credentials.json"),
        serde_json::to_string_pretty(values).unwrap(),
    )
    .unwrap();
}
