//! Integration tests for `bnews news`.

mod fixtures;

use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use fixtures::{article, can_bind_localhost, right, seed_credentials, temp_bnews_home};
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer};

#[tokio::test]
async fn test_news_list_prints_newest_first() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_bnews_home();
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/news_list"))
        .and(query_param("block", "0"))
        .respond_with(right(json!([
            article(1, "Older story", "bob", "2024-01-01T09:00:00Z"),
            article(2, "Fresh story", "alice", "2024-05-01T09:00:00Z"),
        ])))
        .mount(&mock_server)
        .await;

    let output = cargo_bin_cmd!("bnews")
        .env("BNEWS_HOME", home.path())
        .env("BNEWS_BASE_URL", mock_server.uri())
        .args(["news", "list"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let stdout = String::from_utf8(output).unwrap();
    let fresh = stdout.find("Fresh story").expect("fresh story listed");
    let older = stdout.find("Older story").expect("older story listed");
    assert!(fresh < older, "newest article should come first:\n{stdout}");
    assert!(stdout.contains("by alice"));
}

#[tokio::test]
async fn test_news_list_forwards_filters() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_bnews_home();
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/news_list"))
        .and(query_param("block", "3"))
        .and(query_param("authorName", "alice"))
        .and(query_param("titleLike", "rust"))
        .respond_with(right(json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    cargo_bin_cmd!("bnews")
        .env("BNEWS_HOME", home.path())
        .env("BNEWS_BASE_URL", mock_server.uri())
        .args([
            "news", "list", "--page", "3", "--author", "alice", "--title", "rust",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("No news found."));
}

#[tokio::test]
async fn test_news_list_forwards_time_range() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_bnews_home();
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/news_list"))
        .and(query_param("createdSince", "2024-01-01T00:00:00Z"))
        .and(query_param("createdUntil", "2024-02-01T12:30:00Z"))
        .respond_with(right(json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    cargo_bin_cmd!("bnews")
        .env("BNEWS_HOME", home.path())
        .env("BNEWS_BASE_URL", mock_server.uri())
        .args([
            "news",
            "list",
            "--since",
            "2024-01-01T00:00:00Z",
            "--until",
            "2024-02-01T14:30:00+02:00",
        ])
        .assert()
        .success();
}

#[test]
fn test_news_list_rejects_malformed_time() {
    let home = temp_bnews_home();

    cargo_bin_cmd!("bnews")
        .env("BNEWS_HOME", home.path())
        .args(["news", "list", "--since", "yesterday"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--since"));
}

#[tokio::test]
async fn test_news_create_uploads_images() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_bnews_home();
    let mock_server = MockServer::start().await;
    seed_credentials(&home, &json!({"accessToken": "at1", "refreshToken": "rt1"}));

    let image = home.path().join("photo.bin");
    fs::write(&image, b"hello").unwrap();

    Mock::given(method("POST"))
        .and(path("/api/v1/create_article"))
        .and(header("access_token", "at1"))
        .and(body_partial_json(json!({
            "title": "Launch",
            "images": ["aGVsbG8="],
            "isPublished": true,
        })))
        .respond_with(right(json!(null)))
        .expect(1)
        .mount(&mock_server)
        .await;

    cargo_bin_cmd!("bnews")
        .env("BNEWS_HOME", home.path())
        .env("BNEWS_BASE_URL", mock_server.uri())
        .args(["news", "create", "--title", "Launch", "--content", "We shipped"])
        .arg("--image")
        .arg(&image)
        .assert()
        .success()
        .stdout(predicate::str::contains("Published \"Launch\""));
}

#[test]
fn test_news_create_requires_login() {
    let home = temp_bnews_home();

    cargo_bin_cmd!("bnews")
        .env("BNEWS_HOME", home.path())
        .env("BNEWS_BASE_URL", "http://127.0.0.1:9")
        .args(["news", "create", "--title", "Launch", "--content", "We shipped"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no accessToken stored"));
}

#[test]
fn test_news_create_rejects_empty_title() {
    let home = temp_bnews_home();

    cargo_bin_cmd!("bnews")
        .env("BNEWS_HOME", home.path())
        .args(["news", "create", "--title", "", "--content", "body"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("title must not be empty"));
}
