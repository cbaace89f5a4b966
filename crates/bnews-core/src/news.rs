//! News feed client.
//!
//! Reads the public feed and publishes articles on behalf of the signed-in
//! user. Requests are authorized from the same credential store the session
//! manager maintains.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::api::{ApiClient, ApiError, ApiResult, Authorization};

const NEWS_LIST_PATH: &str = "/api/v1/news_list";
const CREATE_ARTICLE_PATH: &str = "/api/v1/create_article";

/// Most images an article may carry.
pub const MAX_ARTICLE_IMAGES: usize = 6;

/// Category assigned to articles published from this client.
pub const DEFAULT_CATEGORY: u32 = 1;

/// Filters for `GET /api/v1/news_list`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewsQuery {
    pub page: Option<u32>,
    pub created_at: Option<DateTime<Utc>>,
    pub created_until: Option<DateTime<Utc>>,
    pub created_since: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub category: Option<u32>,
    pub title_contains: Option<String>,
    pub text_contains: Option<String>,
}

impl NewsQuery {
    /// First page with no filters.
    pub fn first_page() -> Self {
        Self {
            page: Some(0),
            ..Self::default()
        }
    }

    /// Query string pairs in a stable order.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        fn timestamp(value: &DateTime<Utc>) -> String {
            value.to_rfc3339_opts(SecondsFormat::Secs, true)
        }

        let mut pairs = Vec::new();
        let mut push = |key: &str, value: Option<String>| {
            if let Some(value) = value {
                pairs.push((key.to_string(), value));
            }
        };

        push("block", self.page.map(|p| p.to_string()));
        push("createdAt", self.created_at.as_ref().map(timestamp));
        push("createdUntil", self.created_until.as_ref().map(timestamp));
        push("createdSince", self.created_since.as_ref().map(timestamp));
        push("authorName", self.author.clone());
        push("category", self.category.map(|c| c.to_string()));
        push("titleLike", self.title_contains.clone());
        push("textLike", self.text_contains.clone());
        pairs
    }
}

/// Article as returned by the server.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArticleRecord {
    id: i64,
    text: String,
    title: String,
    author_name: String,
    #[serde(default)]
    category: u32,
    #[serde(default = "default_published")]
    is_published: bool,
    #[serde(default)]
    images: Vec<String>,
    created_at: DateTime<Utc>,
}

fn default_published() -> bool {
    true
}

/// A feed entry with decoded images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewsArticle {
    pub id: String,
    pub author: String,
    pub title: String,
    pub content: String,
    pub category: u32,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub images: Vec<Vec<u8>>,
}

impl From<ArticleRecord> for NewsArticle {
    fn from(record: ArticleRecord) -> Self {
        let images = record
            .images
            .iter()
            .filter_map(|encoded| match BASE64.decode(encoded.trim()) {
                Ok(bytes) => Some(bytes),
                Err(err) => {
                    debug!(article = record.id, error = %err, "dropping undecodable image");
                    None
                }
            })
            .collect();

        Self {
            id: record.id.to_string(),
            author: record.author_name,
            title: record.title,
            content: record.text,
            category: record.category,
            published: record.is_published,
            created_at: record.created_at,
            images,
        }
    }
}

/// Why an article cannot be submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArticleError {
    EmptyTitle,
    EmptyContent,
    TooManyImages { count: usize },
}

impl fmt::Display for ArticleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArticleError::EmptyTitle => write!(f, "article title must not be empty"),
            ArticleError::EmptyContent => write!(f, "article content must not be empty"),
            ArticleError::TooManyImages { count } => write!(
                f,
                "an article may carry at most {MAX_ARTICLE_IMAGES} images, got {count}"
            ),
        }
    }
}

impl std::error::Error for ArticleError {}

/// Article draft.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewArticle {
    pub title: String,
    pub content: String,
    /// Raw image bytes, base64-encoded on submission.
    pub images: Vec<Vec<u8>>,
}

impl NewArticle {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            images: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_image(mut self, bytes: Vec<u8>) -> Self {
        self.images.push(bytes);
        self
    }

    /// Checks the draft before it is sent.
    ///
    /// # Errors
    /// The first violated rule.
    pub fn validate(&self) -> Result<(), ArticleError> {
        if self.title.trim().is_empty() {
            return Err(ArticleError::EmptyTitle);
        }
        if self.content.trim().is_empty() {
            return Err(ArticleError::EmptyContent);
        }
        if self.images.len() > MAX_ARTICLE_IMAGES {
            return Err(ArticleError::TooManyImages {
                count: self.images.len(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateArticleBody<'a> {
    title: &'a str,
    content: &'a str,
    images: Vec<String>,
    category: u32,
    is_published: bool,
}

/// Error from [`NewsClient::create_article`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewsError {
    Invalid(ArticleError),
    Api(ApiError),
}

impl fmt::Display for NewsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NewsError::Invalid(err) => write!(f, "{err}"),
            NewsError::Api(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for NewsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NewsError::Invalid(err) => Some(err),
            NewsError::Api(err) => Some(err),
        }
    }
}

impl From<ArticleError> for NewsError {
    fn from(err: ArticleError) -> Self {
        NewsError::Invalid(err)
    }
}

impl From<ApiError> for NewsError {
    fn from(err: ApiError) -> Self {
        NewsError::Api(err)
    }
}

#[derive(Debug, Clone)]
pub struct NewsClient {
    client: ApiClient,
}

impl NewsClient {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Fetches the feed, newest first.
    ///
    /// # Errors
    /// Any transport or decoding error.
    pub async fn news(&self, query: &NewsQuery) -> ApiResult<Vec<NewsArticle>> {
        let records: Vec<ArticleRecord> = self
            .client
            .get_json(NEWS_LIST_PATH, &query.to_pairs(), Authorization::OptionalAccess)
            .await?;

        let mut articles: Vec<NewsArticle> = records.into_iter().map(NewsArticle::from).collect();
        articles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        debug!(count = articles.len(), "news feed loaded");
        Ok(articles)
    }

    /// Publishes an article as the signed-in user.
    ///
    /// # Errors
    /// `NewsError::Invalid` for a draft that fails validation, otherwise the
    /// transport error (`MissingToken` when nobody is signed in).
    pub async fn create_article(&self, article: &NewArticle) -> Result<(), NewsError> {
        article.validate()?;

        let body = CreateArticleBody {
            title: &article.title,
            content: &article.content,
            images: article.images.iter().map(|bytes| BASE64.encode(bytes)).collect(),
            category: DEFAULT_CATEGORY,
            is_published: true,
        };
        let _: Value = self
            .client
            .post_json(CREATE_ARTICLE_PATH, Some(&body), Authorization::Access)
            .await?;

        info!(title = %article.title, images = article.images.len(), "article published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::api::ApiErrorKind;
    use crate::config::Config;
    use crate::storage::{CredentialStore, MemoryStore, StorageKey};

    fn can_bind_localhost() -> bool {
        std::net::TcpListener::bind("127.0.0.1:0").is_ok()
    }

    fn news_client(server: &MockServer, store: Arc<dyn CredentialStore>) -> NewsClient {
        let mut config = Config::default();
        config.api.base_url = server.uri();
        NewsClient::new(ApiClient::new(&config, store).unwrap())
    }

    fn record(id: i64, created_at: &str, images: &[&str]) -> Value {
        json!({
            "id": id,
            "text": format!("text {id}"),
            "title": format!("title {id}"),
            "authorName": "alice",
            "category": 1,
            "isPublished": true,
            "images": images,
            "createdAt": created_at,
        })
    }

    #[test]
    fn test_query_pairs_use_distinct_date_keys() {
        let day = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let query = NewsQuery {
            page: Some(2),
            created_until: Some(day),
            created_since: Some(day),
            author: Some("alice".into()),
            title_contains: Some("rust".into()),
            ..NewsQuery::default()
        };

        assert_eq!(
            query.to_pairs(),
            vec![
                ("block".to_string(), "2".to_string()),
                ("createdUntil".to_string(), "2024-03-01T12:00:00Z".to_string()),
                ("createdSince".to_string(), "2024-03-01T12:00:00Z".to_string()),
                ("authorName".to_string(), "alice".to_string()),
                ("titleLike".to_string(), "rust".to_string()),
            ]
        );
        assert!(NewsQuery::default().to_pairs().is_empty());
    }

    #[test]
    fn test_validate_article() {
        assert_eq!(NewArticle::new("t", "c").validate(), Ok(()));
        assert_eq!(
            NewArticle::new(" ", "c").validate(),
            Err(ArticleError::EmptyTitle)
        );
        assert_eq!(
            NewArticle::new("t", "").validate(),
            Err(ArticleError::EmptyContent)
        );

        let mut crowded = NewArticle::new("t", "c");
        crowded.images = vec![vec![0u8]; MAX_ARTICLE_IMAGES + 1];
        assert_eq!(
            crowded.validate(),
            Err(ArticleError::TooManyImages { count: 7 })
        );
    }

    #[test]
    fn test_record_drops_invalid_images() {
        let record: ArticleRecord = serde_json::from_value(record(
            5,
            "2024-01-01T00:00:00Z",
            &["aGVsbG8=", "%%not base64%%"],
        ))
        .unwrap();
        let article = NewsArticle::from(record);

        assert_eq!(article.id, "5");
        assert_eq!(article.content, "text 5");
        assert_eq!(article.images, vec![b"hello".to_vec()]);
    }

    #[tokio::test]
    async fn test_news_sorted_newest_first() {
        if !can_bind_localhost() {
            eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/news_list"))
            .and(query_param("block", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Right": [
                    record(1, "2024-01-01T00:00:00Z", &[]),
                    record(2, "2024-02-01T00:00:00Z", &[]),
                ]
            })))
            .mount(&server)
            .await;

        let client = news_client(&server, Arc::new(MemoryStore::new()));
        let articles = client.news(&NewsQuery::first_page()).await.unwrap();

        let ids: Vec<&str> = articles.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "1"]);
    }

    #[tokio::test]
    async fn test_create_article_sends_encoded_images() {
        if !can_bind_localhost() {
            eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/create_article"))
            .and(header("access_token", "at1"))
            .and(body_json(json!({
                "title": "Hello",
                "content": "World",
                "images": ["aGVsbG8="],
                "category": 1,
                "isPublished": true,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Right": null})))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        store.store(StorageKey::AccessToken, Some("at1")).unwrap();
        let client = news_client(&server, store);

        let draft = NewArticle::new("Hello", "World").with_image(b"hello".to_vec());
        client.create_article(&draft).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_article_requires_login() {
        if !can_bind_localhost() {
            eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
            return;
        }
        let server = MockServer::start().await;
        let client = news_client(&server, Arc::new(MemoryStore::new()));

        let err = client
            .create_article(&NewArticle::new("Hello", "World"))
            .await
            .unwrap_err();
        assert!(matches!(err, NewsError::Api(e) if e.kind == ApiErrorKind::MissingToken));
    }
}
