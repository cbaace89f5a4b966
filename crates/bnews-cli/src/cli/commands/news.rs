//! News command handlers.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use bnews_core::api::ApiClient;
use bnews_core::config::Config;
use bnews_core::news::{NewArticle, NewsArticle, NewsClient, NewsQuery};
use chrono::Local;

use super::open_store;

fn news_client(config: &Config) -> Result<NewsClient> {
    let client = ApiClient::new(config, open_store()).context("build API client")?;
    Ok(NewsClient::new(client))
}

fn print_article(article: &NewsArticle) {
    let when = article.created_at.with_timezone(&Local);
    println!("{}  {}", when.format("%Y-%m-%d %H:%M"), article.title);

    let images = match article.images.len() {
        0 => String::new(),
        1 => ", 1 image".to_string(),
        n => format!(", {n} images"),
    };
    println!("    by {}{images}", article.author);
}

pub async fn list(config: &Config, query: &NewsQuery, json: bool) -> Result<()> {
    let client = news_client(config)?;
    let articles = client.news(query).await.context("Failed to load news")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&articles)?);
        return Ok(());
    }

    if articles.is_empty() {
        println!("No news found.");
        return Ok(());
    }
    for article in &articles {
        print_article(article);
    }
    Ok(())
}

pub async fn create(
    config: &Config,
    title: String,
    content: String,
    image_paths: &[PathBuf],
) -> Result<()> {
    let mut draft = NewArticle {
        title,
        content,
        images: Vec::with_capacity(image_paths.len()),
    };
    for path in image_paths {
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read image {}", path.display()))?;
        draft.images.push(bytes);
    }
    // Fail before touching the network.
    draft.validate()?;

    let client = news_client(config)?;
    client
        .create_article(&draft)
        .await
        .context("Failed to publish article")?;

    println!("Published \"{}\"", draft.title);
    Ok(())
}
