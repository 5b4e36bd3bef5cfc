mod links;
mod omnivore;
mod slack;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

pub use links::extract_url;
pub use omnivore::OmnivoreClient;
pub use slack::{SlackClient, SlackMessage};

/// An article as the read-later service returns it, before summarising.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceArticle {
    pub title: String,
    pub url: String,
    /// HTML body.
    pub content: String,
    pub saved_at: DateTime<Utc>,
}

/// The read-later service articles are saved to and fetched from.
#[async_trait]
pub trait ArticleSource: Send + Sync {
    /// Up to `first` of the most recently saved articles.
    async fn recent_articles(&self, first: usize) -> Result<Vec<SourceArticle>>;

    /// Saves `url` under `label` and returns the URL as stored.
    async fn save_url(&self, url: &str, label: &str) -> Result<String>;
}
