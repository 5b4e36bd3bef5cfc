mod repository;
mod schema;

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Article, Comparison, NewArticle};

pub use repository::Repository;

/// Storage for articles. Implementations validate records at this boundary.
#[async_trait]
pub trait ArticleRepository: Send + Sync {
    /// Inserts or updates by URL and returns the article's id. An existing
    /// URL always keeps its id; `saved_at` is never overwritten.
    async fn upsert(&self, article: NewArticle) -> Result<i64>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Article>>;

    /// All articles, highest `interest_score` first.
    async fn list_all(&self) -> Result<Vec<Article>>;

    /// Fails with `NotFound` when no such article exists.
    async fn update_score(&self, id: i64, score: f64) -> Result<()>;

    /// Deletes articles missing either summary; returns how many went.
    async fn purge_incomplete(&self) -> Result<usize>;

    async fn existing_urls(&self) -> Result<HashSet<String>>;
}

/// The append-only comparison log.
#[async_trait]
pub trait ComparisonRepository: Send + Sync {
    async fn append(&self, winning_id: i64, losing_id: i64) -> Result<i64>;

    /// Writes new scores and the comparisons that produced them in one
    /// transaction; nothing is written if any article is missing. Returns
    /// how many comparisons were logged.
    async fn record_ranking(&self, scores: Vec<(i64, f64)>, pairs: Vec<(i64, i64)>) -> Result<usize>;

    /// Newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<Comparison>>;
}
