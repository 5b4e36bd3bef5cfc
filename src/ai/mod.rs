mod summarizer;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Article, ArticleSummary};

pub use summarizer::Summarizer;

/// A stored article shown to the model as a scoring reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredExample {
    pub title: String,
    pub interest_score: f64,
    pub short_summary: String,
}

/// One logged preference, resolved to titles and summaries.
#[derive(Debug, Clone, PartialEq)]
pub struct PreferenceExample {
    pub winner_title: String,
    pub winner_summary: String,
    pub loser_title: String,
    pub loser_summary: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryContext {
    pub examples: Vec<ScoredExample>,
    pub preferences: Vec<PreferenceExample>,
}

#[async_trait]
pub trait Summarize: Send + Sync {
    async fn summarize_article(
        &self,
        title: &str,
        url: &str,
        content: &str,
        context: &SummaryContext,
    ) -> Result<ArticleSummary>;

    /// A short blurb introducing this week's articles.
    async fn summarize_newsletter(&self, articles: &[Article]) -> Result<String>;
}
