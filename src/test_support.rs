//! Builders and fakes shared by the unit tests.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

use crate::ai::{Summarize, SummaryContext};
use crate::app::App;
use crate::config::Config;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{Article, ArticleSummary, NewArticle};
use crate::services::{ArticleSource, SourceArticle};

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

pub fn article(id: i64, score: f64) -> Article {
    article_saved(id, score, fixed_now() - Duration::days(30))
}

pub fn article_saved(id: i64, score: f64, saved_at: DateTime<Utc>) -> Article {
    Article {
        id,
        title: format!("Article {id}"),
        url: format!("https://example.com/{id}"),
        content: String::new(),
        long_summary: Some(format!("Long summary of article {id}.")),
        short_summary: Some(format!("Short summary of article {id}.")),
        interest_score: score,
        saved_at,
    }
}

pub fn new_article(url: &str, score: f64) -> NewArticle {
    NewArticle {
        title: format!("Title for {url}"),
        url: url.to_string(),
        content: "Body".to_string(),
        long_summary: Some(format!("Long summary for {url}.")),
        short_summary: Some(format!("Short summary for {url}.")),
        interest_score: score,
        saved_at: fixed_now() - Duration::days(30),
    }
}

pub fn source_article(slug: &str, days_old: i64) -> SourceArticle {
    SourceArticle {
        title: format!("Source {slug}"),
        url: format!("https://news.example.com/{slug}"),
        content: format!("<p>Body of {slug}</p>"),
        saved_at: Utc::now() - Duration::days(days_old),
    }
}

/// Serves a fixed list, truncated to the requested size, and records saves.
#[derive(Default)]
pub struct FakeSource {
    pub articles: Vec<SourceArticle>,
    pub fail: bool,
    pub requests: Mutex<Vec<usize>>,
    pub saved: Mutex<Vec<(String, String)>>,
}

impl FakeSource {
    pub fn with(articles: Vec<SourceArticle>) -> Self {
        Self {
            articles,
            ..Default::default()
        }
    }

    pub fn requested(&self) -> Vec<usize> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ArticleSource for FakeSource {
    async fn recent_articles(&self, first: usize) -> Result<Vec<SourceArticle>> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(first);
        }
        if self.fail {
            return Err(AppError::OmnivoreApi("unavailable".to_string()));
        }
        Ok(self.articles.iter().take(first).cloned().collect())
    }

    async fn save_url(&self, url: &str, label: &str) -> Result<String> {
        if let Ok(mut saved) = self.saved.lock() {
            saved.push((url.to_string(), label.to_string()));
        }
        Ok(url.to_string())
    }
}

/// Scores every article 50 unless its title is listed in `failing`.
#[derive(Default)]
pub struct FakeSummarizer {
    pub failing: HashSet<String>,
    pub newsletter_fails: bool,
    pub contexts: Mutex<Vec<SummaryContext>>,
}

#[async_trait]
impl Summarize for FakeSummarizer {
    async fn summarize_article(
        &self,
        title: &str,
        _url: &str,
        content: &str,
        context: &SummaryContext,
    ) -> Result<ArticleSummary> {
        if let Ok(mut contexts) = self.contexts.lock() {
            contexts.push(context.clone());
        }
        if self.failing.contains(title) {
            return Err(AppError::ClaudeApi(format!("could not summarise {title}")));
        }
        Ok(ArticleSummary {
            interest_score: 50.0,
            short_summary: format!("Short: {}", content.trim()),
            long_summary: format!("Long: {}", content.trim()),
        })
    }

    async fn summarize_newsletter(&self, articles: &[Article]) -> Result<String> {
        if self.newsletter_fails {
            return Err(AppError::ClaudeApi("overloaded".to_string()));
        }
        Ok(format!("This week: {} articles.", articles.len()))
    }
}

/// Config for router tests: only `localhost` is trusted and the newsletter
/// cache lives under `dir`.
pub fn test_config(dir: &TempDir) -> Config {
    Config {
        allowed_hosts: vec!["localhost".to_string()],
        newsletter_path: dir
            .path()
            .join("newsletter.html")
            .to_string_lossy()
            .to_string(),
        ..Config::default()
    }
}

pub async fn test_app(source: FakeSource, summarizer: FakeSummarizer) -> (Arc<App>, TempDir) {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    (app_with(config, source, summarizer).await, dir)
}

pub async fn app_with(config: Config, source: FakeSource, summarizer: FakeSummarizer) -> Arc<App> {
    let repository = Repository::in_memory().await.unwrap();
    Arc::new(App::with_services(
        config,
        repository,
        Some(Arc::new(source) as Arc<dyn ArticleSource>),
        Some(Arc::new(summarizer) as Arc<dyn Summarize>),
        None,
    ))
}
