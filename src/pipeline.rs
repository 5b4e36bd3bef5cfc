//! Pulls newly saved articles from the read-later service, summarises and
//! scores them, and stores the results one at a time.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::ai::{PreferenceExample, ScoredExample, Summarize, SummaryContext};
use crate::config::Config;
use crate::db::{ArticleRepository, ComparisonRepository, Repository};
use crate::error::{AppError, Result};
use crate::models::{canonical_url, NewArticle};
use crate::ranking::RankingEngine;
use crate::services::{ArticleSource, SourceArticle};

const SUMMARY_CONCURRENCY: usize = 3;
const EXAMPLE_COUNT: usize = 5;
const PREFERENCE_COUNT: usize = 4;
const TEXT_WIDTH: usize = 80;
/// Largest page asked of the source; GraphQL `Int` is 32-bit.
const MAX_REQUEST_SIZE: usize = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub minimum_item_count: usize,
    pub maximum_item_count: usize,
    pub days_to_check: i64,
    pub maximum_days_to_check: i64,
    pub stale_after_days: i64,
    /// Articles handed to the newsletter blurb.
    pub featured_count: usize,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        let (long, short) = config.tier_counts();
        Self {
            minimum_item_count: config.minimum_item_count,
            maximum_item_count: config.maximum_item_count,
            days_to_check: config.days_to_check,
            maximum_days_to_check: config.maximum_days_to_check,
            stale_after_days: config.stale_after_days,
            featured_count: long + short,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub purged: usize,
    pub fetched: usize,
    pub stored: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Completed(RefreshReport),
    AlreadyRunning,
}

pub struct Pipeline {
    engine: Arc<RankingEngine<Repository>>,
    source: Option<Arc<dyn ArticleSource>>,
    summarizer: Option<Arc<dyn Summarize>>,
    settings: PipelineSettings,
    running: Mutex<()>,
}

impl Pipeline {
    pub fn new(
        engine: Arc<RankingEngine<Repository>>,
        source: Option<Arc<dyn ArticleSource>>,
        summarizer: Option<Arc<dyn Summarize>>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            engine,
            source,
            summarizer,
            settings,
            running: Mutex::new(()),
        }
    }

    fn repo(&self) -> &Repository {
        self.engine.repository()
    }

    /// One full ingestion run. A second caller while a run is in flight
    /// gets `AlreadyRunning` instead of waiting.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        let Ok(_running) = self.running.try_lock() else {
            tracing::info!("refresh already in progress");
            return Ok(RefreshOutcome::AlreadyRunning);
        };

        let source = self
            .source
            .as_deref()
            .ok_or_else(|| AppError::Config("OMNIVORE_API_KEY is not set".to_string()))?;
        let summarizer = self
            .summarizer
            .as_deref()
            .ok_or_else(|| AppError::Config("ANTHROPIC_API_KEY is not set".to_string()))?;

        let mut report = RefreshReport {
            purged: self.engine.purge_incomplete().await?,
            ..Default::default()
        };

        let existing = match self.repo().existing_urls().await {
            Ok(urls) => urls,
            Err(e) => {
                tracing::warn!("Could not read stored URLs, skipping duplicate check: {}", e);
                HashSet::new()
            }
        };

        let now = Utc::now();
        let candidates = self.select_candidates(source, &existing, now).await?;
        report.fetched = candidates.len();
        tracing::info!(candidates = candidates.len(), "summarising new articles");

        let context = self.summary_context().await;
        let context = &context;
        let mut summaries = stream::iter(candidates)
            .map(move |article| async move {
                let text = plain_text(&article.content);
                let summary = summarizer
                    .summarize_article(&article.title, &article.url, &text, context)
                    .await;
                (article, text, summary)
            })
            .buffer_unordered(SUMMARY_CONCURRENCY);

        while let Some((article, text, summary)) = summaries.next().await {
            let summary = match summary {
                Ok(summary) => summary,
                Err(e) => {
                    tracing::warn!("Failed to summarise {}: {}", article.url, e);
                    report.failed += 1;
                    continue;
                }
            };

            let new_article = NewArticle {
                title: article.title,
                url: article.url,
                content: text,
                long_summary: Some(summary.long_summary),
                short_summary: Some(summary.short_summary),
                interest_score: summary.interest_score,
                saved_at: article.saved_at,
            };
            let url = new_article.url.clone();
            match self.engine.store_article(new_article).await {
                Ok(id) => {
                    tracing::debug!(id, %url, "stored article");
                    report.stored += 1;
                }
                Err(e) => {
                    tracing::warn!("Failed to store {}: {}", url, e);
                    report.failed += 1;
                }
            }
        }

        self.repo().record_update(now).await?;
        if report.stored > 0 {
            self.refresh_newsletter_summary(summarizer).await;
        }

        tracing::info!(
            purged = report.purged,
            fetched = report.fetched,
            stored = report.stored,
            failed = report.failed,
            "refresh finished"
        );
        Ok(RefreshOutcome::Completed(report))
    }

    /// Page-load policy: an empty store is filled before rendering, a stale
    /// one is refreshed in the background.
    pub async fn ensure_fresh(self: &Arc<Self>) -> Result<()> {
        if self.repo().list_all().await?.is_empty() {
            tracing::info!("no articles stored, refreshing before render");
            if let Err(e) = self.refresh().await {
                tracing::error!("Initial refresh failed: {}", e);
            }
            return Ok(());
        }

        let last_update = self.repo().last_update().await?;
        if is_stale(last_update, self.settings.stale_after_days, Utc::now()) {
            self.spawn_refresh();
        }
        Ok(())
    }

    pub fn spawn_refresh(self: &Arc<Self>) {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = pipeline.refresh().await {
                tracing::error!("Background refresh failed: {}", e);
            }
        });
    }

    /// Newest unseen articles from the source, widening the lookback window
    /// until there are enough of them or the window hits its ceiling.
    async fn select_candidates(
        &self,
        source: &dyn ArticleSource,
        existing: &HashSet<String>,
        now: DateTime<Utc>,
    ) -> Result<Vec<SourceArticle>> {
        let settings = &self.settings;
        let step = settings.days_to_check.max(1);
        let mut first = settings.maximum_item_count.max(1).saturating_mul(2).min(MAX_REQUEST_SIZE);
        let mut pool = fetch_unseen(source, first, existing).await?;
        let mut days = settings.days_to_check;

        loop {
            let recent = within_days(&pool, days, now);
            if recent.len() >= settings.minimum_item_count || days >= settings.maximum_days_to_check {
                return Ok(take_newest(recent, settings.maximum_item_count));
            }

            days = (days + step).min(settings.maximum_days_to_check);
            tracing::debug!(days, found = recent.len(), "widening lookback");

            let recent = within_days(&pool, days, now);
            if recent.len() < settings.minimum_item_count && recent.len() == pool.len() {
                if first >= MAX_REQUEST_SIZE {
                    tracing::warn!("Request size limit reached with {} new articles", recent.len());
                    return Ok(take_newest(recent, settings.maximum_item_count));
                }
                first = first.saturating_mul(2).min(MAX_REQUEST_SIZE);
                let refetched = fetch_unseen(source, first, existing).await?;
                let before = pool.len();
                pool = merge_by_url(pool, refetched);
                if pool.len() == before {
                    tracing::warn!("Only found {} new articles", recent.len());
                    return Ok(take_newest(recent, settings.maximum_item_count));
                }
            }
        }
    }

    /// Top-scored articles and recent preferences, shown to the model so its
    /// scores line up with the reader's taste. Errors only shrink the context.
    async fn summary_context(&self) -> SummaryContext {
        let mut context = SummaryContext::default();

        match self.engine.ranked().await {
            Ok(ranked) => {
                context.examples = ranked
                    .iter()
                    .filter(|a| a.is_complete())
                    .take(EXAMPLE_COUNT)
                    .map(|a| ScoredExample {
                        title: a.title.clone(),
                        interest_score: a.interest_score,
                        short_summary: a.short_summary_text().to_string(),
                    })
                    .collect();
            }
            Err(e) => tracing::warn!("Could not load scoring examples: {}", e),
        }

        let comparisons = match self.repo().recent(PREFERENCE_COUNT).await {
            Ok(comparisons) => comparisons,
            Err(e) => {
                tracing::warn!("Could not load recent comparisons: {}", e);
                Vec::new()
            }
        };
        for comparison in comparisons {
            let winner = self.repo().get_by_id(comparison.winning_id).await;
            let loser = self.repo().get_by_id(comparison.losing_id).await;
            if let (Ok(Some(winner)), Ok(Some(loser))) = (winner, loser) {
                context.preferences.push(PreferenceExample {
                    winner_summary: winner.short_summary_text().to_string(),
                    winner_title: winner.title,
                    loser_summary: loser.short_summary_text().to_string(),
                    loser_title: loser.title,
                });
            }
        }

        context
    }

    async fn refresh_newsletter_summary(&self, summarizer: &dyn Summarize) {
        let featured = match self.engine.ranked().await {
            Ok(ranked) => ranked
                .into_iter()
                .take(self.settings.featured_count)
                .collect::<Vec<_>>(),
            Err(e) => {
                tracing::warn!("Could not load articles for newsletter summary: {}", e);
                return;
            }
        };

        match summarizer.summarize_newsletter(&featured).await {
            Ok(summary) => {
                if let Err(e) = self.repo().save_newsletter_summary(summary).await {
                    tracing::warn!("Failed to save newsletter summary: {}", e);
                }
            }
            Err(e) => tracing::warn!("Failed to generate newsletter summary: {}", e),
        }
    }
}

/// Due when never refreshed, or when the last refresh is `stale_after_days`
/// old or more.
pub fn is_stale(last_update: Option<DateTime<Utc>>, stale_after_days: i64, now: DateTime<Utc>) -> bool {
    match last_update {
        None => true,
        Some(at) => now - at >= Duration::days(stale_after_days),
    }
}

fn plain_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), TEXT_WIDTH).unwrap_or_else(|_| html.to_string())
}

/// Fetches `first` articles and drops those already stored, unusable URLs
/// and repeats. Newest first.
async fn fetch_unseen(
    source: &dyn ArticleSource,
    first: usize,
    existing: &HashSet<String>,
) -> Result<Vec<SourceArticle>> {
    let fetched = source.recent_articles(first).await?;
    let mut seen = HashSet::new();
    let mut unseen: Vec<SourceArticle> = fetched
        .into_iter()
        .filter(|article| match canonical_url(&article.url) {
            Some(url) => !existing.contains(&url) && seen.insert(url),
            None => {
                tracing::debug!(url = %article.url, "skipping article with unusable URL");
                false
            }
        })
        .collect();
    unseen.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
    Ok(unseen)
}

fn within_days(pool: &[SourceArticle], days: i64, now: DateTime<Utc>) -> Vec<SourceArticle> {
    let cutoff = now - Duration::days(days);
    pool.iter()
        .filter(|article| article.saved_at >= cutoff)
        .cloned()
        .collect()
}

fn take_newest(mut recent: Vec<SourceArticle>, limit: usize) -> Vec<SourceArticle> {
    recent.truncate(limit);
    recent
}

fn merge_by_url(mut pool: Vec<SourceArticle>, more: Vec<SourceArticle>) -> Vec<SourceArticle> {
    let known: HashSet<String> = pool.iter().map(|a| a.url.clone()).collect();
    pool.extend(more.into_iter().filter(|a| !known.contains(&a.url)));
    pool.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::VoteDirection;
    use crate::test_support::{new_article, source_article, FakeSource, FakeSummarizer};

    fn settings() -> PipelineSettings {
        PipelineSettings {
            minimum_item_count: 3,
            maximum_item_count: 5,
            days_to_check: 7,
            maximum_days_to_check: 28,
            stale_after_days: 7,
            featured_count: 3,
        }
    }

    async fn pipeline_with(
        source: Arc<FakeSource>,
        summarizer: Arc<FakeSummarizer>,
        settings: PipelineSettings,
    ) -> (Arc<Pipeline>, Arc<RankingEngine<Repository>>) {
        let repo = Arc::new(Repository::in_memory().await.unwrap());
        let engine = Arc::new(RankingEngine::new(repo));
        let pipeline = Pipeline::new(
            Arc::clone(&engine),
            Some(source as Arc<dyn ArticleSource>),
            Some(summarizer as Arc<dyn Summarize>),
            settings,
        );
        (Arc::new(pipeline), engine)
    }

    fn report(outcome: RefreshOutcome) -> RefreshReport {
        match outcome {
            RefreshOutcome::Completed(report) => report,
            RefreshOutcome::AlreadyRunning => panic!("refresh unexpectedly skipped"),
        }
    }

    #[tokio::test]
    async fn stores_summarised_articles() {
        let source = Arc::new(FakeSource::with(vec![
            source_article("one", 1),
            source_article("two", 2),
            source_article("three", 3),
        ]));
        let (pipeline, engine) =
            pipeline_with(source, Arc::new(FakeSummarizer::default()), settings()).await;

        let report = report(pipeline.refresh().await.unwrap());
        assert_eq!(report.fetched, 3);
        assert_eq!(report.stored, 3);
        assert_eq!(report.failed, 0);

        let stored = engine.ranked().await.unwrap();
        assert_eq!(stored.len(), 3);
        assert!(stored.iter().all(|a| a.is_complete()));
        assert!(stored[0].content.contains("Body of"));
        assert!(!stored[0].content.contains("<p>"));

        let repo = engine.repository();
        assert!(repo.last_update().await.unwrap().is_some());
        let summary = repo.latest_newsletter_summary().await.unwrap().unwrap();
        assert_eq!(summary.summary, "This week: 3 articles.");
    }

    #[tokio::test]
    async fn failed_summaries_are_skipped() {
        let source = Arc::new(FakeSource::with(vec![
            source_article("good", 1),
            source_article("bad", 2),
        ]));
        let summarizer = Arc::new(FakeSummarizer {
            failing: ["Source bad".to_string()].into_iter().collect(),
            ..Default::default()
        });
        let (pipeline, engine) = pipeline_with(source, summarizer, settings()).await;

        let report = report(pipeline.refresh().await.unwrap());
        assert_eq!(report.stored, 1);
        assert_eq!(report.failed, 1);

        let stored = engine.ranked().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].title, "Source good");
    }

    #[tokio::test]
    async fn newsletter_failure_is_not_fatal() {
        let source = Arc::new(FakeSource::with(vec![source_article("one", 1)]));
        let summarizer = Arc::new(FakeSummarizer {
            newsletter_fails: true,
            ..Default::default()
        });
        let (pipeline, engine) = pipeline_with(source, summarizer, settings()).await;

        assert_eq!(report(pipeline.refresh().await.unwrap()).stored, 1);
        let repo = engine.repository();
        assert!(repo.latest_newsletter_summary().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn already_stored_urls_are_not_refetched() {
        let source = Arc::new(FakeSource::with(vec![
            source_article("known", 1),
            source_article("fresh", 1),
        ]));
        let (pipeline, engine) =
            pipeline_with(source, Arc::new(FakeSummarizer::default()), settings()).await;
        engine
            .store_article(new_article("https://news.example.com/known", 12.0))
            .await
            .unwrap();

        let report = report(pipeline.refresh().await.unwrap());
        assert_eq!(report.fetched, 1);

        let known = engine
            .ranked()
            .await
            .unwrap()
            .into_iter()
            .find(|a| a.url == "https://news.example.com/known")
            .unwrap();
        assert_eq!(known.interest_score, 12.0);
    }

    #[tokio::test]
    async fn lookback_widens_until_enough_articles() {
        let source = Arc::new(FakeSource::with(vec![
            source_article("a", 1),
            source_article("b", 10),
            source_article("c", 20),
            source_article("d", 40),
        ]));
        let (pipeline, _) = pipeline_with(
            Arc::clone(&source),
            Arc::new(FakeSummarizer::default()),
            settings(),
        )
        .await;

        let report = report(pipeline.refresh().await.unwrap());
        // 7 days finds one, 14 finds two, 21 finds three. The 40-day-old
        // article stays out.
        assert_eq!(report.fetched, 3);
    }

    #[tokio::test]
    async fn lookback_requeries_with_a_larger_page() {
        let source = Arc::new(FakeSource::with(
            (0..12).map(|i| source_article(&format!("a{i}"), 20)).collect(),
        ));
        let settings = PipelineSettings {
            minimum_item_count: 6,
            maximum_item_count: 2,
            ..settings()
        };
        let (pipeline, _) = pipeline_with(
            Arc::clone(&source),
            Arc::new(FakeSummarizer::default()),
            settings,
        )
        .await;

        let report = report(pipeline.refresh().await.unwrap());
        assert_eq!(report.fetched, 2);
        let requested = source.requested();
        assert_eq!(requested, vec![4, 8]);
    }

    #[tokio::test]
    async fn lookback_stops_when_the_source_is_exhausted() {
        let source = Arc::new(FakeSource::with(vec![
            source_article("a", 1),
            source_article("b", 1),
        ]));
        let settings = PipelineSettings {
            minimum_item_count: 10,
            days_to_check: 1,
            maximum_days_to_check: 200,
            ..settings()
        };
        let (pipeline, _) = pipeline_with(
            Arc::clone(&source),
            Arc::new(FakeSummarizer::default()),
            settings,
        )
        .await;

        let report = report(pipeline.refresh().await.unwrap());
        assert_eq!(report.fetched, 2);
        assert_eq!(source.requested(), vec![10, 20]);
    }

    #[tokio::test]
    async fn lookback_never_asks_for_more_than_the_request_limit() {
        let source = Arc::new(FakeSource::with(
            (0..1200).map(|i| source_article(&format!("a{i}"), 1)).collect(),
        ));
        let settings = PipelineSettings {
            minimum_item_count: 1500,
            maximum_item_count: 600,
            days_to_check: 1,
            maximum_days_to_check: 56,
            ..settings()
        };
        let (pipeline, _) = pipeline_with(
            Arc::clone(&source),
            Arc::new(FakeSummarizer::default()),
            settings,
        )
        .await;

        let report = report(pipeline.refresh().await.unwrap());
        assert_eq!(report.fetched, 600);
        assert_eq!(source.requested(), vec![MAX_REQUEST_SIZE]);
    }

    #[tokio::test]
    async fn lookback_stops_at_the_ceiling() {
        let source = Arc::new(FakeSource::with(vec![
            source_article("a", 1),
            source_article("old", 100),
        ]));
        let (pipeline, _) =
            pipeline_with(source, Arc::new(FakeSummarizer::default()), settings()).await;

        assert_eq!(report(pipeline.refresh().await.unwrap()).fetched, 1);
    }

    #[tokio::test]
    async fn source_failure_is_an_error() {
        let source = Arc::new(FakeSource {
            fail: true,
            ..Default::default()
        });
        let (pipeline, _) =
            pipeline_with(source, Arc::new(FakeSummarizer::default()), settings()).await;

        let err = pipeline.refresh().await.unwrap_err();
        assert!(matches!(err, AppError::OmnivoreApi(_)));
    }

    #[tokio::test]
    async fn refresh_without_credentials_is_a_config_error() {
        let repo = Arc::new(Repository::in_memory().await.unwrap());
        let engine = Arc::new(RankingEngine::new(repo));
        let pipeline = Pipeline::new(engine, None, None, settings());
        assert!(matches!(pipeline.refresh().await, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn concurrent_refresh_reports_already_running() {
        let source = Arc::new(FakeSource::with(vec![source_article("one", 1)]));
        let (pipeline, _) =
            pipeline_with(source, Arc::new(FakeSummarizer::default()), settings()).await;

        let _held = pipeline.running.lock().await;
        assert_eq!(pipeline.refresh().await.unwrap(), RefreshOutcome::AlreadyRunning);
    }

    #[tokio::test]
    async fn refresh_purges_incomplete_rows() {
        let source = Arc::new(FakeSource::default());
        let (pipeline, engine) =
            pipeline_with(source, Arc::new(FakeSummarizer::default()), settings()).await;
        let mut half_done = new_article("https://example.com/half", 3.0);
        half_done.long_summary = None;
        engine.store_article(half_done).await.unwrap();

        let report = report(pipeline.refresh().await.unwrap());
        assert_eq!(report.purged, 1);
        assert!(engine.ranked().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn context_carries_examples_and_preferences() {
        let source = Arc::new(FakeSource::with(vec![source_article("new", 1)]));
        let summarizer = Arc::new(FakeSummarizer::default());
        let (pipeline, engine) =
            pipeline_with(source, Arc::clone(&summarizer), settings()).await;

        let a = engine
            .store_article(new_article("https://example.com/a", 60.0))
            .await
            .unwrap();
        engine
            .store_article(new_article("https://example.com/b", 50.0))
            .await
            .unwrap();
        engine.vote(a, VoteDirection::Down).await.unwrap();

        report(pipeline.refresh().await.unwrap());

        let contexts = summarizer.contexts.lock().unwrap();
        let context = &contexts[0];
        assert_eq!(context.examples.len(), 2);
        assert_eq!(context.preferences.len(), 1);
        assert_eq!(context.preferences[0].loser_title, "Title for https://example.com/a");
    }

    #[test]
    fn staleness() {
        let now = Utc::now();
        assert!(is_stale(None, 7, now));
        assert!(is_stale(Some(now - Duration::days(8)), 7, now));
        assert!(!is_stale(Some(now - Duration::days(2)), 7, now));
    }
}
