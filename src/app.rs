use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;

use crate::ai::{Summarize, Summarizer};
use crate::config::Config;
use crate::db::Repository;
use crate::error::Result;
use crate::newsletter::{self, Newsletter, NewsletterLayout};
use crate::pipeline::{Pipeline, PipelineSettings};
use crate::ranking::{PresentationPolicy, RankingEngine};
use crate::services::{ArticleSource, OmnivoreClient, SlackClient};

/// Everything a request handler or CLI command needs, wired once at startup.
pub struct App {
    pub config: Config,
    pub engine: Arc<RankingEngine<Repository>>,
    pub pipeline: Arc<Pipeline>,
    pub source: Option<Arc<dyn ArticleSource>>,
    pub slack: Option<Arc<SlackClient>>,
    pub presentation: PresentationPolicy,
    pub newsletter_layout: NewsletterLayout,
}

impl App {
    pub async fn new(config: Config) -> Result<Self> {
        let repository = Repository::new(&config.db_path).await?;

        let source = match &config.omnivore_api_key {
            Some(key) => Some(Arc::new(OmnivoreClient::new(key.clone())?) as Arc<dyn ArticleSource>),
            None => {
                tracing::warn!("OMNIVORE_API_KEY not set; refresh and chat saves are disabled");
                None
            }
        };

        let summarizer = match &config.anthropic_api_key {
            Some(key) => Some(Arc::new(Summarizer::new(key.clone())?) as Arc<dyn Summarize>),
            None => {
                tracing::warn!("ANTHROPIC_API_KEY not set; new articles cannot be summarised");
                None
            }
        };

        let slack = match &config.slack_bot_token {
            Some(token) => Some(Arc::new(SlackClient::new(token.clone())?)),
            None => None,
        };

        Ok(Self::with_services(config, repository, source, summarizer, slack))
    }

    pub fn with_services(
        config: Config,
        repository: Repository,
        source: Option<Arc<dyn ArticleSource>>,
        summarizer: Option<Arc<dyn Summarize>>,
        slack: Option<Arc<SlackClient>>,
    ) -> Self {
        let engine = Arc::new(RankingEngine::new(Arc::new(repository)));
        let pipeline = Arc::new(Pipeline::new(
            Arc::clone(&engine),
            source.clone(),
            summarizer,
            PipelineSettings::from_config(&config),
        ));

        Self {
            presentation: PresentationPolicy::from_config(&config),
            newsletter_layout: NewsletterLayout::from_config(&config),
            config,
            engine,
            pipeline,
            source,
            slack,
        }
    }

    pub fn repository(&self) -> &Repository {
        self.engine.repository()
    }

    pub async fn newsletter(&self) -> Result<Newsletter> {
        Newsletter::assemble(&self.engine, self.newsletter_layout, Utc::now()).await
    }

    pub fn newsletter_path(&self) -> PathBuf {
        PathBuf::from(&self.config.newsletter_path)
    }

    /// Renders the newsletter document and refreshes the on-disk copy.
    pub async fn write_newsletter(&self) -> Result<(String, String)> {
        let letter = self.newsletter().await?;
        if letter.articles.is_empty() {
            return Err(anyhow::anyhow!("no articles to put in a newsletter").into());
        }

        let html = letter.html();
        newsletter::write_cache(&self.newsletter_path(), &html).await?;
        tracing::info!(path = %self.config.newsletter_path, "wrote newsletter");
        Ok((letter.file_name(), html))
    }
}
