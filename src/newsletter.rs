//! The weekly newsletter: a markdown digest for the terminal and a
//! standalone HTML document for download.

use std::fmt::Write as _;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::db::Repository;
use crate::error::Result;
use crate::models::Article;
use crate::ranking::{tiered, RankingEngine, Tier};
use crate::web::views;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewsletterLayout {
    pub long_count: usize,
    pub short_count: usize,
    pub days_to_check: i64,
}

impl NewsletterLayout {
    pub fn from_config(config: &Config) -> Self {
        let (long_count, short_count) = config.tier_counts();
        Self {
            long_count,
            short_count,
            days_to_check: config.days_to_check,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Newsletter {
    pub date: DateTime<Utc>,
    pub summary: Option<String>,
    /// Highest interest first.
    pub articles: Vec<Article>,
    pub layout: NewsletterLayout,
}

impl Newsletter {
    pub async fn assemble(
        engine: &RankingEngine<Repository>,
        layout: NewsletterLayout,
        date: DateTime<Utc>,
    ) -> Result<Self> {
        let articles = engine.ranked().await?;
        let summary = engine
            .repository()
            .latest_newsletter_summary()
            .await?
            .map(|s| s.summary);
        Ok(Self {
            date,
            summary,
            articles,
            layout,
        })
    }

    pub fn intro(&self) -> String {
        format!(
            "This newsletter summarises articles read and shared in the past {} days. Generated on {}.",
            self.layout.days_to_check,
            self.date.format("%Y-%m-%d")
        )
    }

    pub fn tiers(&self) -> Vec<(Tier, &Article)> {
        tiered(&self.articles, self.layout.long_count, self.layout.short_count)
    }

    pub fn markdown(&self) -> String {
        let mut out = format!("*{}*\n\n", self.intro());
        if let Some(summary) = &self.summary {
            let _ = write!(out, "{}\n\n", summary.trim());
        }

        let tiers = self.tiers();
        out.push_str("## Featured Articles\n\n");
        for (_, article) in tiers.iter().filter(|(tier, _)| *tier == Tier::Long) {
            let _ = write!(
                out,
                "### [{}]({})\n\n{}\n\n",
                article.title,
                article.url,
                article.long_summary_text()
            );
        }

        out.push_str("## Quick Reads\n\n");
        for (_, article) in tiers.iter().filter(|(tier, _)| *tier == Tier::Short) {
            let _ = write!(
                out,
                "- **[{}]({})**: {}\n\n",
                article.title,
                article.url,
                article.short_summary_text()
            );
        }

        out.push_str("## Also Worth Checking\n\n");
        for (_, article) in tiers.iter().filter(|(tier, _)| *tier == Tier::Link) {
            let _ = writeln!(out, "- [{}]({})", article.title, article.url);
        }
        out
    }

    pub fn html(&self) -> String {
        views::newsletter_document(self)
    }

    pub fn file_name(&self) -> String {
        format!("newsletter_{}.html", self.date.format("%Y-%m-%d"))
    }
}

pub async fn write_cache(path: &Path, html: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, html).await?;
    Ok(())
}

pub async fn read_cache(path: &Path) -> Option<String> {
    tokio::fs::read_to_string(path).await.ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{article, fixed_now};
    use tempfile::TempDir;

    fn newsletter(count: i64) -> Newsletter {
        Newsletter {
            date: fixed_now(),
            summary: Some("A strong week for agents.".to_string()),
            articles: (1..=count).map(|i| article(i, (100 - i) as f64)).collect(),
            layout: NewsletterLayout {
                long_count: 2,
                short_count: 2,
                days_to_check: 14,
            },
        }
    }

    #[test]
    fn markdown_has_three_sections_in_rank_order() {
        let md = newsletter(6).markdown();

        assert!(md.starts_with("*This newsletter summarises articles read and shared in the past 14 days. Generated on 2026-10-16.*"));
        assert!(md.contains("A strong week for agents."));

        let featured = md.find("## Featured Articles").unwrap();
        let quick = md.find("## Quick Reads").unwrap();
        let also = md.find("## Also Worth Checking").unwrap();
        assert!(featured < quick && quick < also);

        assert!(md[featured..quick].contains("### [Article 1](https://example.com/1)"));
        assert!(md[featured..quick].contains("Long summary of article 2."));
        assert!(md[quick..also].contains("- **[Article 3](https://example.com/3)**: Short summary of article 3."));
        assert!(md[also..].contains("- [Article 6](https://example.com/6)"));
        assert!(!md[also..].contains("Article 4]"));
    }

    #[test]
    fn short_lists_leave_later_sections_empty() {
        let md = newsletter(1).markdown();
        let quick = md.find("## Quick Reads").unwrap();
        assert!(md[..quick].contains("Article 1"));
        assert!(!md[quick..].contains("Article"));
    }

    #[test]
    fn html_document_escapes_content() {
        let mut letter = newsletter(2);
        letter.articles[0].title = "Bits & <Bytes>".to_string();
        let html = letter.html();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("Bits &amp; &lt;Bytes&gt;"));
        assert!(html.contains("A strong week for agents."));
        assert_eq!(letter.file_name(), "newsletter_2026-10-16.html");
    }

    #[tokio::test]
    async fn cache_round_trips_through_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("newsletter.html");
        assert!(read_cache(&path).await.is_none());

        write_cache(&path, "<p>hi</p>").await.unwrap();
        assert_eq!(read_cache(&path).await.as_deref(), Some("<p>hi</p>"));
    }
}
