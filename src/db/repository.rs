use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};
use crate::models::{article_id_for_url, Article, Comparison, NewArticle, NewsletterSummary};

use super::schema::SCHEMA;
use super::{ArticleRepository, ComparisonRepository};

const ARTICLE_COLUMNS: &str =
    "id, title, url, content, long_summary, short_summary, interest_score, saved_at";

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Refresh bookkeeping

    pub async fn last_update(&self) -> Result<Option<DateTime<Utc>>> {
        let last = self
            .conn
            .call(|conn| {
                let value = conn
                    .query_row(
                        "SELECT update_date FROM last_update ORDER BY id DESC LIMIT 1",
                        [],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?;
                Ok(value)
            })
            .await?;
        Ok(last.and_then(|s| parse_datetime(&s)))
    }

    pub async fn record_update(&self, at: DateTime<Utc>) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO last_update (update_date) VALUES (?1)",
                    params![at.to_rfc3339()],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Newsletter summaries

    pub async fn latest_newsletter_summary(&self) -> Result<Option<NewsletterSummary>> {
        let summary = self
            .conn
            .call(|conn| {
                let summary = conn
                    .query_row(
                        "SELECT id, date, summary FROM newsletter_summaries ORDER BY id DESC LIMIT 1",
                        [],
                        newsletter_summary_from_row,
                    )
                    .optional()?;
                Ok(summary)
            })
            .await?;
        Ok(summary)
    }

    pub async fn save_newsletter_summary(&self, summary: String) -> Result<i64> {
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO newsletter_summaries (date, summary) VALUES (?1, ?2)",
                    params![Utc::now().to_rfc3339(), summary],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }
}

#[async_trait]
impl ArticleRepository for Repository {
    async fn upsert(&self, article: NewArticle) -> Result<i64> {
        let url = article.validate().map_err(AppError::Validation)?;

        let id = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                let existing: Option<i64> = tx
                    .query_row("SELECT id FROM articles WHERE url = ?1", params![url], |row| {
                        row.get(0)
                    })
                    .optional()?;

                let id = match existing {
                    Some(id) => id,
                    None => {
                        // A taken id here belongs to a different URL, so probe forward.
                        let mut id = article_id_for_url(&url);
                        while tx
                            .query_row("SELECT 1 FROM articles WHERE id = ?1", params![id], |_| Ok(()))
                            .optional()?
                            .is_some()
                        {
                            id = id.wrapping_add(1) & i64::MAX;
                        }
                        id
                    }
                };

                tx.execute(
                    r#"INSERT INTO articles (id, title, url, content, long_summary, short_summary, interest_score, saved_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                       ON CONFLICT(id) DO UPDATE SET
                           title = excluded.title,
                           content = excluded.content,
                           long_summary = excluded.long_summary,
                           short_summary = excluded.short_summary,
                           interest_score = excluded.interest_score"#,
                    params![
                        id,
                        article.title,
                        url,
                        article.content,
                        article.long_summary,
                        article.short_summary,
                        article.interest_score,
                        article.saved_at.to_rfc3339(),
                    ],
                )?;
                tx.commit()?;
                Ok(id)
            })
            .await?;
        Ok(id)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Article>> {
        let article = self
            .conn
            .call(move |conn| {
                let article = conn
                    .query_row(
                        &format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = ?1"),
                        params![id],
                        article_from_row,
                    )
                    .optional()?;
                Ok(article)
            })
            .await?;
        Ok(article)
    }

    async fn list_all(&self) -> Result<Vec<Article>> {
        let articles = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ARTICLE_COLUMNS} FROM articles ORDER BY interest_score DESC, saved_at DESC"
                ))?;
                let articles = stmt
                    .query_map([], article_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    async fn update_score(&self, id: i64, score: f64) -> Result<()> {
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE articles SET interest_score = ?1 WHERE id = ?2",
                    params![score, id],
                )?;
                Ok(changed)
            })
            .await?;
        if changed == 0 {
            return Err(AppError::NotFound(id));
        }
        Ok(())
    }

    async fn purge_incomplete(&self) -> Result<usize> {
        let purged = self
            .conn
            .call(|conn| {
                let purged = conn.execute(
                    r#"DELETE FROM articles
                       WHERE long_summary IS NULL OR TRIM(long_summary) = ''
                          OR short_summary IS NULL OR TRIM(short_summary) = ''"#,
                    [],
                )?;
                Ok(purged)
            })
            .await?;
        Ok(purged)
    }

    async fn existing_urls(&self) -> Result<HashSet<String>> {
        let urls = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT url FROM articles")?;
                let urls = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<HashSet<_>, _>>()?;
                Ok(urls)
            })
            .await?;
        Ok(urls)
    }
}

#[async_trait]
impl ComparisonRepository for Repository {
    async fn append(&self, winning_id: i64, losing_id: i64) -> Result<i64> {
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO comparisons (winning_id, losing_id) VALUES (?1, ?2)",
                    params![winning_id, losing_id],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    async fn record_ranking(&self, scores: Vec<(i64, f64)>, pairs: Vec<(i64, i64)>) -> Result<usize> {
        let (missing, logged) = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt =
                        tx.prepare("UPDATE articles SET interest_score = ?1 WHERE id = ?2")?;
                    for (id, score) in scores {
                        if stmt.execute(params![score, id])? == 0 {
                            return Ok((Some(id), 0));
                        }
                    }
                }
                let mut logged = 0;
                {
                    let mut stmt = tx
                        .prepare("INSERT INTO comparisons (winning_id, losing_id) VALUES (?1, ?2)")?;
                    for (winning_id, losing_id) in pairs {
                        logged += stmt.execute(params![winning_id, losing_id])?;
                    }
                }
                tx.commit()?;
                Ok((None, logged))
            })
            .await?;
        match missing {
            Some(id) => Err(AppError::NotFound(id)),
            None => Ok(logged),
        }
    }

    async fn recent(&self, limit: usize) -> Result<Vec<Comparison>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let comparisons = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, winning_id, losing_id FROM comparisons ORDER BY id DESC LIMIT ?1",
                )?;
                let comparisons = stmt
                    .query_map(params![limit], |row| {
                        Ok(Comparison {
                            id: row.get(0)?,
                            winning_id: row.get(1)?,
                            losing_id: row.get(2)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(comparisons)
            })
            .await?;
        Ok(comparisons)
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    // Bare dates from older rows (e.g., "2026-01-11")
    if let Ok(date) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    None
}

fn article_from_row(row: &Row) -> rusqlite::Result<Article> {
    let id: i64 = row.get(0)?;
    let raw_saved_at: String = row.get(7)?;
    // Unreadable dates read as the epoch
    let saved_at = parse_datetime(&raw_saved_at).unwrap_or_else(|| {
        tracing::warn!(id, saved_at = %raw_saved_at, "unparseable saved_at, treating as epoch");
        DateTime::<Utc>::UNIX_EPOCH
    });
    Ok(Article {
        id,
        title: row.get(1)?,
        url: row.get(2)?,
        content: row.get(3)?,
        long_summary: row.get(4)?,
        short_summary: row.get(5)?,
        interest_score: row.get(6)?,
        saved_at,
    })
}

fn newsletter_summary_from_row(row: &Row) -> rusqlite::Result<NewsletterSummary> {
    Ok(NewsletterSummary {
        id: row.get(0)?,
        date: row
            .get::<_, String>(1)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        summary: row.get(2)?,
    })
}
