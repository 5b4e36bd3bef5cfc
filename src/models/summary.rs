use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the summariser returns for a single article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleSummary {
    pub interest_score: f64,
    pub short_summary: String,
    pub long_summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsletterSummary {
    pub id: i64,
    pub date: DateTime<Utc>,
    pub summary: String,
}
