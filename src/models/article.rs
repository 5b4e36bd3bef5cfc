use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub content: String,
    pub long_summary: Option<String>,
    pub short_summary: Option<String>,
    pub interest_score: f64,
    pub saved_at: DateTime<Utc>,
}

impl Article {
    /// Rows written before a summary arrived are incomplete and get purged.
    pub fn is_complete(&self) -> bool {
        let filled = |s: &Option<String>| s.as_deref().is_some_and(|s| !s.trim().is_empty());
        filled(&self.long_summary) && filled(&self.short_summary)
    }

    pub fn short_summary_text(&self) -> &str {
        self.short_summary.as_deref().unwrap_or_default()
    }

    pub fn long_summary_text(&self) -> &str {
        self.long_summary.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewArticle {
    pub title: String,
    pub url: String,
    pub content: String,
    pub long_summary: Option<String>,
    pub short_summary: Option<String>,
    pub interest_score: f64,
    pub saved_at: DateTime<Utc>,
}

impl NewArticle {
    /// Checks the record before it reaches storage and returns the
    /// canonical form of its URL.
    pub fn validate(&self) -> std::result::Result<String, String> {
        if self.title.trim().is_empty() {
            return Err("article title is empty".to_string());
        }
        if !self.interest_score.is_finite() {
            return Err(format!("interest score {} is not finite", self.interest_score));
        }
        canonical_url(&self.url).ok_or_else(|| format!("{:?} is not an http(s) URL", self.url))
    }
}

/// Normalises a URL as pasted into chat: surrounding quotes and the stray
/// trailing `>` Slack leaves behind are dropped, a missing scheme becomes
/// `http://`, and the fragment is removed.
pub fn canonical_url(raw: &str) -> Option<String> {
    let trimmed = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim_start_matches('<')
        .trim_end_matches('>');
    if trimmed.is_empty() {
        return None;
    }

    let mut url = match Url::parse(trimmed) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => url,
        // `host:port/path` parses with the host as its scheme
        Ok(url) if has_port_after_scheme(trimmed, url.scheme()) => {
            Url::parse(&format!("http://{trimmed}")).ok()?
        }
        Ok(_) => return None,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(&format!("http://{trimmed}")).ok()?
        }
        Err(_) => return None,
    };
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }
    url.set_fragment(None);
    Some(url.to_string())
}

fn has_port_after_scheme(raw: &str, scheme: &str) -> bool {
    raw.get(scheme.len() + 1..)
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c.is_ascii_digit())
}

/// Stable, well-distributed id for a canonical URL: the first eight bytes of
/// its SHA-256 digest, kept positive so it fits SQLite's INTEGER key.
pub fn article_id_for_url(canonical: &str) -> i64 {
    let digest = Sha256::digest(canonical.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(bytes) & i64::MAX as u64) as i64
}
