use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Article {0} not found")]
    NotFound(i64),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Claude API error: {0}")]
    ClaudeApi(String),

    #[error("Omnivore API error: {0}")]
    OmnivoreApi(String),

    #[error("Slack API error: {0}")]
    SlackApi(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// True for failures of a third-party service (summariser, article
    /// source, chat API) as opposed to our own storage or logic.
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            AppError::Http(_)
                | AppError::ClaudeApi(_)
                | AppError::OmnivoreApi(_)
                | AppError::SlackApi(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
