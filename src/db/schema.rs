pub const SCHEMA: &str = r#"
-- articles table; id is derived from the canonical URL
CREATE TABLE IF NOT EXISTS articles (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    url TEXT NOT NULL UNIQUE,
    content TEXT NOT NULL DEFAULT '',
    long_summary TEXT,
    short_summary TEXT,
    interest_score REAL NOT NULL DEFAULT 0,
    saved_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_articles_interest_score ON articles(interest_score DESC, saved_at DESC);

-- comparisons table (append-only)
CREATE TABLE IF NOT EXISTS comparisons (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    winning_id INTEGER NOT NULL,
    losing_id INTEGER NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- last_update table; the newest row wins
CREATE TABLE IF NOT EXISTS last_update (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    update_date TEXT NOT NULL
);

-- newsletter_summaries table; the newest row is displayed
CREATE TABLE IF NOT EXISTS newsletter_summaries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    date TEXT NOT NULL,
    summary TEXT NOT NULL
);
"#;
