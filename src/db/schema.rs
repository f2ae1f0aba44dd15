//! Database schema and migrations.
//!
//! Migrations are applied sequentially; the `schema_version` table tracks
//! which ones have run.

/// Database migrations, executed in order.
pub const MIGRATIONS: &[&str] = &[
    // v1: news table. AUTOINCREMENT keeps ids strictly increasing and
    // never reused, which the feed cursor depends on.
    r#"
CREATE TABLE news (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    title        TEXT NOT NULL,
    summary      TEXT NOT NULL,
    url          TEXT NOT NULL UNIQUE,
    published_at TEXT,                        -- producer-supplied date, may be absent
    score        INTEGER NOT NULL DEFAULT 0,  -- -10..10 market impact
    tickers      TEXT NOT NULL DEFAULT '[]',  -- JSON array of symbols
    saved        INTEGER NOT NULL DEFAULT 0,  -- user pin flag, curated externally
    created_at   TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at   TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX idx_news_score ON news(score);
"#,
    // v2: registered push devices
    r#"
CREATE TABLE devices (
    device_uuid TEXT PRIMARY KEY,
    push_token  TEXT NOT NULL,
    is_active   INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX idx_devices_active ON devices(is_active);
"#,
];
