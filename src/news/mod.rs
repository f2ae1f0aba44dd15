// src/news/mod.rs
pub mod feed;
pub mod store;

pub use feed::{FeedPage, FeedQuery, FeedReader};
pub use store::{ClearSummary, IngestSummary, NewsStore};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::db::parse_datetime;

/// Lowest market-impact score the producer may assign.
pub const SCORE_MIN: i32 = -10;
/// Highest market-impact score the producer may assign.
pub const SCORE_MAX: i32 = 10;

/// One analyzed news record as produced upstream, before persistence.
/// `url` is the natural identity used for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsEntity {
    pub title: String,
    pub summary: String,
    pub url: String,
    pub published_at: Option<NaiveDate>,
    pub score: i32,
    pub tickers: Vec<String>,
}

/// A durably stored news record. `id` is strictly increasing in insertion
/// order (never reused), which makes it usable as a pagination cursor.
#[derive(Debug, Clone, Serialize)]
pub struct PersistedNews {
    pub id: i64,
    pub title: String,
    pub summary: String,
    pub url: String,
    pub published_at: Option<NaiveDate>,
    pub score: i32,
    pub tickers: Vec<String>,
    pub saved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Raw row shape shared by the store and the feed reader.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct NewsRow {
    pub id: i64,
    pub title: String,
    pub summary: String,
    pub url: String,
    pub published_at: Option<String>,
    pub score: i64,
    pub tickers: String,
    pub saved: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<NewsRow> for PersistedNews {
    fn from(row: NewsRow) -> Self {
        PersistedNews {
            id: row.id,
            title: row.title,
            summary: row.summary,
            url: row.url,
            published_at: row
                .published_at
                .and_then(|s| s.parse::<NaiveDate>().ok()),
            score: row.score as i32,
            tickers: serde_json::from_str(&row.tickers).unwrap_or_default(),
            saved: row.saved,
            created_at: parse_datetime(&row.created_at).unwrap_or_else(Utc::now),
            updated_at: parse_datetime(&row.updated_at).unwrap_or_else(Utc::now),
        }
    }
}

/// Column list matching `NewsRow`, kept in one place for the two readers.
pub(crate) const NEWS_COLUMNS: &str =
    "id, title, summary, url, published_at, score, tickers, saved, created_at, updated_at";
