//! Cursor-paginated feed reader.
//!
//! Pages are keyed by the last-seen row id rather than an offset, so they
//! stay stable while the ingest pipeline inserts at the head. Read
//! back-to-back from an unchanging store, pages are disjoint and their
//! union is exactly the filtered set, in strictly descending id order.

use serde::{Deserialize, Serialize};
use sqlx::QueryBuilder;

use super::{NewsRow, PersistedNews, NEWS_COLUMNS, SCORE_MAX, SCORE_MIN};
use crate::db::DbPool;
use crate::error::{NotifierError, Result};

pub const DEFAULT_PAGE_LIMIT: i64 = 20;
pub const MAX_PAGE_LIMIT: i64 = 100;

/// Caller-supplied feed filters. All fields optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedQuery {
    /// Last news id from the previous page; next page is strictly older.
    pub cursor_id: Option<i64>,
    pub limit: Option<i64>,
    /// Inclusive score bounds, each within -10..=10.
    pub min_score: Option<i32>,
    pub max_score: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedPage {
    pub items: Vec<PersistedNews>,
    pub next_cursor_id: Option<i64>,
    pub has_more: bool,
    pub limit: i64,
}

/// Read-only view over the news table, independent of the ingest path.
pub struct FeedReader<'a> {
    pool: &'a DbPool,
}

impl<'a> FeedReader<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    pub async fn page(&self, query: &FeedQuery) -> Result<FeedPage> {
        let limit = validate(query)?;

        let mut qb = QueryBuilder::new(format!("SELECT {NEWS_COLUMNS} FROM news WHERE 1=1"));
        if let Some(min) = query.min_score {
            qb.push(" AND score >= ").push_bind(min as i64);
        }
        if let Some(max) = query.max_score {
            qb.push(" AND score <= ").push_bind(max as i64);
        }
        if let Some(cursor) = query.cursor_id {
            qb.push(" AND id < ").push_bind(cursor);
        }
        // Fetch one extra row to learn whether another page exists.
        qb.push(" ORDER BY id DESC LIMIT ").push_bind(limit + 1);

        let rows: Vec<NewsRow> = qb.build_query_as().fetch_all(self.pool).await?;

        let (rows, has_more) = trim_to_limit(rows, limit);
        let next_cursor_id = if has_more {
            rows.last().map(|r| r.id)
        } else {
            None
        };

        Ok(FeedPage {
            items: rows.into_iter().map(PersistedNews::from).collect(),
            next_cursor_id,
            has_more,
            limit,
        })
    }
}

/// Reject bad bounds before touching the database; clamp the page size.
fn validate(query: &FeedQuery) -> Result<i64> {
    for (name, value) in [("min_score", query.min_score), ("max_score", query.max_score)] {
        if let Some(v) = value {
            if !(SCORE_MIN..=SCORE_MAX).contains(&v) {
                return Err(NotifierError::Validation(format!(
                    "{name} must be between {SCORE_MIN} and {SCORE_MAX}, got {v}"
                )));
            }
        }
    }
    if let (Some(min), Some(max)) = (query.min_score, query.max_score) {
        if min > max {
            return Err(NotifierError::Validation(format!(
                "min_score ({min}) must not exceed max_score ({max})"
            )));
        }
    }
    Ok(query.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT))
}

/// Queries fetch `limit + 1` rows; drop the sentinel and report whether
/// more pages exist.
fn trim_to_limit<T>(mut rows: Vec<T>, limit: i64) -> (Vec<T>, bool) {
    let has_more = rows.len() as i64 > limit;
    if has_more {
        rows.truncate(limit as usize);
    }
    (rows, has_more)
}
