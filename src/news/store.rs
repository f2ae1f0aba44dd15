//! Deduplicating news store.
//!
//! Ingest is processed per item so one bad row never rolls back the rest
//! of a producer batch. The UNIQUE constraint on `url` is the safety net
//! for concurrent ingests of the same item: exactly one insert wins, the
//! loser is counted as a duplicate.

use metrics::counter;
use serde::Serialize;
use tracing::{debug, error, info};

use super::{NewsEntity, NewsRow, PersistedNews, NEWS_COLUMNS};
use crate::db::DbPool;
use crate::error::Result;

/// Outcome counts of one ingest batch.
/// Invariant: `total_processed == saved + skipped_duplicates + failed`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub total_processed: usize,
    pub saved: usize,
    pub skipped_duplicates: usize,
    pub failed: usize,
}

/// Result of the administrative bulk clear, counted atomically.
#[derive(Debug, Clone, Serialize)]
pub struct ClearSummary {
    pub records_deleted: i64,
    pub count_before: i64,
    pub count_after: i64,
}

/// Repository owning all writes to the `news` table.
pub struct NewsStore<'a> {
    pool: &'a DbPool,
}

impl<'a> NewsStore<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Persist a normalized batch with duplicate prevention.
    ///
    /// Each entity is looked up by url first; an insert racing another
    /// ingest of the same url is detected via the unique violation and
    /// counted as a duplicate, not a failure. Any other persistence error
    /// affects only that item.
    pub async fn ingest(&self, entities: &[NewsEntity]) -> IngestSummary {
        let mut summary = IngestSummary {
            total_processed: entities.len(),
            ..Default::default()
        };

        for entity in entities {
            match self.exists_by_url(&entity.url).await {
                Ok(true) => {
                    debug!(url = %entity.url, "skipping duplicate news");
                    summary.skipped_duplicates += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    error!(url = %entity.url, error = %e, "duplicate pre-check failed");
                    summary.failed += 1;
                    continue;
                }
            }

            match self.insert(entity).await {
                Ok(id) => {
                    debug!(url = %entity.url, id, "saved news analysis");
                    summary.saved += 1;
                }
                Err(e) if is_unique_violation(&e) => {
                    debug!(url = %entity.url, "duplicate url detected on insert, skipping");
                    summary.skipped_duplicates += 1;
                }
                Err(e) => {
                    error!(url = %entity.url, error = %e, "failed to save news analysis");
                    summary.failed += 1;
                }
            }
        }

        counter!("news_ingest_saved_total").increment(summary.saved as u64);
        counter!("news_ingest_duplicates_total").increment(summary.skipped_duplicates as u64);
        counter!("news_ingest_failed_total").increment(summary.failed as u64);
        info!(?summary, "news ingest completed");
        summary
    }

    async fn exists_by_url(&self, url: &str) -> std::result::Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM news WHERE url = $1)")
            .bind(url)
            .fetch_one(self.pool)
            .await
    }

    async fn insert(&self, entity: &NewsEntity) -> std::result::Result<i64, sqlx::Error> {
        let tickers = serde_json::to_string(&entity.tickers).unwrap_or_else(|_| "[]".to_string());
        let published_at = entity.published_at.map(|d| d.to_string());

        let result = sqlx::query(
            r#"
            INSERT INTO news (title, summary, url, published_at, score, tickers)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&entity.title)
        .bind(&entity.summary)
        .bind(&entity.url)
        .bind(&published_at)
        .bind(entity.score as i64)
        .bind(&tickers)
        .execute(self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Get a single persisted item by id.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<PersistedNews>> {
        let row = sqlx::query_as::<_, NewsRow>(&format!(
            "SELECT {NEWS_COLUMNS} FROM news WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(PersistedNews::from))
    }

    /// Count all persisted news rows.
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM news")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }

    /// Delete every news row. Administrative, non-reversible; used to purge
    /// bad data. Counts are taken inside the same transaction as the delete.
    pub async fn clear_all(&self) -> Result<ClearSummary> {
        let mut tx = self.pool.begin().await?;

        let count_before: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM news")
            .fetch_one(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM news").execute(&mut *tx).await?;

        let count_after: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM news")
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        let summary = ClearSummary {
            records_deleted: deleted.rows_affected() as i64,
            count_before,
            count_after,
        };
        info!(?summary, "cleared all news analysis data");
        Ok(summary)
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}
