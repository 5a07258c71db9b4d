use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{info, instrument};

use crate::api::CaptureError;
use crate::event::Category;
use crate::index::{EventIndex, IndexRecord, SearchQuery};

/// Event index stored in a local SQLite database. Every statement is
/// parameterized; the dedupe and range semantics live in the SQL itself
/// (`INSERT OR IGNORE` on the primary key, `BETWEEN` for the range).
#[derive(Clone)]
pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    pub async fn open(path: &Path, max_connections: u32) -> Result<SqliteIndex, CaptureError> {
        info!("opening event index at {}", path.display());

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CaptureError::storage("failed to create index directory", e))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<SqliteIndex, CaptureError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                index_name TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                label TEXT NOT NULL,
                raw TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS events_index_name_timestamp ON events (index_name, timestamp)",
        )
        .execute(&pool)
        .await?;

        Ok(SqliteIndex { pool })
    }

    async fn insert(&self, record: &IndexRecord) -> Result<bool, CaptureError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO events (id, index_name, timestamp, label, raw) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(record.category.as_str())
        .bind(&record.timestamp)
        .bind(&record.label)
        .bind(&record.raw)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl EventIndex for SqliteIndex {
    #[instrument(skip_all, fields(category = %category))]
    async fn upsert(&self, event: &Value, category: Category) -> Result<(), CaptureError> {
        let record = IndexRecord::from_event(event, category)?;
        if self.insert(&record).await? {
            counter!("capture_index_records_inserted_total", "category" => category.as_str())
                .increment(1);
        } else {
            tracing::debug!(id = %record.id, "event already indexed, keeping first payload");
            counter!("capture_index_records_duplicate_total", "category" => category.as_str())
                .increment(1);
        }
        Ok(())
    }

    #[instrument(skip_all, fields(category = %query.category, limit = query.limit))]
    async fn search(&self, query: &SearchQuery) -> Result<Vec<Value>, CaptureError> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT raw FROM events WHERE index_name = ? AND timestamp BETWEEN ? AND ? ORDER BY timestamp LIMIT ?",
        )
        .bind(query.category.as_str())
        .bind(&query.from)
        .bind(&query.to)
        .bind(i64::from(query.limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|raw| {
                serde_json::from_str(raw)
                    .map_err(|e| CaptureError::storage("corrupt index payload", e))
            })
            .collect()
    }
}
