use std::io::Write;
use std::path::{Path, PathBuf};

use metrics::counter;
use serde_json::Value;
use time::{OffsetDateTime, UtcOffset};
use tracing::instrument;

use crate::api::CaptureError;
use crate::event::Category;

/// Durable, append-only event store.
///
/// Valid events go to one NDJSON file per category and UTC day:
/// `<root>/events/<category>/<YYYY>/<MM>/<DD>/events-<YYYYMMDD>.ndjson`.
/// Rejected events go to `<root>/deadletter/<category>/invalid-<unix-millis>.ndjson`.
///
/// Files are only ever opened in append mode and every line is handed to the
/// OS as a single write, so concurrent batches may interleave lines but never
/// split one.
#[derive(Clone)]
pub struct EventLog {
    root: PathBuf,
}

impl EventLog {
    pub fn new(data_root: &Path) -> Self {
        Self {
            root: data_root.to_path_buf(),
        }
    }

    /// Creates the per-category roots so an empty deployment has its layout.
    pub async fn ensure_layout(&self) -> std::io::Result<()> {
        for category in Category::ALL {
            tokio::fs::create_dir_all(self.root.join("events").join(category.as_str())).await?;
            tokio::fs::create_dir_all(self.root.join("deadletter").join(category.as_str()))
                .await?;
        }
        Ok(())
    }

    pub fn partition_path(&self, category: Category, at: OffsetDateTime) -> PathBuf {
        let at = at.to_offset(UtcOffset::UTC);
        let (year, month, day) = (at.year(), u8::from(at.month()), at.day());
        self.root
            .join("events")
            .join(category.as_str())
            .join(format!("{year:04}"))
            .join(format!("{month:02}"))
            .join(format!("{day:02}"))
            .join(format!("events-{year:04}{month:02}{day:02}.ndjson"))
    }

    pub fn dead_letter_path(&self, category: Category, at: OffsetDateTime) -> PathBuf {
        let millis = at.unix_timestamp_nanos() / 1_000_000;
        self.root
            .join("deadletter")
            .join(category.as_str())
            .join(format!("invalid-{millis}.ndjson"))
    }

    /// Appends one event as one line to the partition of `at`'s UTC day.
    #[instrument(skip_all, fields(category = %category))]
    pub async fn append(
        &self,
        category: Category,
        event: &Value,
        at: OffsetDateTime,
    ) -> Result<PathBuf, CaptureError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let path = self.partition_path(category, at);
        append_bytes(path.clone(), line)
            .await
            .map_err(|e| CaptureError::storage("failed to append to event log", e))?;

        counter!("capture_events_logged_total", "category" => category.as_str()).increment(1);
        Ok(path)
    }

    /// Writes all rejected events of a batch to a single dead-letter file, in
    /// one write.
    #[instrument(skip_all, fields(category = %category, count = events.len()))]
    pub async fn dead_letter(
        &self,
        category: Category,
        events: &[Value],
        at: OffsetDateTime,
    ) -> Result<PathBuf, CaptureError> {
        let mut lines = Vec::new();
        for event in events {
            serde_json::to_writer(&mut lines, event)?;
            lines.push(b'\n');
        }

        let path = self.dead_letter_path(category, at);
        append_bytes(path.clone(), lines)
            .await
            .map_err(|e| CaptureError::storage("failed to write dead-letter file", e))?;

        counter!("capture_events_dead_lettered_total", "category" => category.as_str())
            .increment(events.len() as u64);
        Ok(path)
    }
}

async fn append_bytes(path: PathBuf, bytes: Vec<u8>) -> std::io::Result<()> {
    tokio::task::spawn_blocking(move || {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        file.write_all(&bytes)
    })
    .await
    .map_err(std::io::Error::other)?
}
