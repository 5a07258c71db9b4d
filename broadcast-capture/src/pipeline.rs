use std::sync::Arc;

use metrics::counter;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::api::CaptureError;
use crate::event::Category;
use crate::event_log::EventLog;
use crate::index::queue::IndexQueue;
use crate::schema::{validate, SchemaRegistry};
use crate::time::TimeSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestSummary {
    pub accepted: usize,
    pub rejected: usize,
}

/// Validates a batch, stores valid events in the durable log, hands them to
/// the index queue and dead-letters the rest.
#[derive(Clone)]
pub struct IngestionPipeline {
    schemas: Arc<SchemaRegistry>,
    log: EventLog,
    index: IndexQueue,
    timesource: Arc<dyn TimeSource + Send + Sync>,
}

impl IngestionPipeline {
    pub fn new(
        schemas: Arc<SchemaRegistry>,
        log: EventLog,
        index: IndexQueue,
        timesource: Arc<dyn TimeSource + Send + Sync>,
    ) -> Self {
        Self {
            schemas,
            log,
            index,
            timesource,
        }
    }

    /// Ingests a batch. Valid events are logged in batch order, each one
    /// before it is submitted for indexing, so an event is durable before it
    /// can become searchable. A log failure aborts the rest of the batch.
    #[instrument(skip_all, fields(category = %category, batch_size = events.len()))]
    pub async fn ingest(
        &self,
        category: Category,
        events: Vec<Value>,
    ) -> Result<IngestSummary, CaptureError> {
        let schema = self.schemas.schema_for(category).await;
        let (valid, invalid): (Vec<Value>, Vec<Value>) =
            events.into_iter().partition(|event| validate(event, &schema));

        let now = self.timesource.now();

        for event in &valid {
            self.log.append(category, event, now).await?;
            self.index.submit(category, event.clone());
        }
        counter!("capture_events_ingested_total", "category" => category.as_str())
            .increment(valid.len() as u64);

        if !invalid.is_empty() {
            let path = self.log.dead_letter(category, &invalid, now).await?;
            warn!(
                rejected = invalid.len(),
                "rejected events written to {}",
                path.display()
            );
            counter!("capture_events_invalid_total", "category" => category.as_str())
                .increment(invalid.len() as u64);
        }

        debug!(accepted = valid.len(), rejected = invalid.len(), "batch ingested");
        Ok(IngestSummary {
            accepted: valid.len(),
            rejected: invalid.len(),
        })
    }
}
