use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::api::CaptureError;
use crate::event::{field_text, Category};

pub mod queue;
pub mod sqlite;

pub const MIN_TIMESTAMP: &str = "0000-01-01T00:00:00Z";
pub const MAX_TIMESTAMP: &str = "9999-12-31T23:59:59Z";
pub const DEFAULT_SEARCH_LIMIT: u32 = 100;

/// Identity used to deduplicate an event in the index: its `uuid` rendered as
/// text. `None` when the event has no usable `uuid`.
pub fn dedupe_key(event: &Value) -> Option<String> {
    field_text(event, "uuid")
}

/// Row of the event index. `id` is the dedupe key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRecord {
    pub id: String,
    pub category: Category,
    pub timestamp: String,
    pub label: String,
    pub raw: String,
}

impl IndexRecord {
    /// Builds the row for an event. Events without a usable `uuid` get a random
    /// one, so they are still indexed but can never collide with a retry.
    pub fn from_event(event: &Value, category: Category) -> Result<Self, CaptureError> {
        Ok(IndexRecord {
            id: dedupe_key(event).unwrap_or_else(|| Uuid::new_v4().to_string()),
            category,
            timestamp: field_text(event, "timestamp").unwrap_or_default(),
            label: field_text(event, "label").unwrap_or_default(),
            raw: serde_json::to_string(event)?,
        })
    }
}

/// Time range query over one category. Bounds compare against the stored
/// timestamp text and are both inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub category: Category,
    pub from: String,
    pub to: String,
    pub limit: u32,
}

impl SearchQuery {
    pub fn new(
        category: Category,
        from: Option<String>,
        to: Option<String>,
        limit: Option<u32>,
    ) -> Self {
        SearchQuery {
            category,
            from: from.unwrap_or_else(|| MIN_TIMESTAMP.to_string()),
            to: to.unwrap_or_else(|| MAX_TIMESTAMP.to_string()),
            limit: limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
        }
    }
}

/// Best-effort secondary store of ingested events.
#[async_trait]
pub trait EventIndex {
    /// Inserts the event unless a record with the same id already exists, in
    /// which case the first stored payload is kept.
    async fn upsert(&self, event: &Value, category: Category) -> Result<(), CaptureError>;

    /// Events of `query.category` whose timestamp lies in `[from, to]`, oldest
    /// first, at most `limit` of them.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<Value>, CaptureError>;
}
