use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::event::Category;

/// Required-field schema of an event category, as read from
/// `<schema_dir>/<category>.json`, e.g. `{"required": ["uuid", "timestamp"]}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub required: Vec<String>,
}

impl Schema {
    /// Schema used for any category whose schema file cannot be loaded.
    pub fn fallback() -> Self {
        Schema {
            required: vec!["uuid".to_string(), "timestamp".to_string()],
        }
    }
}

/// An event is valid when it is a JSON object holding every required field.
/// Only presence is checked: types, formats and values are not.
pub fn validate(event: &Value, schema: &Schema) -> bool {
    match event.as_object() {
        Some(fields) => schema
            .required
            .iter()
            .all(|field| fields.contains_key(field)),
        None => false,
    }
}

pub struct SchemaRegistry {
    dir: PathBuf,
    cache: RwLock<HashMap<Category, Arc<Schema>>>,
}

impl SchemaRegistry {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the schema for `category`, loading it on first use. Load failures
    /// resolve to [`Schema::fallback`], and that outcome is cached like a
    /// successful load.
    pub async fn schema_for(&self, category: Category) -> Arc<Schema> {
        if let Some(schema) = self.cache.read().await.get(&category) {
            return schema.clone();
        }

        let loaded = Arc::new(self.load(category).await);
        self.cache
            .write()
            .await
            .entry(category)
            .or_insert(loaded)
            .clone()
    }

    async fn load(&self, category: Category) -> Schema {
        let path = self.dir.join(format!("{category}.json"));
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(%category, "no schema file at {}, using default", path.display());
                return Schema::fallback();
            }
            Err(e) => {
                warn!(%category, "failed to read schema {}: {}", path.display(), e);
                return Schema::fallback();
            }
        };

        match serde_json::from_slice::<Schema>(&bytes) {
            Ok(schema) => {
                debug!(%category, required = ?schema.required, "loaded schema");
                schema
            }
            Err(e) => {
                warn!(%category, "malformed schema {}: {}", path.display(), e);
                Schema::fallback()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validates_presence_only() {
        let schema = Schema::fallback();
        assert!(validate(
            &json!({"uuid": 1, "timestamp": false}),
            &schema
        ));
        assert!(validate(
            &json!({"uuid": null, "timestamp": "", "extra": true}),
            &schema
        ));
        assert!(!validate(&json!({"uuid": "1"}), &schema));
        assert!(!validate(&json!(null), &schema));
        assert!(!validate(&json!("uuid"), &schema));
        assert!(!validate(&json!(["uuid", "timestamp"]), &schema));
    }

    #[test]
    fn empty_schema_accepts_any_object() {
        let schema = Schema { required: vec![] };
        assert!(validate(&json!({}), &schema));
        assert!(!validate(&json!(7), &schema));
    }

    #[tokio::test]
    async fn falls_back_when_file_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SchemaRegistry::new(dir.path());

        let schema = registry.schema_for(Category::ChannelEvents).await;
        assert_eq!(*schema, Schema::fallback());
    }

    #[tokio::test]
    async fn falls_back_when_file_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("scte-events.json"), "{\"required\": 12}").unwrap();
        let registry = SchemaRegistry::new(dir.path());

        let schema = registry.schema_for(Category::ScteEvents).await;
        assert_eq!(*schema, Schema::fallback());
    }

    #[tokio::test]
    async fn loads_and_caches_schema_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scte-events.json");
        std::fs::write(&path, r#"{"required": ["uuid", "splice_id"]}"#).unwrap();
        let registry = SchemaRegistry::new(dir.path());

        let schema = registry.schema_for(Category::ScteEvents).await;
        assert_eq!(schema.required, vec!["uuid", "splice_id"]);

        std::fs::remove_file(&path).unwrap();
        let cached = registry.schema_for(Category::ScteEvents).await;
        assert_eq!(cached.required, vec!["uuid", "splice_id"]);

        let other = registry.schema_for(Category::ChannelEvents).await;
        assert_eq!(*other, Schema::fallback());
    }
}
