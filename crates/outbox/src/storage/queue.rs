//! Versioned persistence of the sync queue under a single key

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use super::KeyValueStore;
use crate::error::OutboxError;
use crate::models::SyncQueueItem;

/// Current schema version of the persisted queue
pub const QUEUE_SCHEMA_VERSION: u32 = 1;

/// Storage key used when none is configured
pub const DEFAULT_STORAGE_KEY: &str = "outbox.sync_queue";

#[derive(Serialize)]
struct QueueEnvelope<'a> {
    version: u32,
    items: &'a [SyncQueueItem],
}

/// Reads and writes the queue as one JSON document
///
/// Format: `{"version": 1, "items": [...]}` with items in FIFO order.
/// Version 0 is the legacy unversioned form, a bare JSON array of items.
#[derive(Clone)]
pub struct QueueStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl QueueStore {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the persisted queue; an absent key is an empty queue
    pub fn load(&self) -> Result<Vec<SyncQueueItem>, OutboxError> {
        let Some(raw) = self.store.get(&self.key)? else {
            return Ok(Vec::new());
        };
        decode(&raw)
    }

    /// Replace the persisted queue with `items`
    pub fn save(&self, items: &[SyncQueueItem]) -> Result<()> {
        let raw = encode(items)?;
        self.store
            .set(&self.key, &raw)
            .with_context(|| format!("Failed to persist queue under {}", self.key))
    }
}

fn encode(items: &[SyncQueueItem]) -> Result<String> {
    let envelope = QueueEnvelope {
        version: QUEUE_SCHEMA_VERSION,
        items,
    };
    serde_json::to_string(&envelope).context("Failed to serialize queue")
}

fn decode(raw: &str) -> Result<Vec<SyncQueueItem>, OutboxError> {
    let corrupt = |message: String| OutboxError::CorruptQueue { message };

    let value: Value = serde_json::from_str(raw).map_err(|e| corrupt(e.to_string()))?;

    let items = match value {
        // Legacy, version 0
        Value::Array(_) => value,
        Value::Object(mut envelope) => {
            let version = envelope
                .get("version")
                .and_then(Value::as_u64)
                .ok_or_else(|| corrupt("missing schema version".to_string()))?;
            let version = u32::try_from(version).unwrap_or(u32::MAX);
            if version > QUEUE_SCHEMA_VERSION {
                return Err(OutboxError::UnsupportedSchema {
                    found: version,
                    supported: QUEUE_SCHEMA_VERSION,
                });
            }
            envelope
                .remove("items")
                .ok_or_else(|| corrupt("missing items".to_string()))?
        }
        other => return Err(corrupt(format!("unexpected top-level value: {other}"))),
    };

    serde_json::from_value(items).map_err(|e| corrupt(e.to_string()))
}
