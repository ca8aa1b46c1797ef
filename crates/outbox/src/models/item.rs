//! Queue item model: one captured mutation and its delivery state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::OutboxError;

/// Unique identifier for a queued item
///
/// Assigned at enqueue time as a UUIDv7 string, so ids also sort by creation
/// time. Stable for the item's whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh, time-ordered id
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of write a mutation performs against the remote store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OperationKind {
    type Err = OutboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "create" => Ok(OperationKind::Create),
            "update" => Ok(OperationKind::Update),
            "delete" => Ok(OperationKind::Delete),
            _ => Err(OutboxError::InvalidOperation(s.to_string())),
        }
    }
}

/// Name of the remote entity type a mutation targets (e.g. "todo")
///
/// Opaque to the engine; only dispatchers interpret it. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKind(String);

impl EntityKind {
    /// Validate and wrap an entity kind. Surrounding whitespace is trimmed.
    pub fn new(kind: impl AsRef<str>) -> Result<Self, OutboxError> {
        let kind = kind.as_ref().trim();
        if kind.is_empty() {
            return Err(OutboxError::InvalidEntityKind);
        }
        Ok(Self(kind.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Delivery state of a queued item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// Waiting for its first delivery attempt
    Pending,
    /// Picked up by the active pass, dispatch in flight
    Syncing,
    /// Delivered; removed after the grace delay
    Synced,
    /// Last attempt failed; retried while under the retry cap
    Failed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Syncing => "syncing",
            ItemStatus::Synced => "synced",
            ItemStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One captured mutation in the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQueueItem {
    pub id: ItemId,
    pub operation: OperationKind,
    pub entity_kind: EntityKind,
    /// Passed verbatim to the dispatcher
    pub payload: serde_json::Value,
    pub enqueued_at: DateTime<Utc>,
    /// Number of failed delivery attempts
    pub retry_count: u32,
    pub status: ItemStatus,
    /// Message of the most recent dispatch failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl SyncQueueItem {
    /// Create a new pending item with a fresh id
    pub fn new(operation: OperationKind, entity_kind: EntityKind, payload: serde_json::Value) -> Self {
        Self {
            id: ItemId::generate(),
            operation,
            entity_kind,
            payload,
            enqueued_at: Utc::now(),
            retry_count: 0,
            status: ItemStatus::Pending,
            last_error: None,
        }
    }

    /// Whether a pass should pick this item up
    ///
    /// Pending items always are; failed items only while `retry_count` is
    /// below `max_retries`.
    pub fn is_eligible(&self, max_retries: u32) -> bool {
        match self.status {
            ItemStatus::Pending => true,
            ItemStatus::Failed => self.retry_count < max_retries,
            ItemStatus::Syncing | ItemStatus::Synced => false,
        }
    }

    /// Failed and out of retries; only manual removal gets it out of the queue
    pub fn is_terminal(&self, max_retries: u32) -> bool {
        self.status == ItemStatus::Failed && self.retry_count >= max_retries
    }

    pub(crate) fn mark_syncing(&mut self) {
        self.status = ItemStatus::Syncing;
    }

    pub(crate) fn mark_synced(&mut self) {
        self.status = ItemStatus::Synced;
        self.last_error = None;
    }

    pub(crate) fn mark_failed(&mut self, error: impl Into<String>) {
        self.retry_count = self.retry_count.saturating_add(1);
        self.status = ItemStatus::Failed;
        self.last_error = Some(error.into());
    }
}
