//! FFI-friendly type wrappers for UniFFI export
//!
//! These types convert internal Rust types to FFI-compatible versions:
//! - `DateTime<Utc>` → `i64` (Unix timestamp)
//! - `ItemId`/`EntityKind` → `String`
//! - `serde_json::Value` payloads → JSON `String`
//! - `Duration` → milliseconds

use std::time::Duration;

use crate::config::{EngineConfig, duration_millis};
use crate::error::{DispatchError, OutboxError};
use crate::models::{ItemStatus, OperationKind, SyncQueueItem, SyncStatus};
use crate::storage::DEFAULT_STORAGE_KEY;

// ============================================================================
// Error Types
// ============================================================================

/// FFI-friendly error type
#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum OutboxFfiError {
    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Stored queue is unreadable: {message}")]
    CorruptQueue { message: String },
}

impl From<OutboxError> for OutboxFfiError {
    fn from(e: OutboxError) -> Self {
        let message = e.to_string();
        match e {
            OutboxError::InvalidEntityKind
            | OutboxError::InvalidConfig { .. }
            | OutboxError::InvalidOperation(_)
            | OutboxError::Serialization(_) => OutboxFfiError::InvalidArgument { message },
            OutboxError::CorruptQueue { .. } | OutboxError::UnsupportedSchema { .. } => {
                OutboxFfiError::CorruptQueue { message }
            }
            OutboxError::Storage(_) | OutboxError::Thread(_) => {
                OutboxFfiError::Storage { message }
            }
        }
    }
}

impl From<anyhow::Error> for OutboxFfiError {
    fn from(e: anyhow::Error) -> Self {
        OutboxFfiError::Storage {
            message: format!("{:#}", e),
        }
    }
}

// ============================================================================
// Queue Types
// ============================================================================

/// Counts cross the boundary as `u32`; larger values are clamped
pub(crate) fn saturating_u32(count: usize) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiOperationKind {
    Create,
    Update,
    Delete,
}

impl From<FfiOperationKind> for OperationKind {
    fn from(kind: FfiOperationKind) -> Self {
        match kind {
            FfiOperationKind::Create => OperationKind::Create,
            FfiOperationKind::Update => OperationKind::Update,
            FfiOperationKind::Delete => OperationKind::Delete,
        }
    }
}

impl From<OperationKind> for FfiOperationKind {
    fn from(kind: OperationKind) -> Self {
        match kind {
            OperationKind::Create => FfiOperationKind::Create,
            OperationKind::Update => FfiOperationKind::Update,
            OperationKind::Delete => FfiOperationKind::Delete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiItemStatus {
    Pending,
    Syncing,
    Synced,
    Failed,
}

impl From<ItemStatus> for FfiItemStatus {
    fn from(status: ItemStatus) -> Self {
        match status {
            ItemStatus::Pending => FfiItemStatus::Pending,
            ItemStatus::Syncing => FfiItemStatus::Syncing,
            ItemStatus::Synced => FfiItemStatus::Synced,
            ItemStatus::Failed => FfiItemStatus::Failed,
        }
    }
}

/// FFI-friendly queue item
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiQueueItem {
    pub id: String,
    pub operation: FfiOperationKind,
    pub entity_kind: String,
    /// Payload as a JSON document
    pub payload_json: String,
    /// Unix timestamp (seconds)
    pub enqueued_at: i64,
    pub retry_count: u32,
    pub status: FfiItemStatus,
    pub last_error: Option<String>,
}

impl From<SyncQueueItem> for FfiQueueItem {
    fn from(item: SyncQueueItem) -> Self {
        Self {
            id: item.id.0,
            operation: item.operation.into(),
            entity_kind: item.entity_kind.to_string(),
            payload_json: item.payload.to_string(),
            enqueued_at: item.enqueued_at.timestamp(),
            retry_count: item.retry_count,
            status: item.status.into(),
            last_error: item.last_error,
        }
    }
}

/// FFI-friendly status view
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Record)]
pub struct FfiSyncStatus {
    pub pending_count: u32,
    pub failed_count: u32,
    /// Failed items that will not be retried
    pub terminal_count: u32,
    pub is_syncing: bool,
}

impl From<SyncStatus> for FfiSyncStatus {
    fn from(status: SyncStatus) -> Self {
        Self {
            pending_count: saturating_u32(status.pending_count),
            failed_count: saturating_u32(status.failed_count),
            terminal_count: saturating_u32(status.terminal_count),
            is_syncing: status.is_syncing,
        }
    }
}

/// Engine tuning; durations in milliseconds
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiEngineConfig {
    pub max_retries: u32,
    pub grace_delay_ms: u64,
    /// 0 waits for the dispatcher indefinitely
    pub dispatch_timeout_ms: u64,
    pub storage_key: Option<String>,
}

impl From<FfiEngineConfig> for EngineConfig {
    fn from(config: FfiEngineConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            grace_delay: Duration::from_millis(config.grace_delay_ms),
            dispatch_timeout: (config.dispatch_timeout_ms > 0)
                .then(|| Duration::from_millis(config.dispatch_timeout_ms)),
            storage_key: config
                .storage_key
                .unwrap_or_else(|| DEFAULT_STORAGE_KEY.to_string()),
        }
    }
}

impl From<EngineConfig> for FfiEngineConfig {
    fn from(config: EngineConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            grace_delay_ms: duration_millis(config.grace_delay),
            dispatch_timeout_ms: config
                .dispatch_timeout
                .map_or(0, duration_millis),
            storage_key: Some(config.storage_key),
        }
    }
}

// ============================================================================
// Dispatch Callback
// ============================================================================

/// Result of a host-side dispatch
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum FfiDispatchOutcome {
    Success,
    Failure { message: String },
}

impl From<FfiDispatchOutcome> for Result<(), DispatchError> {
    fn from(outcome: FfiDispatchOutcome) -> Self {
        match outcome {
            FfiDispatchOutcome::Success => Ok(()),
            FfiDispatchOutcome::Failure { message } => Err(DispatchError::Other { message }),
        }
    }
}

/// Host implementation of the remote write
///
/// Called on a background thread, one item at a time. Blocking is fine.
#[uniffi::export(callback_interface)]
pub trait MutationDispatcherCallback: Send + Sync {
    fn dispatch(&self, item: FfiQueueItem) -> FfiDispatchOutcome;
}

/// Receives every status change of a service
#[uniffi::export(callback_interface)]
pub trait StatusObserver: Send + Sync {
    fn on_status(&self, status: FfiSyncStatus);
}

// ============================================================================
// Log Callback
// ============================================================================

/// Log level for FFI callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<log::Level> for FfiLogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => FfiLogLevel::Error,
            log::Level::Warn => FfiLogLevel::Warn,
            log::Level::Info => FfiLogLevel::Info,
            log::Level::Debug => FfiLogLevel::Debug,
            log::Level::Trace => FfiLogLevel::Trace,
        }
    }
}

impl From<FfiLogLevel> for log::Level {
    fn from(level: FfiLogLevel) -> Self {
        match level {
            FfiLogLevel::Error => log::Level::Error,
            FfiLogLevel::Warn => log::Level::Warn,
            FfiLogLevel::Info => log::Level::Info,
            FfiLogLevel::Debug => log::Level::Debug,
            FfiLogLevel::Trace => log::Level::Trace,
        }
    }
}

/// Callback interface for receiving log messages from Rust
///
/// Swift should implement this using os_log/Logger for unified logging.
#[uniffi::export(callback_interface)]
pub trait LogCallback: Send + Sync {
    /// `target` is the module path, e.g. "outbox::sync::engine"
    fn on_log(&self, level: FfiLogLevel, target: String, message: String);
}
