//! Outbox crate - offline-first mutation sync
//!
//! This crate provides platform-independent offline write support:
//! - Domain models (SyncQueueItem, SyncStatus)
//! - A persisted FIFO queue over pluggable key-value storage
//! - Network monitors (host-driven or TCP probe)
//! - Dispatchers that deliver mutations (HTTP or host callback)
//! - The sync engine that drains the queue when the network allows
//!
//! This crate has zero UI dependencies and no async runtime; the engine uses
//! a few background threads and is exported to Swift/Kotlin through UniFFI.

uniffi::setup_scaffolding!();

pub mod config;
pub mod dispatch;
pub mod error;
pub mod ffi;
pub mod models;
pub mod network;
pub mod observe;
pub mod storage;
pub mod sync;

pub use config::{EngineConfig, OutboxSettings, RemoteConfig};
pub use dispatch::{FnDispatcher, HttpDispatcher, MutationDispatcher};
pub use error::{DispatchError, OutboxError};
pub use models::{EntityKind, ItemId, ItemStatus, OperationKind, SyncQueueItem, SyncStatus};
pub use network::{ManualNetworkMonitor, NetworkCallback, NetworkMonitor, ProbeNetworkMonitor};
pub use observe::Subscription;
pub use storage::{
    DEFAULT_STORAGE_KEY, FileKvStore, InMemoryKvStore, KeyValueStore, QueueStore, SqliteKvStore,
};
pub use sync::{PassStats, SyncEngine};
