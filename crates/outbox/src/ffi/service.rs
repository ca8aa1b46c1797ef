//! OutboxService facade for UniFFI export
//!
//! Wraps a [`SyncEngine`] backed by SQLite, with the host supplying the
//! dispatcher and the network signal.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use log::debug;

use crate::config::EngineConfig;
use crate::dispatch::MutationDispatcher;
use crate::error::DispatchError;
use crate::ffi::types::*;
use crate::models::{ItemId, SyncQueueItem};
use crate::network::{ManualNetworkMonitor, NetworkMonitor};
use crate::observe::Subscription;
use crate::storage::SqliteKvStore;
use crate::sync::SyncEngine;

/// Adapts the host's dispatch callback to [`MutationDispatcher`]
struct CallbackDispatcher {
    callback: Box<dyn MutationDispatcherCallback>,
}

impl MutationDispatcher for CallbackDispatcher {
    fn dispatch(&self, item: &SyncQueueItem) -> Result<(), DispatchError> {
        self.callback.dispatch(FfiQueueItem::from(item.clone())).into()
    }
}

/// Main service object for offline mutations
///
/// This is the primary entry point for Swift/Kotlin code. The host forwards
/// reachability changes through [`OutboxService::set_network_usable`].
#[derive(uniffi::Object)]
pub struct OutboxService {
    engine: SyncEngine,
    network: Arc<ManualNetworkMonitor>,
}

#[uniffi::export]
impl OutboxService {
    /// Open (or create) the queue database and start the engine
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file
    /// * `config` - Engine tuning, see [`default_engine_config`]
    /// * `dispatcher` - Performs the remote write for each item
    /// * `network_usable` - Reachability at startup
    #[uniffi::constructor]
    pub fn new(
        db_path: String,
        config: FfiEngineConfig,
        dispatcher: Box<dyn MutationDispatcherCallback>,
        network_usable: bool,
    ) -> Result<Arc<Self>, OutboxFfiError> {
        // Ensure parent directories exist
        if let Some(parent) = PathBuf::from(&db_path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| OutboxFfiError::Storage {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let store = SqliteKvStore::new(&db_path).map_err(|e| OutboxFfiError::Storage {
            message: format!("Failed to open database: {:#}", e),
        })?;
        let network = Arc::new(ManualNetworkMonitor::new(network_usable));

        let engine = SyncEngine::new(
            EngineConfig::from(config),
            Arc::new(store),
            Arc::new(CallbackDispatcher {
                callback: dispatcher,
            }),
            network.clone(),
        )?;
        // Deliver whatever the previous run left behind
        engine.trigger_sync();

        Ok(Arc::new(Self { engine, network }))
    }

    // ========================================================================
    // Network
    // ========================================================================

    /// Report reachability; a change to usable starts a pass
    pub fn set_network_usable(&self, usable: bool) {
        self.network.set_usable(usable);
    }

    pub fn is_network_usable(&self) -> bool {
        self.network.is_usable()
    }

    // ========================================================================
    // Queue
    // ========================================================================

    /// Queue a mutation and return its id
    ///
    /// `payload_json` must be a valid JSON document.
    pub fn enqueue(
        &self,
        operation: FfiOperationKind,
        entity_kind: String,
        payload_json: String,
    ) -> Result<String, OutboxFfiError> {
        let payload: serde_json::Value =
            serde_json::from_str(&payload_json).map_err(|e| OutboxFfiError::InvalidArgument {
                message: format!("Payload is not valid JSON: {}", e),
            })?;
        let id = self.engine.enqueue(operation.into(), entity_kind, payload)?;
        Ok(id.0)
    }

    /// Start a pass in the background if none is running
    pub fn trigger_sync(&self) {
        self.engine.trigger_sync();
    }

    pub fn clear_queue(&self) {
        self.engine.clear_queue();
    }

    /// Remove one item; false if it was not queued
    pub fn remove_item(&self, id: String) -> bool {
        self.engine.remove_item(&ItemId::new(id))
    }

    /// Drop synced items without waiting for the grace delay
    pub fn prune_synced(&self) -> u32 {
        saturating_u32(self.engine.prune_synced())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn status(&self) -> FfiSyncStatus {
        self.engine.status().into()
    }

    /// All queued items, oldest first
    pub fn list_items(&self) -> Vec<FfiQueueItem> {
        self.engine
            .items()
            .into_iter()
            .map(FfiQueueItem::from)
            .collect()
    }

    pub fn get_item(&self, id: String) -> Option<FfiQueueItem> {
        self.engine.get_item(&ItemId::new(id)).map(FfiQueueItem::from)
    }

    pub fn config(&self) -> FfiEngineConfig {
        self.engine.config().clone().into()
    }

    /// Register for status changes until the returned handle is cancelled
    /// or released
    pub fn subscribe_status(&self, observer: Box<dyn StatusObserver>) -> Arc<StatusSubscription> {
        let subscription = self
            .engine
            .subscribe_status(move |status| observer.on_status(status.into()));
        Arc::new(StatusSubscription {
            inner: Mutex::new(Some(subscription)),
        })
    }
}

/// Handle for a status observer registration
#[derive(uniffi::Object)]
pub struct StatusSubscription {
    inner: Mutex<Option<Subscription>>,
}

#[uniffi::export]
impl StatusSubscription {
    /// Stop receiving updates; calling it again does nothing
    pub fn cancel(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            if inner.take().is_some() {
                debug!("Status observer cancelled");
            }
        }
    }
}

// ============================================================================
// Free Functions
// ============================================================================

/// Default engine tuning (3 attempts, 5 s grace delay, 30 s dispatch timeout)
#[uniffi::export]
pub fn default_engine_config() -> FfiEngineConfig {
    EngineConfig::default().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::{Duration, Instant};

    struct CountingDispatcher {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl MutationDispatcherCallback for CountingDispatcher {
        fn dispatch(&self, _item: FfiQueueItem) -> FfiDispatchOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                FfiDispatchOutcome::Failure {
                    message: "server said no".to_string(),
                }
            } else {
                FfiDispatchOutcome::Success
            }
        }
    }

    struct RecordingObserver {
        seen: Arc<Mutex<Vec<FfiSyncStatus>>>,
    }

    impl StatusObserver for RecordingObserver {
        fn on_status(&self, status: FfiSyncStatus) {
            self.seen.lock().unwrap().push(status);
        }
    }

    fn open(dir: &tempfile::TempDir, fail: bool, online: bool) -> (Arc<OutboxService>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let config = FfiEngineConfig {
            grace_delay_ms: 60_000,
            ..default_engine_config()
        };
        let service = OutboxService::new(
            dir.path().join("nested/outbox.db").to_string_lossy().into_owned(),
            config,
            Box::new(CountingDispatcher {
                calls: calls.clone(),
                fail,
            }),
            online,
        )
        .unwrap();
        (service, calls)
    }

    fn wait_until(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_enqueue_offline_then_deliver() {
        let dir = tempfile::tempdir().unwrap();
        let (service, calls) = open(&dir, false, false);

        let id = service
            .enqueue(FfiOperationKind::Create, "todo".to_string(), r#"{"title":"a"}"#.to_string())
            .unwrap();
        assert_eq!(service.status().pending_count, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        service.set_network_usable(true);
        wait_until(|| {
            service
                .get_item(id.clone())
                .is_some_and(|item| item.status == FfiItemStatus::Synced)
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(service.prune_synced(), 1);
    }

    #[test]
    fn test_invalid_payload_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = open(&dir, false, false);

        let err = service
            .enqueue(FfiOperationKind::Create, "todo".to_string(), "{not json".to_string())
            .unwrap_err();
        assert!(matches!(err, OutboxFfiError::InvalidArgument { .. }));

        let err = service
            .enqueue(FfiOperationKind::Create, "".to_string(), "{}".to_string())
            .unwrap_err();
        assert!(matches!(err, OutboxFfiError::InvalidArgument { .. }));
        assert!(service.list_items().is_empty());
    }

    #[test]
    fn test_failure_reported_by_host() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = open(&dir, true, false);
        let id = service
            .enqueue(FfiOperationKind::Delete, "todo".to_string(), "{}".to_string())
            .unwrap();

        service.set_network_usable(true);
        wait_until(|| service.get_item(id.clone()).is_some_and(|item| item.retry_count == 1));

        let item = service.get_item(id).unwrap();
        assert_eq!(item.status, FfiItemStatus::Failed);
        assert_eq!(item.last_error.as_deref(), Some("server said no"));
    }

    #[test]
    fn test_queue_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let (service, _) = open(&dir, false, false);
            service
                .enqueue(FfiOperationKind::Update, "note".to_string(), "[1,2]".to_string())
                .unwrap()
        };

        let (service, _) = open(&dir, false, false);
        let items = service.list_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, id);
        assert_eq!(items[0].payload_json, "[1,2]");
    }

    #[test]
    fn test_status_subscription_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = open(&dir, false, false);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let subscription = service.subscribe_status(Box::new(RecordingObserver { seen: seen.clone() }));
        service
            .enqueue(FfiOperationKind::Create, "todo".to_string(), "{}".to_string())
            .unwrap();
        subscription.cancel();
        subscription.cancel();
        service.clear_queue();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].pending_count, 1);
    }

    #[test]
    fn test_zero_max_retries_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = OutboxService::new(
            dir.path().join("outbox.db").to_string_lossy().into_owned(),
            FfiEngineConfig {
                max_retries: 0,
                ..default_engine_config()
            },
            Box::new(CountingDispatcher {
                calls: Arc::new(AtomicUsize::new(0)),
                fail: true,
            }),
            true,
        );
        assert!(matches!(result, Err(OutboxFfiError::InvalidArgument { .. })));
    }

    #[test]
    fn test_remove_item_unknown_id() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = open(&dir, false, false);
        assert!(!service.remove_item("missing".to_string()));
    }
}
