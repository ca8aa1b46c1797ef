//! The sync engine: a persisted FIFO queue of mutations and the pass that
//! drains it

use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::Instant;

use super::janitor::Janitor;
use super::stats::PassStats;
use crate::config::EngineConfig;
use crate::dispatch::MutationDispatcher;
use crate::error::{DispatchError, OutboxError};
use crate::models::{EntityKind, ItemId, ItemStatus, OperationKind, SyncQueueItem, SyncStatus};
use crate::network::NetworkMonitor;
use crate::observe::{Listeners, Subscription};
use crate::storage::{KeyValueStore, QueueStore};

/// Offline-first mutation queue
///
/// Every mutation is captured with [`SyncEngine::enqueue`], persisted
/// immediately and delivered through the [`MutationDispatcher`] once the
/// [`NetworkMonitor`] reports the network as usable. Items are dispatched
/// one at a time in enqueue order. At most one pass runs at any moment.
///
/// Handles are cheap to clone and share one queue. Background threads stop
/// once the last handle is dropped and any running pass has finished.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    queue: Mutex<Vec<SyncQueueItem>>,
    store: QueueStore,
    dispatcher: Arc<dyn MutationDispatcher>,
    network: Arc<dyn NetworkMonitor>,
    syncing: AtomicBool,
    janitor: Janitor,
    status_listeners: Listeners<SyncStatus>,
    network_subscription: Mutex<Option<Subscription>>,
    /// Items whose dispatcher call has not returned yet, including calls
    /// abandoned after a timeout
    in_flight: Arc<Mutex<HashSet<ItemId>>>,
}

/// Holds the single-pass flag; clearing it on drop covers early returns
struct PassGuard {
    inner: Arc<EngineInner>,
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.inner.syncing.store(false, Ordering::SeqCst);
        self.inner.notify_status();
    }
}

/// Keeps an item id in the in-flight set until the dispatcher returns
struct InFlight {
    ids: Arc<Mutex<HashSet<ItemId>>>,
    id: ItemId,
}

impl InFlight {
    fn new(ids: &Arc<Mutex<HashSet<ItemId>>>, id: ItemId) -> Self {
        ids.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone());
        Self {
            ids: Arc::clone(ids),
            id,
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

/// What happened to the queue after a dispatch returned
enum Recorded {
    Synced,
    Failed { retry_count: u32, exhausted: bool },
    Discarded,
}

impl SyncEngine {
    /// Load the persisted queue and start the engine
    ///
    /// Items left `syncing` by an interrupted run go back to `pending`, and
    /// `synced` items whose removal never happened are dropped. No pass is
    /// started here; call [`SyncEngine::trigger_sync`] to deliver what was
    /// left over from the previous run.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn KeyValueStore>,
        dispatcher: Arc<dyn MutationDispatcher>,
        network: Arc<dyn NetworkMonitor>,
    ) -> Result<Self, OutboxError> {
        config.validate()?;
        let store = QueueStore::new(store, config.storage_key.clone());
        let mut items = store.load()?;
        if reconcile_loaded(&mut items) {
            if let Err(e) = store.save(&items) {
                error!("Failed to persist recovered sync queue: {:#}", e);
            }
        }
        info!(
            "Sync queue loaded from '{}': {} items",
            store.key(),
            items.len()
        );

        let (janitor, janitor_queue) = Janitor::new();
        let inner = Arc::new(EngineInner {
            config,
            queue: Mutex::new(items),
            store,
            dispatcher,
            network,
            syncing: AtomicBool::new(false),
            janitor,
            status_listeners: Listeners::new(),
            network_subscription: Mutex::new(None),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        });

        let weak = Arc::downgrade(&inner);
        janitor_queue
            .spawn(move |id| match weak.upgrade() {
                Some(inner) => {
                    inner.remove_if_synced(id);
                    true
                }
                None => false,
            })
            .map_err(OutboxError::Thread)?;

        let weak: Weak<EngineInner> = Arc::downgrade(&inner);
        let subscription = inner.network.subscribe(Box::new(move |usable| {
            if !usable {
                return;
            }
            if let Some(inner) = weak.upgrade() {
                debug!("Network usable again, checking for queued mutations");
                SyncEngine { inner }.trigger_sync();
            }
        }));
        *inner
            .network_subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(subscription);

        Ok(SyncEngine { inner })
    }

    /// Capture a mutation, persist it and try to deliver it
    ///
    /// Returns the new item's id. Fails only for an empty entity kind;
    /// storage errors are logged and the item stays queued in memory.
    pub fn enqueue(
        &self,
        operation: OperationKind,
        entity_kind: impl AsRef<str>,
        payload: serde_json::Value,
    ) -> Result<ItemId, OutboxError> {
        let entity_kind = EntityKind::new(entity_kind)?;
        let item = SyncQueueItem::new(operation, entity_kind, payload);
        let id = item.id.clone();
        info!("Enqueued {} {} as {}", item.entity_kind, item.operation, id);

        self.inner.mutate(|queue| {
            queue.push(item);
            Some(())
        });
        self.trigger_sync();
        Ok(id)
    }

    /// Like [`SyncEngine::enqueue`], serializing `payload` first
    pub fn enqueue_json<T: Serialize>(
        &self,
        operation: OperationKind,
        entity_kind: impl AsRef<str>,
        payload: &T,
    ) -> Result<ItemId, OutboxError> {
        let payload = serde_json::to_value(payload)?;
        self.enqueue(operation, entity_kind, payload)
    }

    /// Start a background pass unless one is running, the network is
    /// unusable or nothing is eligible. Never blocks on dispatch.
    pub fn trigger_sync(&self) {
        if !self.inner.has_eligible(&HashSet::new()) {
            debug!("Nothing eligible to sync");
            return;
        }
        let Some(guard) = self.inner.try_begin_pass() else {
            return;
        };

        let spawned = thread::Builder::new()
            .name("outbox-sync".to_string())
            .spawn(move || {
                EngineInner::run_pass(guard);
            });
        if let Err(e) = spawned {
            // The guard went down with the closure, so the flag is clear again
            error!("Failed to start sync pass: {}", e);
        }
    }

    /// Run a pass on the calling thread and wait for it
    ///
    /// Returns `None` when no pass could start: another one is running or
    /// the network is unusable.
    pub fn sync_now(&self) -> Option<PassStats> {
        let guard = self.inner.try_begin_pass()?;
        Some(EngineInner::run_pass(guard))
    }

    /// Remove every item, including one whose dispatch is in flight
    ///
    /// An outcome that arrives for a removed item is ignored.
    pub fn clear_queue(&self) {
        let cleared = self.inner.mutate(|queue| {
            let count = queue.len();
            queue.clear();
            Some(count)
        });
        info!("Cleared sync queue ({} items)", cleared.unwrap_or(0));
    }

    /// Remove one item; `false` if no such item is queued
    pub fn remove_item(&self, id: &ItemId) -> bool {
        let removed = self
            .inner
            .mutate(|queue| {
                let pos = queue.iter().position(|item| item.id == *id)?;
                Some(queue.remove(pos))
            })
            .is_some();

        if removed {
            info!("Removed {} from sync queue", id);
        } else {
            debug!("Remove requested for unknown item {}", id);
        }
        removed
    }

    /// Drop every synced item now instead of waiting for its grace delay
    pub fn prune_synced(&self) -> usize {
        let pruned = self
            .inner
            .mutate(|queue| {
                let before = queue.len();
                queue.retain(|item| item.status != ItemStatus::Synced);
                let pruned = before - queue.len();
                (pruned > 0).then_some(pruned)
            })
            .unwrap_or(0);
        if pruned > 0 {
            debug!("Pruned {} synced items", pruned);
        }
        pruned
    }

    /// Snapshot of the queue in FIFO order
    pub fn items(&self) -> Vec<SyncQueueItem> {
        self.inner.lock_queue().clone()
    }

    pub fn get_item(&self, id: &ItemId) -> Option<SyncQueueItem> {
        self.inner
            .lock_queue()
            .iter()
            .find(|item| item.id == *id)
            .cloned()
    }

    /// Derived counts plus whether a pass is running
    pub fn status(&self) -> SyncStatus {
        self.inner.status()
    }

    /// Be told about every status change
    ///
    /// The callback runs on whichever thread made the change, never while
    /// the queue is locked.
    pub fn subscribe_status(
        &self,
        listener: impl Fn(SyncStatus) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.status_listeners.subscribe(listener)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.inner.config)
            .field("status", &self.inner.status())
            .finish()
    }
}

impl EngineInner {
    fn lock_queue(&self) -> MutexGuard<'_, Vec<SyncQueueItem>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` to the queue and persist under the same lock
    ///
    /// `f` returns `None` when it changed nothing; then nothing is written
    /// and listeners are not notified.
    fn mutate<R>(&self, f: impl FnOnce(&mut Vec<SyncQueueItem>) -> Option<R>) -> Option<R> {
        let result = {
            let mut queue = self.lock_queue();
            let result = f(&mut queue);
            if result.is_some() {
                self.persist(&queue);
            }
            result
        };
        if result.is_some() {
            self.notify_status();
        }
        result
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, HashSet<ItemId>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, queue: &[SyncQueueItem]) {
        if let Err(e) = self.store.save(queue) {
            error!("Failed to persist sync queue ({} items): {:#}", queue.len(), e);
        }
    }

    fn status(&self) -> SyncStatus {
        let queue = self.lock_queue();
        SyncStatus::from_items(
            &queue,
            self.config.max_retries,
            self.syncing.load(Ordering::SeqCst),
        )
    }

    fn notify_status(&self) {
        let status = self.status();
        self.status_listeners.notify(status);
    }

    /// Lock order: queue, then in-flight set
    fn has_eligible(&self, visited: &HashSet<ItemId>) -> bool {
        let max_retries = self.config.max_retries;
        let queue = self.lock_queue();
        let in_flight = self.lock_in_flight();
        queue.iter().any(|item| {
            item.is_eligible(max_retries)
                && !visited.contains(&item.id)
                && !in_flight.contains(&item.id)
        })
    }

    fn try_begin_pass(self: &Arc<Self>) -> Option<PassGuard> {
        if !self.network.is_usable() {
            debug!("Network unusable, not starting a sync pass");
            return None;
        }
        if self
            .syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Sync pass already running");
            return None;
        }
        let guard = PassGuard {
            inner: Arc::clone(self),
        };
        self.notify_status();
        Some(guard)
    }

    /// Drain eligible items in FIFO order, each at most once
    ///
    /// The queue is rescanned before every dispatch, so items enqueued
    /// while the pass runs are picked up by it.
    fn run_pass(guard: PassGuard) -> PassStats {
        let inner = Arc::clone(&guard.inner);
        let start = Instant::now();
        let mut stats = PassStats::default();
        let mut visited = HashSet::new();

        info!("Sync pass started");
        loop {
            if !inner.network.is_usable() {
                warn!("Network became unusable, ending sync pass early");
                stats.interrupted = true;
                break;
            }
            let Some(item) = inner.begin_next(&visited) else {
                break;
            };
            visited.insert(item.id.clone());
            stats.attempted += 1;

            let outcome = inner.dispatch(&item);
            match inner.record_outcome(&item.id, outcome) {
                Recorded::Synced => stats.succeeded += 1,
                Recorded::Failed { exhausted, .. } => {
                    stats.failed += 1;
                    if exhausted {
                        stats.exhausted += 1;
                    }
                }
                Recorded::Discarded => stats.discarded += 1,
            }
        }
        stats.duration_ms = start.elapsed().as_millis() as u64;
        drop(guard);

        info!(
            "Sync pass finished in {}ms: {} attempted, {} synced, {} failed",
            stats.duration_ms, stats.attempted, stats.succeeded, stats.failed
        );

        // Enqueues that raced the end of the pass saw the flag still set
        if !stats.interrupted && inner.has_eligible(&visited) {
            debug!("Work arrived while the pass was finishing, starting another");
            SyncEngine { inner }.trigger_sync();
        }
        stats
    }

    /// Mark the first eligible, not yet visited item as syncing
    ///
    /// Items whose previous dispatch timed out but is still running are
    /// skipped so the remote never sees the same item twice at once.
    fn begin_next(&self, visited: &HashSet<ItemId>) -> Option<SyncQueueItem> {
        let max_retries = self.config.max_retries;
        self.mutate(|queue| {
            let in_flight = self.lock_in_flight();
            let item = queue.iter_mut().find(|item| {
                item.is_eligible(max_retries)
                    && !visited.contains(&item.id)
                    && !in_flight.contains(&item.id)
            })?;
            item.mark_syncing();
            debug!(
                "Dispatching {} ({} {}, attempt {})",
                item.id,
                item.entity_kind,
                item.operation,
                item.retry_count + 1
            );
            Some(item.clone())
        })
    }

    /// Run the dispatcher on its own thread, bounded by the dispatch timeout
    ///
    /// A dispatcher that panics or outlives the timeout counts as a failed
    /// attempt. A timed-out call is abandoned, not cancelled.
    fn dispatch(&self, item: &SyncQueueItem) -> Result<(), DispatchError> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let work = item.clone();
        let (tx, rx) = mpsc::channel();
        let busy = InFlight::new(&self.in_flight, item.id.clone());

        thread::Builder::new()
            .name("outbox-dispatch".to_string())
            .spawn(move || {
                let outcome = dispatcher.dispatch(&work);
                // Cleared before the outcome is seen, so the next pass may
                // pick the item up again
                drop(busy);
                let _ = tx.send(outcome);
            })
            .map_err(|e| DispatchError::other(format!("Failed to start dispatch thread: {e}")))?;

        match self.config.dispatch_timeout {
            Some(timeout) => match rx.recv_timeout(timeout) {
                Ok(outcome) => outcome,
                Err(RecvTimeoutError::Timeout) => Err(DispatchError::Timeout { after: timeout }),
                Err(RecvTimeoutError::Disconnected) => Err(DispatchError::Panicked),
            },
            None => rx.recv().unwrap_or(Err(DispatchError::Panicked)),
        }
    }

    fn record_outcome(&self, id: &ItemId, outcome: Result<(), DispatchError>) -> Recorded {
        let max_retries = self.config.max_retries;
        let recorded = self.mutate(|queue| {
            let item = queue.iter_mut().find(|item| item.id == *id)?;
            match &outcome {
                Ok(()) => {
                    item.mark_synced();
                    Some(Recorded::Synced)
                }
                Err(e) => {
                    item.mark_failed(e.to_string());
                    Some(Recorded::Failed {
                        retry_count: item.retry_count,
                        exhausted: item.is_terminal(max_retries),
                    })
                }
            }
        });

        match recorded {
            Some(Recorded::Synced) => {
                debug!("Synced {}", id);
                self.schedule_removal(id);
                Recorded::Synced
            }
            Some(Recorded::Failed {
                retry_count,
                exhausted,
            }) => {
                let reason = outcome.err().map(|e| e.to_string()).unwrap_or_default();
                if exhausted {
                    warn!(
                        "Dispatch of {} failed ({}), giving up after {} attempts",
                        id, reason, retry_count
                    );
                } else {
                    warn!(
                        "Dispatch of {} failed ({}), attempt {} of {}",
                        id, reason, retry_count, max_retries
                    );
                }
                Recorded::Failed {
                    retry_count,
                    exhausted,
                }
            }
            Some(Recorded::Discarded) | None => {
                debug!("Item {} was removed during dispatch, outcome ignored", id);
                Recorded::Discarded
            }
        }
    }

    fn schedule_removal(&self, id: &ItemId) {
        if self.config.grace_delay.is_zero() {
            self.remove_if_synced(id);
        } else {
            self.janitor
                .schedule(id.clone(), Instant::now() + self.config.grace_delay);
        }
    }

    /// Removal at the end of the grace delay; anything else is left alone
    fn remove_if_synced(&self, id: &ItemId) {
        let removed = self.mutate(|queue| {
            let pos = queue
                .iter()
                .position(|item| item.id == *id && item.status == ItemStatus::Synced)?;
            Some(queue.remove(pos))
        });
        if removed.is_some() {
            debug!("Removed synced item {}", id);
        }
    }
}

/// Repair a queue read from storage; returns whether anything changed
///
/// A `syncing` item means the previous run stopped mid-dispatch. Its
/// delivery is unknown, so it is retried; the item id doubles as an
/// idempotency key for the remote.
fn reconcile_loaded(items: &mut Vec<SyncQueueItem>) -> bool {
    let before = items.len();

    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(item.id.clone()));
    let duplicates = before - items.len();
    if duplicates > 0 {
        warn!("Dropped {} duplicate items from stored queue", duplicates);
    }

    let with_synced = items.len();
    items.retain(|item| item.status != ItemStatus::Synced);
    let synced = with_synced - items.len();
    if synced > 0 {
        debug!("Dropped {} items synced before the last shutdown", synced);
    }

    let mut interrupted = 0;
    for item in items.iter_mut() {
        if item.status == ItemStatus::Syncing {
            item.status = ItemStatus::Pending;
            interrupted += 1;
        }
    }
    if interrupted > 0 {
        warn!(
            "{} items were mid-dispatch when the last run stopped, will retry",
            interrupted
        );
    }

    duplicates + synced + interrupted > 0
}
