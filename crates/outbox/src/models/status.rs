//! Aggregate read model over the live queue

use serde::Serialize;

use super::{ItemStatus, SyncQueueItem};

/// Derived status of the queue, recomputed on every read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    /// Items waiting for their first attempt
    pub pending_count: usize,
    /// Items whose last attempt failed (including terminal ones)
    pub failed_count: usize,
    /// Failed items that reached the retry cap
    pub terminal_count: usize,
    /// Whether a pass is currently running
    pub is_syncing: bool,
}

impl SyncStatus {
    /// Compute the status from a queue snapshot
    pub fn from_items(items: &[SyncQueueItem], max_retries: u32, is_syncing: bool) -> Self {
        let mut status = Self {
            is_syncing,
            ..Self::default()
        };
        for item in items {
            match item.status {
                ItemStatus::Pending => status.pending_count += 1,
                ItemStatus::Failed => {
                    status.failed_count += 1;
                    if item.is_terminal(max_retries) {
                        status.terminal_count += 1;
                    }
                }
                ItemStatus::Syncing | ItemStatus::Synced => {}
            }
        }
        status
    }

    /// Nothing waiting and nothing failed
    pub fn is_idle(&self) -> bool {
        self.pending_count == 0 && self.failed_count == 0 && !self.is_syncing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityKind, OperationKind};
    use serde_json::json;

    fn item(status: ItemStatus, retry_count: u32) -> SyncQueueItem {
        let mut item = SyncQueueItem::new(
            OperationKind::Update,
            EntityKind::new("note").unwrap(),
            json!({}),
        );
        item.status = status;
        item.retry_count = retry_count;
        item
    }

    #[test]
    fn test_counts_by_status() {
        let items = vec![
            item(ItemStatus::Pending, 0),
            item(ItemStatus::Pending, 0),
            item(ItemStatus::Syncing, 0),
            item(ItemStatus::Synced, 0),
            item(ItemStatus::Failed, 1),
            item(ItemStatus::Failed, 3),
        ];

        let status = SyncStatus::from_items(&items, 3, true);
        assert_eq!(status.pending_count, 2);
        assert_eq!(status.failed_count, 2);
        assert_eq!(status.terminal_count, 1);
        assert!(status.is_syncing);
        assert!(!status.is_idle());
    }

    #[test]
    fn test_empty_queue_is_idle() {
        let status = SyncStatus::from_items(&[], 3, false);
        assert_eq!(status, SyncStatus::default());
        assert!(status.is_idle());
    }
}
