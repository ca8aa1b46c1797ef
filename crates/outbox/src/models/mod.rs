//! Domain models for queued mutations

mod item;
mod status;

pub use item::{EntityKind, ItemId, ItemStatus, OperationKind, SyncQueueItem};
pub use status::SyncStatus;
