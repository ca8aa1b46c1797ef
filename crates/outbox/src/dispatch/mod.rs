//! Remote delivery of queued mutations
//!
//! The engine never interprets an item's entity kind or payload; a
//! [`MutationDispatcher`] does, and reports only success or failure.

mod http;

pub use http::HttpDispatcher;

use crate::error::DispatchError;
use crate::models::SyncQueueItem;

/// Performs the remote write for one queued item
///
/// Called from the engine's dispatch thread, one item at a time. Blocking is
/// expected; the engine bounds each call with its dispatch timeout.
pub trait MutationDispatcher: Send + Sync {
    fn dispatch(&self, item: &SyncQueueItem) -> Result<(), DispatchError>;
}

/// Dispatcher backed by a closure
///
/// ```
/// use outbox::{DispatchError, FnDispatcher};
///
/// let dispatcher = FnDispatcher::new(|item| {
///     if item.entity_kind.as_str() == "todo" {
///         Ok(())
///     } else {
///         Err(DispatchError::other("unknown entity"))
///     }
/// });
/// # let _ = dispatcher;
/// ```
pub struct FnDispatcher<F> {
    f: F,
}

impl<F> FnDispatcher<F>
where
    F: Fn(&SyncQueueItem) -> Result<(), DispatchError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> MutationDispatcher for FnDispatcher<F>
where
    F: Fn(&SyncQueueItem) -> Result<(), DispatchError> + Send + Sync,
{
    fn dispatch(&self, item: &SyncQueueItem) -> Result<(), DispatchError> {
        (self.f)(item)
    }
}
