//! Delayed removal of synced items
//!
//! Synced items stay visible for a grace period so a UI can show them as
//! done. A single background thread owns every pending removal and wakes
//! for the earliest one; the engine only sends it `(id, due)` pairs.

use log::debug;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::models::ItemId;

struct Cleanup {
    id: ItemId,
    due: Instant,
}

/// Sending half, owned by the engine
pub(crate) struct Janitor {
    tx: Sender<Cleanup>,
}

impl Janitor {
    pub(crate) fn new() -> (Self, JanitorQueue) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, JanitorQueue { rx })
    }

    /// Ask for `id` to be removed at `due`
    pub(crate) fn schedule(&self, id: ItemId, due: Instant) {
        if let Err(mpsc::SendError(cleanup)) = self.tx.send(Cleanup { id, due }) {
            debug!("Cleanup thread gone, {} stays until the next prune", cleanup.id);
        }
    }
}

/// Receiving half, moved into the cleanup thread
pub(crate) struct JanitorQueue {
    rx: Receiver<Cleanup>,
}

impl JanitorQueue {
    /// Run removals on a background thread
    ///
    /// `remove` returns `false` once its engine is gone, which stops the
    /// thread. The thread also stops when the [`Janitor`] is dropped.
    pub(crate) fn spawn(
        self,
        remove: impl Fn(&ItemId) -> bool + Send + 'static,
    ) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("outbox-cleanup".to_string())
            .spawn(move || self.run(remove))
    }

    fn run(self, remove: impl Fn(&ItemId) -> bool) {
        let mut due: BinaryHeap<Reverse<(Instant, ItemId)>> = BinaryHeap::new();

        loop {
            let now = Instant::now();
            while due.peek().is_some_and(|Reverse((at, _))| *at <= now) {
                if let Some(Reverse((_, id))) = due.pop() {
                    if !remove(&id) {
                        return;
                    }
                }
            }

            let received = match due.peek() {
                Some(Reverse((at, _))) => self.rx.recv_timeout(at.saturating_duration_since(now)),
                None => self.rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(cleanup) => due.push(Reverse((cleanup.due, cleanup.id))),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("Cleanup thread stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn collecting() -> (Arc<Mutex<Vec<ItemId>>>, impl Fn(&ItemId) -> bool + Send + 'static) {
        let removed = Arc::new(Mutex::new(Vec::new()));
        let sink = removed.clone();
        (removed, move |id: &ItemId| {
            sink.lock().unwrap().push(id.clone());
            true
        })
    }

    #[test]
    fn test_removes_in_due_order() {
        let (janitor, queue) = Janitor::new();
        let (removed, remove) = collecting();
        let handle = queue.spawn(remove).unwrap();

        let now = Instant::now();
        janitor.schedule(ItemId::from("late"), now + Duration::from_millis(80));
        janitor.schedule(ItemId::from("early"), now + Duration::from_millis(20));

        thread::sleep(Duration::from_millis(300));
        drop(janitor);
        handle.join().unwrap();

        assert_eq!(
            *removed.lock().unwrap(),
            vec![ItemId::from("early"), ItemId::from("late")]
        );
    }

    #[test]
    fn test_not_removed_before_due() {
        let (janitor, queue) = Janitor::new();
        let (removed, remove) = collecting();
        let _handle = queue.spawn(remove).unwrap();

        janitor.schedule(ItemId::from("a"), Instant::now() + Duration::from_secs(60));
        thread::sleep(Duration::from_millis(50));

        assert!(removed.lock().unwrap().is_empty());
    }

    #[test]
    fn test_stops_when_owner_gone() {
        let (janitor, queue) = Janitor::new();
        let handle = queue.spawn(|_| false).unwrap();

        janitor.schedule(ItemId::from("a"), Instant::now());
        handle.join().unwrap();

        // Scheduling after the thread stopped is harmless
        janitor.schedule(ItemId::from("b"), Instant::now());
    }
}
