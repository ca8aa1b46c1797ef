//! Callback registries with drop-to-unsubscribe handles

use std::sync::{Arc, Mutex, Weak};

type Listener<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Handle returned by every `subscribe` call
///
/// The callback stays registered until the handle is dropped, or forever
/// after [`Subscription::detach`].
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub(crate) fn new(unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// A handle that owns nothing
    pub fn empty() -> Self {
        Self { unsubscribe: None }
    }

    /// Keep the callback registered for the lifetime of its source
    pub fn detach(mut self) {
        self.unsubscribe = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

struct Registry<T> {
    next_id: u64,
    entries: Vec<(u64, Listener<T>)>,
}

/// Set of callbacks notified with a value of type `T`
///
/// Callbacks are invoked outside the internal lock, so they may subscribe,
/// unsubscribe or read state from the notifying component.
pub(crate) struct Listeners<T> {
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T: Clone + 'static> Listeners<T> {
    pub(crate) fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    pub(crate) fn subscribe(&self, listener: impl Fn(T) + Send + Sync + 'static) -> Subscription {
        let Ok(mut registry) = self.registry.lock() else {
            return Subscription::empty();
        };
        let id = registry.next_id;
        registry.next_id += 1;
        registry.entries.push((id, Arc::new(listener)));
        drop(registry);

        let weak: Weak<Mutex<Registry<T>>> = Arc::downgrade(&self.registry);
        Subscription::new(move || {
            if let Some(registry) = weak.upgrade() {
                if let Ok(mut registry) = registry.lock() {
                    registry.entries.retain(|(entry_id, _)| *entry_id != id);
                }
            }
        })
    }

    pub(crate) fn notify(&self, value: T) {
        let snapshot: Vec<Listener<T>> = match self.registry.lock() {
            Ok(registry) => registry.entries.iter().map(|(_, l)| l.clone()).collect(),
            Err(_) => return,
        };
        for listener in snapshot {
            listener(value.clone());
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.registry.lock().map(|r| r.entries.len()).unwrap_or(0)
    }
}
