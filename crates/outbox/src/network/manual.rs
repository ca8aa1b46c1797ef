//! Network monitor driven by the host application

use log::info;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{NetworkCallback, NetworkMonitor};
use crate::observe::{Listeners, Subscription};

/// Network monitor whose state is set explicitly
///
/// Mobile hosts forward their platform reachability callbacks here; tests use
/// it to simulate going on- and offline.
pub struct ManualNetworkMonitor {
    usable: AtomicBool,
    /// Serializes transitions so subscribers see them in order
    transition: Mutex<()>,
    listeners: Listeners<bool>,
}

impl ManualNetworkMonitor {
    pub fn new(usable: bool) -> Self {
        Self {
            usable: AtomicBool::new(usable),
            transition: Mutex::new(()),
            listeners: Listeners::new(),
        }
    }

    /// Report the current state; subscribers are notified only on change
    ///
    /// Must not be called from inside one of this monitor's callbacks.
    pub fn set_usable(&self, usable: bool) {
        let _transition = self
            .transition
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let previous = self.usable.swap(usable, Ordering::SeqCst);
        if previous == usable {
            return;
        }

        info!(
            "Network is now {}",
            if usable { "usable" } else { "unusable" }
        );
        self.listeners.notify(usable);
    }
}

impl Default for ManualNetworkMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}

impl NetworkMonitor for ManualNetworkMonitor {
    fn is_usable(&self) -> bool {
        self.usable.load(Ordering::SeqCst)
    }

    fn subscribe(&self, callback: NetworkCallback) -> Subscription {
        self.listeners.subscribe(callback)
    }
}
