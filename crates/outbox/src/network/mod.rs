//! Connectivity signal consumed by the sync engine
//!
//! The engine only needs to know whether the network is usable right now and
//! to hear about transitions. Hosts either push transitions themselves
//! ([`ManualNetworkMonitor`], e.g. from a platform reachability API) or let
//! [`ProbeNetworkMonitor`] poll a TCP endpoint.

mod manual;
mod probe;

pub use manual::ManualNetworkMonitor;
pub use probe::ProbeNetworkMonitor;

use crate::observe::Subscription;

/// Callback invoked with the new usability state on every transition
pub type NetworkCallback = Box<dyn Fn(bool) + Send + Sync>;

/// Source of the "network usable" signal
pub trait NetworkMonitor: Send + Sync {
    /// Whether the network is usable right now
    fn is_usable(&self) -> bool;

    /// Register for transitions; dropping the handle unsubscribes
    ///
    /// Callbacks only fire on actual changes, never for repeated reports of
    /// the same state.
    fn subscribe(&self, callback: NetworkCallback) -> Subscription;
}
