//! Reachability probe: polls a TCP endpoint to derive network usability

use anyhow::{Context, Result};
use log::debug;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::{ManualNetworkMonitor, NetworkCallback, NetworkMonitor};
use crate::observe::Subscription;

/// Network monitor that periodically opens a TCP connection to a target
///
/// The network counts as usable while the target (normally the backend the
/// dispatcher talks to) accepts connections. The first probe runs before
/// [`ProbeNetworkMonitor::spawn`] returns, so the initial state is accurate.
/// The background thread stops when the monitor is dropped.
pub struct ProbeNetworkMonitor {
    state: Arc<ManualNetworkMonitor>,
    stop: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ProbeNetworkMonitor {
    /// Start probing `target` (`host:port`) every `interval`
    pub fn spawn(target: impl Into<String>, interval: Duration, connect_timeout: Duration) -> Result<Self> {
        let target = target.into();
        let state = Arc::new(ManualNetworkMonitor::new(probe(&target, connect_timeout)));
        let (stop, stop_rx) = mpsc::channel::<()>();

        let thread_state = state.clone();
        let handle = thread::Builder::new()
            .name("outbox-network-probe".to_string())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            thread_state.set_usable(probe(&target, connect_timeout));
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("Network probe for {} stopped", target);
            })
            .context("Failed to spawn network probe thread")?;

        Ok(Self {
            state,
            stop: Some(stop),
            handle: Some(handle),
        })
    }

    /// Probe the host and port of an HTTP(S) URL
    pub fn for_url(url: &url::Url, interval: Duration, connect_timeout: Duration) -> Result<Self> {
        let host = url.host_str().context("URL has no host")?;
        let port = url
            .port_or_known_default()
            .context("URL has no port and no default for its scheme")?;
        Self::spawn(format!("{host}:{port}"), interval, connect_timeout)
    }
}

impl NetworkMonitor for ProbeNetworkMonitor {
    fn is_usable(&self) -> bool {
        self.state.is_usable()
    }

    fn subscribe(&self, callback: NetworkCallback) -> Subscription {
        self.state.subscribe(callback)
    }
}

impl Drop for ProbeNetworkMonitor {
    fn drop(&mut self) {
        // Disconnecting the channel wakes the probe thread
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// One connection attempt against every resolved address
fn probe(target: &str, connect_timeout: Duration) -> bool {
    let addrs = match target.to_socket_addrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            debug!("Failed to resolve {}: {}", target, e);
            return false;
        }
    };

    for addr in addrs {
        match TcpStream::connect_timeout(&addr, connect_timeout) {
            Ok(_) => return true,
            Err(e) => debug!("Probe of {} failed: {}", addr, e),
        }
    }

    debug!("Network probe: {} unreachable", target);
    false
}
