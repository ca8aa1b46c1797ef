//! Per-pass counters

/// Summary of one sync pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Items handed to the dispatcher
    pub attempted: usize,
    /// Dispatches that succeeded
    pub succeeded: usize,
    /// Dispatches that failed, including timeouts and panics
    pub failed: usize,
    /// Failures that used up the item's last retry
    pub exhausted: usize,
    /// Outcomes dropped because the item was removed mid-dispatch
    pub discarded: usize,
    /// The pass stopped early because the network became unusable
    pub interrupted: bool,
    pub duration_ms: u64,
}

impl PassStats {
    /// True when every attempted dispatch succeeded
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}
