//! Sync engine: queues mutations and delivers them when the network allows
//!
//! Passes are idempotent per item: an item is only marked synced after its
//! dispatcher call returns success, and an interrupted pass leaves every
//! undelivered item eligible for the next one.

mod engine;
mod janitor;
mod stats;

pub use engine::SyncEngine;
pub use stats::PassStats;
