//! FFI bindings for UniFFI export
//!
//! This module provides Swift/Kotlin bindings for the outbox crate via UniFFI.
//!
//! ## Usage from Swift
//!
//! ```swift
//! import OutboxFFI
//!
//! // Initialize logging first
//! initializeLogging(callback: myLogCallback, maxLevel: .info)
//!
//! // The host performs the remote writes
//! let service = try OutboxService(
//!     dbPath: "/path/to/outbox.db",
//!     config: defaultEngineConfig(),
//!     dispatcher: myDispatcher,
//!     networkUsable: reachability.isReachable
//! )
//!
//! // Capture a mutation; it is delivered as soon as the network allows
//! let id = try service.enqueue(
//!     operation: .create,
//!     entityKind: "todo",
//!     payloadJson: #"{"title": "Buy milk"}"#
//! )
//!
//! // Forward reachability changes
//! service.setNetworkUsable(usable: true)
//!
//! // Observe the badge count
//! let subscription = service.subscribeStatus(observer: myObserver)
//! ```

mod logging;
mod service;
mod types;

// Re-export all FFI types and the OutboxService
pub use logging::{initialize_logging, install_host_logger, set_host_log_callback, set_logging_level};
pub use service::*;
pub use types::*;
