//! Storage traits and implementations
//!
//! The engine persists its queue through the [`KeyValueStore`] abstraction;
//! [`QueueStore`] owns the serialized format. Backends can be swapped
//! between in-memory, SQLite and plain files.

mod file;
mod memory;
mod queue;
mod sqlite;
mod traits;

pub use file::FileKvStore;
pub use memory::InMemoryKvStore;
pub use queue::{DEFAULT_STORAGE_KEY, QUEUE_SCHEMA_VERSION, QueueStore};
pub use sqlite::SqliteKvStore;
pub use traits::KeyValueStore;
