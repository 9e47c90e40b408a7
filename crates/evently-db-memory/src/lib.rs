//! In-memory storage backend for the Evently server.
//!
//! Implements [`EventStore`] and [`CategoryStore`] from `evently-storage` on top
//! of concurrent `DashMap`s. Used in development mode and by the server tests.
//!
//! # Example
//!
//! ```ignore
//! use evently_db_memory::InMemoryStorage;
//! use evently_storage::{EventStore, ListParams};
//!
//! let storage = InMemoryStorage::new();
//! let events = storage.list_events(&ListParams::default()).await?;
//! ```

mod storage;

pub use evently_storage::{CategoryStore, EventStore, StorageError};
pub use storage::InMemoryStorage;

/// Creates a new shared in-memory store usable as both event and category store.
pub fn create_storage() -> std::sync::Arc<InMemoryStorage> {
    std::sync::Arc::new(InMemoryStorage::new())
}
