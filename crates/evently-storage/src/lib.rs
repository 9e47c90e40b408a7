//! # evently-storage
//!
//! Storage abstraction layer for the Evently server.
//!
//! This crate defines the traits and types that every relational backend must
//! implement. It does not contain any implementations - those live in
//! `evently-db-memory` and `evently-db-postgres`.
//!
//! The relational store is the canonical source of truth. Caching, rate limiting
//! and health reporting are layered on top of these traits by the server crate.
//!
//! ## Example
//!
//! ```ignore
//! use evently_storage::{EventStore, ListParams, StorageError};
//!
//! async fn first_page(store: &dyn EventStore) -> Result<usize, StorageError> {
//!     let events = store.list_events(&ListParams::default()).await?;
//!     Ok(events.len())
//! }
//! ```

mod error;
mod traits;
mod types;

pub use error::StorageError;
pub use traits::{CategoryStore, EventStore};
pub use types::{
    Category, CategoryUpdate, Event, EventPage, EventUpdate, ListParams, NewCategory, NewEvent,
    SearchParams, SortDirection, SortField, MAX_PAGE_SIZE,
};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Shared event store handle.
pub type DynEventStore = std::sync::Arc<dyn EventStore>;

/// Shared category store handle.
pub type DynCategoryStore = std::sync::Arc<dyn CategoryStore>;
