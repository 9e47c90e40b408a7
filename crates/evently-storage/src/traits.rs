//! Storage traits implemented by every relational backend.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StorageError;
use crate::types::{
    Category, CategoryUpdate, Event, EventPage, EventUpdate, ListParams, NewCategory, NewEvent,
    SearchParams,
};

/// Persistence for events.
///
/// Implementations must be thread-safe (`Send + Sync`) and are shared behind
/// an `Arc` by the server.
///
/// # Example
///
/// ```ignore
/// use evently_storage::{Event, EventStore, StorageError};
/// use uuid::Uuid;
///
/// async fn load(store: &dyn EventStore, id: Uuid) -> Result<Event, StorageError> {
///     store
///         .get_event(id)
///         .await?
///         .ok_or_else(|| StorageError::not_found("event", id))
/// }
/// ```
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Reads an event by id.
    ///
    /// Returns `None` if the event does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues, not for missing events.
    async fn get_event(&self, id: Uuid) -> Result<Option<Event>, StorageError>;

    /// Returns one page of events ordered by `params.sort_by` / `params.sort_dir`.
    async fn list_events(&self, params: &ListParams) -> Result<Vec<Event>, StorageError>;

    /// Filters events and returns the requested page together with the total match count.
    async fn search_events(&self, params: &SearchParams) -> Result<EventPage, StorageError>;

    /// Persists a new event.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidInput` if the input fails validation.
    async fn create_event(&self, input: NewEvent) -> Result<Event, StorageError>;

    /// Replaces the mutable fields of an event.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the event does not exist.
    async fn update_event(&self, id: Uuid, update: EventUpdate) -> Result<Event, StorageError>;

    /// Deletes an event.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the event does not exist.
    async fn delete_event(&self, id: Uuid) -> Result<(), StorageError>;
}

/// Persistence for event categories.
#[async_trait]
pub trait CategoryStore: Send + Sync {
    async fn get_category(&self, id: Uuid) -> Result<Option<Category>, StorageError>;

    /// Returns every category ordered by name.
    async fn list_categories(&self) -> Result<Vec<Category>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` if a category with the same name exists.
    async fn create_category(&self, input: NewCategory) -> Result<Category, StorageError>;

    async fn update_category(
        &self,
        id: Uuid,
        update: CategoryUpdate,
    ) -> Result<Category, StorageError>;

    /// Deletes a category. Its events stay, with `category_id` cleared.
    ///
    /// Returns the ids of the events that were detached.
    async fn delete_category(&self, id: Uuid) -> Result<Vec<Uuid>, StorageError>;
}
