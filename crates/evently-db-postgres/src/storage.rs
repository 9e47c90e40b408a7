//! PostgreSQL implementation of the event and category stores.

use async_trait::async_trait;
use chrono::Utc;
use sqlx_postgres::PgPool;
use tracing::{debug, instrument};
use uuid::Uuid;

use evently_storage::{
    Category, CategoryStore, CategoryUpdate, Event, EventPage, EventStore, EventUpdate,
    ListParams, NewCategory, NewEvent, SearchParams, StorageError,
};

use crate::config::PostgresConfig;
use crate::error::Result;
use crate::pool::{self, PoolStats};
use crate::queries::{categories, events};

/// PostgreSQL-backed store.
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Creates the connection pool described by `config`.
    pub async fn new(config: PostgresConfig) -> Result<Self> {
        let pool = pool::create_pool(&config).await?;
        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn pool_stats(&self) -> PoolStats {
        PoolStats::from_pool(&self.pool)
    }

    pub fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

#[async_trait]
impl EventStore for PostgresStorage {
    async fn get_event(&self, id: Uuid) -> std::result::Result<Option<Event>, StorageError> {
        events::get(&self.pool, id).await
    }

    #[instrument(skip(self))]
    async fn list_events(
        &self,
        params: &ListParams,
    ) -> std::result::Result<Vec<Event>, StorageError> {
        events::list(&self.pool, params).await
    }

    #[instrument(skip(self))]
    async fn search_events(
        &self,
        params: &SearchParams,
    ) -> std::result::Result<EventPage, StorageError> {
        events::search(&self.pool, params).await
    }

    async fn create_event(&self, input: NewEvent) -> std::result::Result<Event, StorageError> {
        input.validate()?;
        let event = events::insert(&self.pool, input).await?;
        debug!(event_id = %event.id, "event created");
        Ok(event)
    }

    async fn update_event(
        &self,
        id: Uuid,
        update: EventUpdate,
    ) -> std::result::Result<Event, StorageError> {
        update.validate()?;
        events::update(&self.pool, id, update).await
    }

    async fn delete_event(&self, id: Uuid) -> std::result::Result<(), StorageError> {
        events::delete(&self.pool, id).await
    }
}

#[async_trait]
impl CategoryStore for PostgresStorage {
    async fn get_category(&self, id: Uuid) -> std::result::Result<Option<Category>, StorageError> {
        categories::get(&self.pool, id).await
    }

    async fn list_categories(&self) -> std::result::Result<Vec<Category>, StorageError> {
        categories::list(&self.pool).await
    }

    async fn create_category(
        &self,
        input: NewCategory,
    ) -> std::result::Result<Category, StorageError> {
        input.validate()?;
        categories::insert(&self.pool, input).await
    }

    async fn update_category(
        &self,
        id: Uuid,
        update: CategoryUpdate,
    ) -> std::result::Result<Category, StorageError> {
        let mut category = categories::get(&self.pool, id)
            .await?
            .ok_or_else(|| StorageError::not_found("category", id))?;
        if !update.apply(&mut category, Utc::now()) {
            return Ok(category);
        }
        categories::save(&self.pool, &category).await
    }

    async fn delete_category(&self, id: Uuid) -> std::result::Result<Vec<Uuid>, StorageError> {
        categories::delete(&self.pool, id).await
    }
}
