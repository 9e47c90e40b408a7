use uuid::Uuid;

use evently_storage::{
    Category, CategoryUpdate, DynCategoryStore, NewCategory, StorageError, StorageResult,
};

use super::{CacheTtls, evict, fill, fill_derived, invalidate, lookup};
use crate::cache::{Cache, keys};

#[derive(Clone)]
pub struct CategoryRepository {
    store: DynCategoryStore,
    cache: Cache,
    ttls: CacheTtls,
}

impl CategoryRepository {
    pub fn new(store: DynCategoryStore, cache: Cache, ttls: CacheTtls) -> Self {
        Self { store, cache, ttls }
    }

    pub async fn get(&self, id: Uuid) -> StorageResult<Category> {
        let key = keys::category(id);
        if let Some(category) = lookup::<Category>(&self.cache, &key).await {
            return Ok(category);
        }
        let category = self
            .store
            .get_category(id)
            .await?
            .ok_or_else(|| StorageError::not_found("category", id))?;
        fill(&self.cache, &key, &category, self.ttls.item).await;
        Ok(category)
    }

    pub async fn list(&self) -> StorageResult<Vec<Category>> {
        if let Some(categories) = lookup::<Vec<Category>>(&self.cache, keys::CATEGORIES_LIST).await
        {
            return Ok(categories);
        }
        let categories = self.store.list_categories().await?;
        fill_derived(
            &self.cache,
            keys::CATEGORIES_LIST_INDEX,
            keys::CATEGORIES_LIST,
            &categories,
            self.ttls.list,
        )
        .await;
        Ok(categories)
    }

    pub async fn create(&self, input: NewCategory) -> StorageResult<Category> {
        let category = self.store.create_category(input).await?;
        fill(
            &self.cache,
            &keys::category(category.id),
            &category,
            self.ttls.item,
        )
        .await;
        invalidate(&self.cache, keys::CATEGORIES_LIST_INDEX).await;
        Ok(category)
    }

    pub async fn update(&self, id: Uuid, update: CategoryUpdate) -> StorageResult<Category> {
        let category = self.store.update_category(id, update).await?;
        fill(&self.cache, &keys::category(id), &category, self.ttls.item).await;
        invalidate(&self.cache, keys::CATEGORIES_LIST_INDEX).await;
        tracing::info!(category_id = %id, "category updated");
        Ok(category)
    }

    /// Deleting a category rewrites its events, so their item entries and
    /// every event listing are dropped as well.
    pub async fn delete(&self, id: Uuid) -> StorageResult<()> {
        let detached = self.store.delete_category(id).await?;
        evict(&self.cache, &keys::category(id)).await;
        for event_id in &detached {
            evict(&self.cache, &keys::event(*event_id)).await;
        }
        invalidate(&self.cache, keys::CATEGORIES_LIST_INDEX).await;
        invalidate(&self.cache, keys::EVENTS_LIST_INDEX).await;
        tracing::info!(category_id = %id, detached = detached.len(), "category deleted");
        Ok(())
    }
}
