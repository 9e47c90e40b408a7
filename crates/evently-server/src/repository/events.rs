use uuid::Uuid;

use evently_storage::{
    DynEventStore, Event, EventPage, EventUpdate, ListParams, NewEvent, SearchParams,
    StorageError, StorageResult,
};

use super::{CacheTtls, evict, fill, fill_derived, invalidate, lookup};
use crate::cache::{Cache, keys};

#[derive(Clone)]
pub struct EventRepository {
    store: DynEventStore,
    cache: Cache,
    ttls: CacheTtls,
}

impl EventRepository {
    pub fn new(store: DynEventStore, cache: Cache, ttls: CacheTtls) -> Self {
        Self { store, cache, ttls }
    }

    pub async fn get(&self, id: Uuid) -> StorageResult<Event> {
        let key = keys::event(id);
        if let Some(event) = lookup::<Event>(&self.cache, &key).await {
            return Ok(event);
        }
        let event = self
            .store
            .get_event(id)
            .await?
            .ok_or_else(|| StorageError::not_found("event", id))?;
        fill(&self.cache, &key, &event, self.ttls.item).await;
        Ok(event)
    }

    pub async fn list(&self, params: &ListParams) -> StorageResult<Vec<Event>> {
        let key = keys::events_list(params);
        if let Some(events) = lookup::<Vec<Event>>(&self.cache, &key).await {
            return Ok(events);
        }
        let events = self.store.list_events(params).await?;
        fill_derived(
            &self.cache,
            keys::EVENTS_LIST_INDEX,
            &key,
            &events,
            self.ttls.list,
        )
        .await;
        Ok(events)
    }

    pub async fn search(&self, params: &SearchParams) -> StorageResult<EventPage> {
        let key = keys::events_search(params);
        if let Some(page) = lookup::<EventPage>(&self.cache, &key).await {
            return Ok(page);
        }
        let page = self.store.search_events(params).await?;
        fill_derived(
            &self.cache,
            keys::EVENTS_LIST_INDEX,
            &key,
            &page,
            self.ttls.list,
        )
        .await;
        Ok(page)
    }

    pub async fn create(&self, input: NewEvent) -> StorageResult<Event> {
        let event = self.store.create_event(input).await?;
        fill(&self.cache, &keys::event(event.id), &event, self.ttls.item).await;
        invalidate(&self.cache, keys::EVENTS_LIST_INDEX).await;
        tracing::info!(event_id = %event.id, "event created");
        Ok(event)
    }

    pub async fn update(&self, id: Uuid, update: EventUpdate) -> StorageResult<Event> {
        let event = self.store.update_event(id, update).await?;
        fill(&self.cache, &keys::event(id), &event, self.ttls.item).await;
        invalidate(&self.cache, keys::EVENTS_LIST_INDEX).await;
        tracing::info!(event_id = %id, "event updated");
        Ok(event)
    }

    pub async fn delete(&self, id: Uuid) -> StorageResult<()> {
        self.store.delete_event(id).await?;
        evict(&self.cache, &keys::event(id)).await;
        invalidate(&self.cache, keys::EVENTS_LIST_INDEX).await;
        tracing::info!(event_id = %id, "event deleted");
        Ok(())
    }
}
