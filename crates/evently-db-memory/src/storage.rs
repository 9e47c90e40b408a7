use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use evently_storage::{
    Category, CategoryStore, CategoryUpdate, Event, EventPage, EventStore, EventUpdate,
    ListParams, NewCategory, NewEvent, SearchParams, SortDirection, SortField, StorageError,
};
use uuid::Uuid;

/// In-memory storage backend.
///
/// Events and categories live in separate concurrent maps keyed by id. Listing
/// takes a snapshot of the map, sorts it and slices out the requested page.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    events: DashMap<Uuid, Event>,
    categories: DashMap<Uuid, Category>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Returns the backend name.
    pub fn backend_name(&self) -> &'static str {
        "in-memory"
    }

    fn sorted_events(&self, params: &ListParams, filter: impl Fn(&Event) -> bool) -> Vec<Event> {
        let mut events: Vec<Event> = self
            .events
            .iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        events.sort_by(|a, b| compare_events(a, b, params.sort_by, params.sort_dir));
        events
    }
}

fn compare_events(a: &Event, b: &Event, field: SortField, dir: SortDirection) -> Ordering {
    let ord = match field {
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::StartDate => a.start_date.cmp(&b.start_date),
        SortField::EndDate => a.end_date.cmp(&b.end_date),
        SortField::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
    };
    // Tie-break on id so pages are stable.
    let ord = ord.then_with(|| a.id.cmp(&b.id));
    match dir {
        SortDirection::Asc => ord,
        SortDirection::Desc => ord.reverse(),
    }
}

fn page_of(events: Vec<Event>, params: &ListParams) -> Vec<Event> {
    let offset = usize::try_from(params.offset()).unwrap_or(usize::MAX);
    events
        .into_iter()
        .skip(offset)
        .take(params.limit() as usize)
        .collect()
}

#[async_trait]
impl EventStore for InMemoryStorage {
    async fn get_event(&self, id: Uuid) -> Result<Option<Event>, StorageError> {
        Ok(self.events.get(&id).map(|e| e.value().clone()))
    }

    async fn list_events(&self, params: &ListParams) -> Result<Vec<Event>, StorageError> {
        let events = self.sorted_events(params, |_| true);
        Ok(page_of(events, params))
    }

    async fn search_events(&self, params: &SearchParams) -> Result<EventPage, StorageError> {
        let matched = self.sorted_events(&params.paging, |event| params.matches(event));
        let total = matched.len() as u64;
        Ok(EventPage::new(
            page_of(matched, &params.paging),
            total,
            &params.paging,
        ))
    }

    async fn create_event(&self, input: NewEvent) -> Result<Event, StorageError> {
        input.validate()?;
        if let Some(category_id) = input.category_id
            && !self.categories.contains_key(&category_id)
        {
            return Err(StorageError::invalid_input(format!(
                "category {category_id} does not exist"
            )));
        }
        let event = input.into_event(Utc::now());
        self.events.insert(event.id, event.clone());
        tracing::debug!(event_id = %event.id, "event created");
        Ok(event)
    }

    async fn update_event(&self, id: Uuid, update: EventUpdate) -> Result<Event, StorageError> {
        update.validate()?;
        let mut entry = self
            .events
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found("event", id))?;
        update.apply(entry.value_mut(), Utc::now());
        Ok(entry.value().clone())
    }

    async fn delete_event(&self, id: Uuid) -> Result<(), StorageError> {
        self.events
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found("event", id))
    }
}

#[async_trait]
impl CategoryStore for InMemoryStorage {
    async fn get_category(&self, id: Uuid) -> Result<Option<Category>, StorageError> {
        Ok(self.categories.get(&id).map(|c| c.value().clone()))
    }

    async fn list_categories(&self) -> Result<Vec<Category>, StorageError> {
        let mut categories: Vec<Category> =
            self.categories.iter().map(|c| c.value().clone()).collect();
        categories.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(categories)
    }

    async fn create_category(&self, input: NewCategory) -> Result<Category, StorageError> {
        input.validate()?;
        let taken = self
            .categories
            .iter()
            .any(|c| c.name.eq_ignore_ascii_case(&input.name));
        if taken {
            return Err(StorageError::already_exists("category", input.name));
        }
        let now = Utc::now();
        let category = Category {
            id: Uuid::new_v4(),
            name: input.name,
            description: input.description,
            created_at: now,
            updated_at: now,
        };
        self.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn update_category(
        &self,
        id: Uuid,
        update: CategoryUpdate,
    ) -> Result<Category, StorageError> {
        let mut entry = self
            .categories
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found("category", id))?;
        update.apply(entry.value_mut(), Utc::now());
        Ok(entry.value().clone())
    }

    async fn delete_category(&self, id: Uuid) -> Result<Vec<Uuid>, StorageError> {
        self.categories
            .remove(&id)
            .ok_or_else(|| StorageError::not_found("category", id))?;
        let now = Utc::now();
        let mut detached = Vec::new();
        for mut event in self.events.iter_mut() {
            if event.category_id == Some(id) {
                event.category_id = None;
                event.updated_at = now;
                detached.push(event.id);
            }
        }
        Ok(detached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn new_event(title: &str, start_offset_hours: i64) -> NewEvent {
        let start = Utc.with_ymd_and_hms(2026, 5, 1, 18, 0, 0).unwrap()
            + Duration::hours(start_offset_hours);
        NewEvent {
            title: title.to_string(),
            description: format!("{title} description"),
            start_date: start,
            end_date: start + Duration::hours(3),
            creator_id: Uuid::new_v4(),
            category_id: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_event() {
        let storage = InMemoryStorage::new();
        let created = storage.create_event(new_event("Meetup", 0)).await.unwrap();

        let fetched = storage.get_event(created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert!(storage.get_event(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_events_sorted_and_paged() {
        let storage = InMemoryStorage::new();
        for (i, title) in ["c", "a", "d", "b"].iter().enumerate() {
            storage
                .create_event(new_event(title, i as i64))
                .await
                .unwrap();
        }

        let params = ListParams::new(1, 2)
            .unwrap()
            .with_sort(SortField::Title, SortDirection::Asc);
        let first: Vec<_> = storage
            .list_events(&params)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(first, vec!["a", "b"]);

        let params = ListParams::new(2, 2)
            .unwrap()
            .with_sort(SortField::StartDate, SortDirection::Desc);
        let second: Vec<_> = storage
            .list_events(&params)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(second, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_search_counts_all_matches() {
        let storage = InMemoryStorage::new();
        for i in 0..5 {
            storage
                .create_event(new_event(&format!("Rust meetup {i}"), i))
                .await
                .unwrap();
        }
        storage.create_event(new_event("Go night", 9)).await.unwrap();

        let params = SearchParams {
            query: Some("RUST".into()),
            paging: ListParams::new(1, 2).unwrap(),
            ..SearchParams::default()
        };
        let page = storage.search_events(&params).await.unwrap();
        assert_eq!(page.total_count, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.events.len(), 2);
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_event() {
        let storage = InMemoryStorage::new();
        let missing = Uuid::new_v4();
        let err = storage.delete_event(missing).await.unwrap_err();
        assert!(err.is_not_found());

        let update = EventUpdate {
            title: "x".into(),
            description: String::new(),
            start_date: Utc::now(),
            end_date: Utc::now() + Duration::hours(1),
        };
        assert!(storage.update_event(missing, update).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_category_name_is_unique() {
        let storage = InMemoryStorage::new();
        let input = NewCategory {
            name: "Music".into(),
            description: String::new(),
        };
        storage.create_category(input.clone()).await.unwrap();
        let err = storage
            .create_category(NewCategory {
                name: "music".into(),
                ..input
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_delete_category_detaches_events() {
        let storage = InMemoryStorage::new();
        let category = storage
            .create_category(NewCategory {
                name: "Sports".into(),
                description: String::new(),
            })
            .await
            .unwrap();
        let mut input = new_event("Match", 0);
        input.category_id = Some(category.id);
        let event = storage.create_event(input).await.unwrap();

        let detached = storage.delete_category(category.id).await.unwrap();
        assert_eq!(detached, vec![event.id]);
        let event = storage.get_event(event.id).await.unwrap().unwrap();
        assert_eq!(event.category_id, None);
        assert!(storage.delete_category(category.id).await.unwrap_err().is_not_found());
    }
}
