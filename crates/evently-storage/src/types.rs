//! Domain types shared by every storage backend.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageError;

/// Upper bound for `page_size` on list and search queries.
pub const MAX_PAGE_SIZE: u32 = 100;

const DEFAULT_PAGE_SIZE: u32 = 10;

/// A stored event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub creator_id: Uuid,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvent {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub creator_id: Uuid,
    #[serde(default)]
    pub category_id: Option<Uuid>,
}

impl NewEvent {
    /// Checks required fields and the date ordering.
    pub fn validate(&self) -> Result<(), StorageError> {
        validate_event_fields(&self.title, self.start_date, self.end_date)
    }

    /// Materializes the input into an [`Event`] with a fresh id.
    #[must_use]
    pub fn into_event(self, now: DateTime<Utc>) -> Event {
        Event {
            id: Uuid::new_v4(),
            title: self.title,
            description: self.description,
            start_date: self.start_date,
            end_date: self.end_date,
            creator_id: self.creator_id,
            category_id: self.category_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Input for replacing the mutable fields of an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventUpdate {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl EventUpdate {
    pub fn validate(&self) -> Result<(), StorageError> {
        validate_event_fields(&self.title, self.start_date, self.end_date)
    }

    /// Applies the update to an existing event.
    pub fn apply(self, event: &mut Event, now: DateTime<Utc>) {
        event.title = self.title;
        event.description = self.description;
        event.start_date = self.start_date;
        event.end_date = self.end_date;
        event.updated_at = now;
    }
}

fn validate_event_fields(
    title: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<(), StorageError> {
    if title.trim().is_empty() {
        return Err(StorageError::invalid_input("title is required"));
    }
    if end <= start {
        return Err(StorageError::invalid_input(
            "end_date must be after start_date",
        ));
    }
    Ok(())
}

/// A stored event category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl NewCategory {
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.name.trim().is_empty() {
            return Err(StorageError::invalid_input("name is required"));
        }
        Ok(())
    }
}

/// Partial category update. Empty or missing fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl CategoryUpdate {
    /// Applies non-empty fields. Returns `true` if anything changed.
    pub fn apply(self, category: &mut Category, now: DateTime<Utc>) -> bool {
        let mut changed = false;
        if let Some(name) = self.name.filter(|n| !n.trim().is_empty()) {
            category.name = name;
            changed = true;
        }
        if let Some(description) = self.description.filter(|d| !d.is_empty()) {
            category.description = description;
            changed = true;
        }
        if changed {
            category.updated_at = now;
        }
        changed
    }
}

/// Whitelisted sort columns for event listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortField {
    #[default]
    CreatedAt,
    StartDate,
    EndDate,
    Title,
}

impl SortField {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::StartDate => "start_date",
            Self::EndDate => "end_date",
            Self::Title => "title",
        }
    }
}

impl FromStr for SortField {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "created_at" => Ok(Self::CreatedAt),
            "start_date" => Ok(Self::StartDate),
            "end_date" => Ok(Self::EndDate),
            "title" => Ok(Self::Title),
            other => Err(StorageError::invalid_input(format!(
                "unsupported sort_by '{other}'"
            ))),
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl FromStr for SortDirection {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "" | "desc" => Ok(Self::Desc),
            other => Err(StorageError::invalid_input(format!(
                "unsupported sort_dir '{other}'"
            ))),
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pagination and ordering for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListParams {
    pub page: u32,
    pub page_size: u32,
    pub sort_by: SortField,
    pub sort_dir: SortDirection,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            sort_by: SortField::default(),
            sort_dir: SortDirection::default(),
        }
    }
}

impl ListParams {
    /// Creates validated pagination parameters.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidInput` if `page < 1` or `page_size` is outside `1..=100`.
    pub fn new(page: u32, page_size: u32) -> Result<Self, StorageError> {
        if page < 1 {
            return Err(StorageError::invalid_input("page must be >= 1"));
        }
        if page_size < 1 || page_size > MAX_PAGE_SIZE {
            return Err(StorageError::invalid_input(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        Ok(Self {
            page,
            page_size,
            ..Self::default()
        })
    }

    #[must_use]
    pub fn with_sort(mut self, sort_by: SortField, sort_dir: SortDirection) -> Self {
        self.sort_by = sort_by;
        self.sort_dir = sort_dir;
        self
    }

    #[must_use]
    pub fn limit(&self) -> u32 {
        self.page_size
    }

    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }
}

/// Filters for full-text event search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchParams {
    /// Matched case-insensitively against title and description.
    pub query: Option<String>,
    /// Events starting at or after this instant.
    pub start_date: Option<DateTime<Utc>>,
    /// Events ending at or before this instant.
    pub end_date: Option<DateTime<Utc>>,
    pub creator: Option<Uuid>,
    pub paging: ListParams,
}

impl SearchParams {
    /// Returns `true` if the event satisfies every filter (paging is ignored).
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(q) = self.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            let q = q.to_lowercase();
            if !event.title.to_lowercase().contains(&q)
                && !event.description.to_lowercase().contains(&q)
            {
                return false;
            }
        }
        if self.start_date.is_some_and(|start| event.start_date < start) {
            return false;
        }
        if self.end_date.is_some_and(|end| event.end_date > end) {
            return false;
        }
        if self.creator.is_some_and(|creator| event.creator_id != creator) {
            return false;
        }
        true
    }
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPage {
    pub events: Vec<Event>,
    pub total_count: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

impl EventPage {
    #[must_use]
    pub fn new(events: Vec<Event>, total_count: u64, paging: &ListParams) -> Self {
        let total_pages = total_count.div_ceil(u64::from(paging.page_size.max(1)));
        Self {
            events,
            total_count,
            page: paging.page,
            page_size: paging.page_size,
            total_pages: u32::try_from(total_pages).unwrap_or(u32::MAX),
        }
    }
}
