//! Cache key conventions.
//!
//! Single items are `<entity>:<id>`, derived pages are `<entity>:list:...`.
//! Sort options reach this module already canonicalized through
//! [`SortField`](evently_storage::SortField), so equivalent queries share a key.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use evently_storage::{ListParams, SearchParams};

/// Every cached event listing, for pattern invalidation.
pub const EVENTS_LIST_PATTERN: &str = "events:list:*";

pub const CATEGORIES_LIST: &str = "categories:list:all";

/// Reverse index of cached event listings and searches.
pub const EVENTS_LIST_INDEX: &str = "cache:index:events:lists";

/// Reverse index of cached category listings.
pub const CATEGORIES_LIST_INDEX: &str = "cache:index:categories:lists";

pub fn event(id: Uuid) -> String {
    format!("event:{id}")
}

pub fn category(id: Uuid) -> String {
    format!("category:{id}")
}

pub fn events_list(params: &ListParams) -> String {
    format!(
        "events:list:{}:{}:{}:{}",
        params.limit(),
        params.offset(),
        params.sort_by,
        params.sort_dir
    )
}

/// Search results are keyed by a digest of the normalized filters.
pub fn events_search(params: &SearchParams) -> String {
    format!("events:list:search:{}", search_fingerprint(params))
}

fn search_fingerprint(params: &SearchParams) -> String {
    let query = params
        .query
        .as_deref()
        .map(|q| q.trim().to_lowercase())
        .unwrap_or_default();
    let start = params.start_date.map(|d| d.to_rfc3339()).unwrap_or_default();
    let end = params.end_date.map(|d| d.to_rfc3339()).unwrap_or_default();
    let creator = params.creator.map(|c| c.to_string()).unwrap_or_default();
    let canonical = format!(
        "q={query}|start={start}|end={end}|creator={creator}|limit={}|offset={}|sort={}|dir={}",
        params.paging.limit(),
        params.paging.offset(),
        params.paging.sort_by,
        params.paging.sort_dir,
    );
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use evently_storage::{SortDirection, SortField};

    #[test]
    fn list_key_layout() {
        let params = ListParams::new(3, 20)
            .unwrap()
            .with_sort(SortField::StartDate, SortDirection::Asc);
        assert_eq!(events_list(&params), "events:list:20:40:start_date:asc");
        assert_eq!(
            events_list(&ListParams::default()),
            "events:list:10:0:created_at:desc"
        );
    }

    #[test]
    fn equivalent_searches_share_a_key() {
        let a = SearchParams {
            query: Some("  Jazz ".into()),
            ..SearchParams::default()
        };
        let b = SearchParams {
            query: Some("jazz".into()),
            ..SearchParams::default()
        };
        assert_eq!(events_search(&a), events_search(&b));

        let c = SearchParams {
            query: Some("jazz".into()),
            paging: ListParams::new(2, 10).unwrap(),
            ..SearchParams::default()
        };
        assert_ne!(events_search(&a), events_search(&c));
    }

    #[test]
    fn search_keys_fall_under_list_pattern() {
        let key = events_search(&SearchParams::default());
        assert!(key.starts_with("events:list:search:"));
        assert_eq!(key.len(), "events:list:search:".len() + 64);
    }
}
