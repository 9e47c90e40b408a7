//! Event queries.
//!
//! `ORDER BY` is interpolated from the whitelisted [`SortField`] and
//! [`SortDirection`] enums; every user value is bound as a parameter.

use chrono::{DateTime, Utc};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::PgPool;
use uuid::Uuid;

use evently_storage::{
    Event, EventPage, EventUpdate, ListParams, NewEvent, SearchParams, StorageError,
};

use crate::error::map_query_error;

const EVENT_COLUMNS: &str = "id, title, description, start_date, end_date, creator_id, \
                             category_id, created_at, updated_at";

const SEARCH_FILTER: &str = "($1::text IS NULL OR title ILIKE $1 OR description ILIKE $1) \
     AND ($2::timestamptz IS NULL OR start_date >= $2) \
     AND ($3::timestamptz IS NULL OR end_date <= $3) \
     AND ($4::uuid IS NULL OR creator_id = $4)";

type EventRow = (
    Uuid,
    String,
    Option<String>,
    DateTime<Utc>,
    DateTime<Utc>,
    Uuid,
    Option<Uuid>,
    DateTime<Utc>,
    DateTime<Utc>,
);

fn row_to_event(row: EventRow) -> Event {
    let (
        id,
        title,
        description,
        start_date,
        end_date,
        creator_id,
        category_id,
        created_at,
        updated_at,
    ) = row;
    Event {
        id,
        title,
        description: description.unwrap_or_default(),
        start_date,
        end_date,
        creator_id,
        category_id,
        created_at,
        updated_at,
    }
}

fn order_clause(params: &ListParams) -> String {
    format!(
        "ORDER BY {} {}, id {}",
        params.sort_by.as_str(),
        params.sort_dir.as_str(),
        params.sort_dir.as_str()
    )
}

fn limit_offset(params: &ListParams) -> (i64, i64) {
    (
        i64::from(params.limit()),
        i64::try_from(params.offset()).unwrap_or(i64::MAX),
    )
}

/// Escapes `LIKE` wildcards in a user query and wraps it for substring matching.
fn like_pattern(raw: &str) -> String {
    let escaped = raw
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<Event>, StorageError> {
    let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1");
    let row: Option<EventRow> = query_as(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| map_query_error(e, "event", &id.to_string()))?;
    Ok(row.map(row_to_event))
}

pub async fn list(pool: &PgPool, params: &ListParams) -> Result<Vec<Event>, StorageError> {
    let sql = format!(
        "SELECT {EVENT_COLUMNS} FROM events {} LIMIT $1 OFFSET $2",
        order_clause(params)
    );
    let (limit, offset) = limit_offset(params);
    let rows: Vec<EventRow> = query_as(&sql)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .map_err(|e| map_query_error(e, "event", "list"))?;
    Ok(rows.into_iter().map(row_to_event).collect())
}

pub async fn search(pool: &PgPool, params: &SearchParams) -> Result<EventPage, StorageError> {
    let pattern = params
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(like_pattern);

    let count_sql = format!("SELECT COUNT(*) FROM events WHERE {SEARCH_FILTER}");
    let total: i64 = query_scalar(&count_sql)
        .bind(pattern.as_deref())
        .bind(params.start_date)
        .bind(params.end_date)
        .bind(params.creator)
        .fetch_one(pool)
        .await
        .map_err(|e| map_query_error(e, "event", "search"))?;

    let sql = format!(
        "SELECT {EVENT_COLUMNS} FROM events WHERE {SEARCH_FILTER} {} LIMIT $5 OFFSET $6",
        order_clause(&params.paging)
    );
    let (limit, offset) = limit_offset(&params.paging);
    let rows: Vec<EventRow> = query_as(&sql)
        .bind(pattern.as_deref())
        .bind(params.start_date)
        .bind(params.end_date)
        .bind(params.creator)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .map_err(|e| map_query_error(e, "event", "search"))?;

    Ok(EventPage::new(
        rows.into_iter().map(row_to_event).collect(),
        u64::try_from(total).unwrap_or(0),
        &params.paging,
    ))
}

pub async fn insert(pool: &PgPool, input: NewEvent) -> Result<Event, StorageError> {
    let event = input.into_event(Utc::now());
    let sql = format!(
        "INSERT INTO events ({EVENT_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {EVENT_COLUMNS}"
    );
    let row: EventRow = query_as(&sql)
        .bind(event.id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.start_date)
        .bind(event.end_date)
        .bind(event.creator_id)
        .bind(event.category_id)
        .bind(event.created_at)
        .bind(event.updated_at)
        .fetch_one(pool)
        .await
        .map_err(|e| map_query_error(e, "event", &event.id.to_string()))?;
    Ok(row_to_event(row))
}

pub async fn update(pool: &PgPool, id: Uuid, update: EventUpdate) -> Result<Event, StorageError> {
    let sql = format!(
        "UPDATE events SET title = $2, description = $3, start_date = $4, end_date = $5, \
         updated_at = $6 WHERE id = $1 RETURNING {EVENT_COLUMNS}"
    );
    let row: Option<EventRow> = query_as(&sql)
        .bind(id)
        .bind(&update.title)
        .bind(&update.description)
        .bind(update.start_date)
        .bind(update.end_date)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await
        .map_err(|e| map_query_error(e, "event", &id.to_string()))?;
    row.map(row_to_event)
        .ok_or_else(|| StorageError::not_found("event", id))
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), StorageError> {
    let result = query("DELETE FROM events WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| map_query_error(e, "event", &id.to_string()))?;
    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("event", id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use evently_storage::{SortDirection, SortField};

    #[test]
    fn test_order_clause_uses_whitelisted_columns() {
        let params = ListParams::default().with_sort(SortField::StartDate, SortDirection::Asc);
        assert_eq!(order_clause(&params), "ORDER BY start_date asc, id asc");
        assert_eq!(
            order_clause(&ListParams::default()),
            "ORDER BY created_at desc, id desc"
        );
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("jazz"), "%jazz%");
    }
}
