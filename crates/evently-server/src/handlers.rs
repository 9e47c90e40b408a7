use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use evently_storage::{
    Category, CategoryUpdate, Event, EventPage, EventUpdate, ListParams, NewCategory, NewEvent,
    SearchParams, SortDirection, SortField,
};

use crate::error::{ApiError, ApiResult};
use crate::middleware::Principal;
use crate::server::AppState;

// ---- Health ----

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.health.check_all().await;
    let status = if report.is_up() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

pub async fn readiness(state: State<AppState>) -> impl IntoResponse {
    health(state).await
}

/// Answers while the process runs; consults nothing.
pub async fn liveness() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

// ---- Query parameters ----

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub sort_by: Option<String>,
    pub sort_dir: Option<String>,
}

impl ListQuery {
    fn into_params(self) -> ApiResult<ListParams> {
        paging(self.page, self.page_size, self.sort_by, self.sort_dir)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub query: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub creator: Option<Uuid>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub sort_by: Option<String>,
    pub sort_dir: Option<String>,
}

impl SearchQuery {
    fn into_params(self) -> ApiResult<SearchParams> {
        Ok(SearchParams {
            query: self
                .query
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty()),
            start_date: self.start_date,
            end_date: self.end_date,
            creator: self.creator,
            paging: paging(self.page, self.page_size, self.sort_by, self.sort_dir)?,
        })
    }
}

fn paging(
    page: Option<u32>,
    page_size: Option<u32>,
    sort_by: Option<String>,
    sort_dir: Option<String>,
) -> ApiResult<ListParams> {
    let defaults = ListParams::default();
    let sort_by: SortField = sort_by.as_deref().unwrap_or_default().parse()?;
    let sort_dir: SortDirection = sort_dir.as_deref().unwrap_or_default().parse()?;
    Ok(ListParams::new(
        page.unwrap_or(defaults.page),
        page_size.unwrap_or(defaults.page_size),
    )?
    .with_sort(sort_by, sort_dir))
}

// ---- Events ----

/// Event body as sent by clients; the creator comes from the principal.
#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub category_id: Option<Uuid>,
}

pub async fn list_events(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Event>>> {
    let Query(query) = query?;
    let params = query.into_params()?;
    Ok(Json(state.events.list(&params).await?))
}

pub async fn search_events(
    State(state): State<AppState>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> ApiResult<Json<EventPage>> {
    let Query(query) = query?;
    let params = query.into_params()?;
    Ok(Json(state.events.search(&params).await?))
}

pub async fn get_event(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Event>> {
    let Path(id) = id?;
    Ok(Json(state.events.get(id).await?))
}

pub async fn create_event(
    State(state): State<AppState>,
    principal: Principal,
    body: Result<Json<CreateEventRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = body?;
    let creator_id = principal
        .user_id()
        .ok_or_else(|| ApiError::Forbidden("principal cannot own events".into()))?;

    let input = NewEvent {
        title: body.title,
        description: body.description,
        start_date: body.start_date,
        end_date: body.end_date,
        creator_id,
        category_id: body.category_id,
    };
    let event = state.events.create(input).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn update_event(
    State(state): State<AppState>,
    principal: Principal,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<EventUpdate>, JsonRejection>,
) -> ApiResult<Json<Event>> {
    let Path(id) = id?;
    let Json(update) = body?;
    ensure_owner(&state, &principal, id).await?;
    Ok(Json(state.events.update(id, update).await?))
}

pub async fn delete_event(
    State(state): State<AppState>,
    principal: Principal,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<StatusCode> {
    let Path(id) = id?;
    ensure_owner(&state, &principal, id).await?;
    state.events.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Only the creator may modify an event.
async fn ensure_owner(state: &AppState, principal: &Principal, id: Uuid) -> ApiResult<()> {
    let event = state.events.get(id).await?;
    if principal.user_id() == Some(event.creator_id) {
        return Ok(());
    }
    tracing::info!(event_id = %id, principal = %principal.id, "event modification denied");
    Err(ApiError::Forbidden(
        "only the creator can modify this event".into(),
    ))
}

// ---- Categories ----

pub async fn list_categories(State(state): State<AppState>) -> ApiResult<Json<Vec<Category>>> {
    Ok(Json(state.categories.list().await?))
}

pub async fn get_category(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Category>> {
    let Path(id) = id?;
    Ok(Json(state.categories.get(id).await?))
}

pub async fn create_category(
    State(state): State<AppState>,
    _principal: Principal,
    body: Result<Json<NewCategory>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(input) = body?;
    let category = state.categories.create(input).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn update_category(
    State(state): State<AppState>,
    _principal: Principal,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<CategoryUpdate>, JsonRejection>,
) -> ApiResult<Json<Category>> {
    let Path(id) = id?;
    let Json(update) = body?;
    Ok(Json(state.categories.update(id, update).await?))
}

pub async fn delete_category(
    State(state): State<AppState>,
    _principal: Principal,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<StatusCode> {
    let Path(id) = id?;
    state.categories.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_query_defaults() {
        let params = ListQuery::default().into_params().unwrap();
        assert_eq!(params, ListParams::default());
    }

    #[test]
    fn list_query_rejects_oversized_pages() {
        let query = ListQuery {
            page_size: Some(500),
            ..ListQuery::default()
        };
        let err = query.into_params().unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn sort_fields_are_canonicalized() {
        let query = ListQuery {
            sort_by: Some("START_DATE".into()),
            sort_dir: Some("Asc".into()),
            ..ListQuery::default()
        };
        let params = query.into_params().unwrap();
        assert_eq!(params.sort_by, SortField::StartDate);
        assert_eq!(params.sort_dir, SortDirection::Asc);

        let query = ListQuery {
            sort_by: Some("password".into()),
            ..ListQuery::default()
        };
        assert!(query.into_params().is_err());
    }

    #[test]
    fn blank_search_text_is_dropped() {
        let query = SearchQuery {
            query: Some("   ".into()),
            ..SearchQuery::default()
        };
        assert_eq!(query.into_params().unwrap().query, None);
    }
}
