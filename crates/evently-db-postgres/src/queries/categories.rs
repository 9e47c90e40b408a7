//! Category queries.

use chrono::{DateTime, Utc};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::PgPool;
use uuid::Uuid;

use evently_storage::{Category, NewCategory, StorageError};

use crate::error::map_query_error;

const CATEGORY_COLUMNS: &str = "id, name, description, created_at, updated_at";

type CategoryRow = (Uuid, String, Option<String>, DateTime<Utc>, DateTime<Utc>);

fn row_to_category(row: CategoryRow) -> Category {
    let (id, name, description, created_at, updated_at) = row;
    Category {
        id,
        name,
        description: description.unwrap_or_default(),
        created_at,
        updated_at,
    }
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<Category>, StorageError> {
    let sql = format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1");
    let row: Option<CategoryRow> = query_as(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| map_query_error(e, "category", &id.to_string()))?;
    Ok(row.map(row_to_category))
}

pub async fn list(pool: &PgPool) -> Result<Vec<Category>, StorageError> {
    let sql = format!("SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY name ASC");
    let rows: Vec<CategoryRow> = query_as(&sql)
        .fetch_all(pool)
        .await
        .map_err(|e| map_query_error(e, "category", "list"))?;
    Ok(rows.into_iter().map(row_to_category).collect())
}

pub async fn insert(pool: &PgPool, input: NewCategory) -> Result<Category, StorageError> {
    let now = Utc::now();
    let sql = format!(
        "INSERT INTO categories ({CATEGORY_COLUMNS}) VALUES ($1, $2, $3, $4, $4) \
         RETURNING {CATEGORY_COLUMNS}"
    );
    let row: CategoryRow = query_as(&sql)
        .bind(Uuid::new_v4())
        .bind(&input.name)
        .bind(&input.description)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(|e| map_query_error(e, "category", &input.name))?;
    Ok(row_to_category(row))
}

/// Writes back a category whose fields were already merged by the caller.
pub async fn save(pool: &PgPool, category: &Category) -> Result<Category, StorageError> {
    let sql = format!(
        "UPDATE categories SET name = $2, description = $3, updated_at = $4 \
         WHERE id = $1 RETURNING {CATEGORY_COLUMNS}"
    );
    let row: Option<CategoryRow> = query_as(&sql)
        .bind(category.id)
        .bind(&category.name)
        .bind(&category.description)
        .bind(category.updated_at)
        .fetch_optional(pool)
        .await
        .map_err(|e| map_query_error(e, "category", &category.name))?;
    row.map(row_to_category)
        .ok_or_else(|| StorageError::not_found("category", category.id))
}

/// Detaches the category's events, then deletes it, in one transaction.
///
/// Events are detached explicitly so their ids are known whatever the
/// foreign key's `ON DELETE` action is.
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<Vec<Uuid>, StorageError> {
    let key = id.to_string();
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| map_query_error(e, "category", &key))?;

    let detached: Vec<Uuid> = query_scalar(
        "UPDATE events SET category_id = NULL, updated_at = NOW() \
         WHERE category_id = $1 RETURNING id",
    )
    .bind(id)
    .fetch_all(&mut *tx)
    .await
    .map_err(|e| map_query_error(e, "category", &key))?;

    let result = query("DELETE FROM categories WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_query_error(e, "category", &key))?;
    if result.rows_affected() == 0 {
        // Dropping the transaction rolls back the detach
        return Err(StorageError::not_found("category", id));
    }

    tx.commit()
        .await
        .map_err(|e| map_query_error(e, "category", &key))?;
    Ok(detached)
}
