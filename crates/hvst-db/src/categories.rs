//! Database operations for `categories`.

use chrono::{DateTime, Utc};
use hvst_core::{CategoryRecord, IdentityKey};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `categories` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CategoryRow {
    pub id: i64,
    pub unique_key: String,
    pub name: String,
    pub slug: String,
    pub url: String,
    pub icon_url: Option<String>,
    pub city: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Upserts a category keyed by `unique_key`.
///
/// Returns `(id, is_new)`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_category<'e, E>(
    executor: E,
    key: &IdentityKey,
    category: &CategoryRecord,
) -> Result<(i64, bool), DbError>
where
    E: sqlx::PgExecutor<'e>,
{
    let row: (i64, bool) = sqlx::query_as(
        "INSERT INTO categories (unique_key, name, slug, url, icon_url, city) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (unique_key) DO UPDATE SET \
             slug       = EXCLUDED.slug, \
             url        = EXCLUDED.url, \
             icon_url   = COALESCE(EXCLUDED.icon_url, categories.icon_url), \
             updated_at = NOW() \
         RETURNING id, (xmax = 0) AS is_new",
    )
    .bind(key.as_str())
    .bind(&category.name)
    .bind(&category.slug)
    .bind(&category.url)
    .bind(&category.icon_url)
    .bind(&category.city)
    .fetch_one(executor)
    .await?;

    Ok(row)
}

/// Lists categories for a city ordered by name, optionally narrowed to one slug.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_categories(
    pool: &PgPool,
    city: &str,
    slug: Option<&str>,
) -> Result<Vec<CategoryRow>, DbError> {
    let rows = sqlx::query_as::<_, CategoryRow>(
        "SELECT id, unique_key, name, slug, url, icon_url, city, created_at, updated_at \
         FROM categories \
         WHERE city = $1 AND ($2::text IS NULL OR slug = $2) \
         ORDER BY name",
    )
    .bind(city)
    .bind(slug)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
