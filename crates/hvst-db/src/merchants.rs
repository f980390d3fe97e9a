//! Database operations for `merchants`.

use chrono::{DateTime, Utc};
use hvst_core::{IdentityKey, MerchantRecord};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

/// A row from the `merchants` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MerchantRow {
    pub id: i64,
    pub unique_key: String,
    pub name: String,
    pub category_id: Option<i64>,
    pub category_name: String,
    pub city: String,
    pub rating: Option<Decimal>,
    pub delivery_time: Option<String>,
    pub delivery_fee: Option<String>,
    pub distance: Option<String>,
    pub url: Option<String>,
    pub logo_url: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub opening_hours: Option<String>,
    pub minimum_order: Option<String>,
    pub payment_methods: Vec<String>,
    pub tags: Vec<String>,
    pub last_scraped_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Upserts a merchant keyed by `unique_key`.
///
/// Listing fields (rating, delivery time and fee, distance) are overwritten
/// on conflict. Profile fields keep their stored value when the new
/// observation is `NULL`, since listing cards rarely show them.
///
/// Returns `(id, is_new)`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_merchant<'e, E>(
    executor: E,
    key: &IdentityKey,
    merchant: &MerchantRecord,
) -> Result<(i64, bool), DbError>
where
    E: sqlx::PgExecutor<'e>,
{
    let row: (i64, bool) = sqlx::query_as(
        "INSERT INTO merchants \
             (unique_key, name, category_id, category_name, city, rating, delivery_time, \
              delivery_fee, distance, url, logo_url, address, phone, opening_hours, \
              minimum_order, payment_methods, tags) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, \
                 $8, $9, $10, $11, $12, $13, $14, \
                 $15, $16, $17) \
         ON CONFLICT (unique_key) DO UPDATE SET \
             rating          = EXCLUDED.rating, \
             delivery_time   = EXCLUDED.delivery_time, \
             delivery_fee    = EXCLUDED.delivery_fee, \
             distance        = EXCLUDED.distance, \
             category_id     = COALESCE(EXCLUDED.category_id, merchants.category_id), \
             url             = COALESCE(EXCLUDED.url, merchants.url), \
             logo_url        = COALESCE(EXCLUDED.logo_url, merchants.logo_url), \
             address         = COALESCE(EXCLUDED.address, merchants.address), \
             phone           = COALESCE(EXCLUDED.phone, merchants.phone), \
             opening_hours   = COALESCE(EXCLUDED.opening_hours, merchants.opening_hours), \
             minimum_order   = COALESCE(EXCLUDED.minimum_order, merchants.minimum_order), \
             payment_methods = CASE WHEN cardinality(EXCLUDED.payment_methods) > 0 \
                                    THEN EXCLUDED.payment_methods \
                                    ELSE merchants.payment_methods END, \
             tags            = CASE WHEN cardinality(EXCLUDED.tags) > 0 \
                                    THEN EXCLUDED.tags ELSE merchants.tags END, \
             last_scraped_at = NOW(), \
             updated_at      = NOW() \
         RETURNING id, (xmax = 0) AS is_new",
    )
    .bind(key.as_str())
    .bind(&merchant.name)
    .bind(merchant.category_id)
    .bind(&merchant.category)
    .bind(&merchant.city)
    .bind(merchant.rating)
    .bind(&merchant.delivery_time)
    .bind(&merchant.delivery_fee)
    .bind(&merchant.distance)
    .bind(&merchant.url)
    .bind(&merchant.logo_url)
    .bind(&merchant.address)
    .bind(&merchant.phone)
    .bind(&merchant.opening_hours)
    .bind(&merchant.minimum_order)
    .bind(&merchant.payment_methods)
    .bind(&merchant.tags)
    .fetch_one(executor)
    .await?;

    Ok(row)
}

/// Lists merchants in a city that have a page URL, best rated first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_merchants(
    pool: &PgPool,
    city: &str,
    limit: i64,
) -> Result<Vec<MerchantRow>, DbError> {
    let rows = sqlx::query_as::<_, MerchantRow>(
        "SELECT id, unique_key, name, category_id, category_name, city, rating, \
                delivery_time, delivery_fee, distance, url, logo_url, address, phone, \
                opening_hours, minimum_order, payment_methods, tags, \
                last_scraped_at, created_at, updated_at \
         FROM merchants \
         WHERE city = $1 AND url IS NOT NULL \
         ORDER BY rating DESC NULLS LAST, name \
         LIMIT $2",
    )
    .bind(city)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
