//! Database operations for `items` and `price_history`.

use chrono::{DateTime, Utc};
use hvst_core::{IdentityKey, ItemRecord};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `price_history` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PriceHistoryRow {
    pub id: i64,
    pub item_id: i64,
    pub price: Decimal,
    pub original_price: Option<Decimal>,
    pub observed_at: DateTime<Utc>,
}

/// Result of [`save_item`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemSave {
    pub id: i64,
    pub is_new: bool,
    /// `true` when a `price_history` row was appended.
    pub price_changed: bool,
}

// ---------------------------------------------------------------------------
// items operations
// ---------------------------------------------------------------------------

/// Upserts an item and records a price change, in one transaction.
///
/// The existing row is read with `FOR UPDATE` so the price comparison and the
/// overwrite cannot interleave with another writer of the same key. A
/// `price_history` row is appended only when a stored item's price differs
/// from `item.price`; first sightings append nothing.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails; the transaction is
/// rolled back on drop.
pub async fn save_item(
    pool: &PgPool,
    key: &IdentityKey,
    item: &ItemRecord,
) -> Result<ItemSave, DbError> {
    let mut tx = pool.begin().await?;

    let stored_price: Option<Decimal> =
        sqlx::query_scalar::<_, Decimal>("SELECT price FROM items WHERE unique_key = $1 FOR UPDATE")
            .bind(key.as_str())
            .fetch_optional(&mut *tx)
            .await?;

    let price_changed = stored_price.is_some_and(|p| p != item.price);

    let (id, is_new): (i64, bool) = sqlx::query_as(
        "INSERT INTO items \
             (unique_key, merchant_id, name, description, category, price, original_price, \
              image_url, is_available, preparation_time, serves, calories, ingredients, \
              allergens) \
         VALUES ($1, $2, $3, $4, $5, $6::numeric(10,2), $7::numeric(10,2), \
                 $8, $9, $10, $11, $12, $13, \
                 $14) \
         ON CONFLICT (unique_key) DO UPDATE SET \
             description      = EXCLUDED.description, \
             price            = EXCLUDED.price, \
             original_price   = EXCLUDED.original_price, \
             image_url        = COALESCE(EXCLUDED.image_url, items.image_url), \
             is_available     = EXCLUDED.is_available, \
             preparation_time = EXCLUDED.preparation_time, \
             serves           = EXCLUDED.serves, \
             calories         = EXCLUDED.calories, \
             ingredients      = EXCLUDED.ingredients, \
             allergens        = EXCLUDED.allergens, \
             updated_at       = NOW() \
         RETURNING id, (xmax = 0) AS is_new",
    )
    .bind(key.as_str())
    .bind(item.merchant_id)
    .bind(&item.name)
    .bind(&item.description)
    .bind(&item.category)
    .bind(item.price)
    .bind(item.original_price)
    .bind(&item.image_url)
    .bind(item.is_available)
    .bind(&item.preparation_time)
    .bind(item.serves)
    .bind(item.calories)
    .bind(&item.ingredients)
    .bind(&item.allergens)
    .fetch_one(&mut *tx)
    .await?;

    if price_changed {
        sqlx::query(
            "INSERT INTO price_history (item_id, price, original_price) \
             VALUES ($1, $2::numeric(10,2), $3::numeric(10,2))",
        )
        .bind(id)
        .bind(item.price)
        .bind(item.original_price)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(ItemSave {
        id,
        is_new,
        price_changed,
    })
}

// ---------------------------------------------------------------------------
// price_history operations
// ---------------------------------------------------------------------------

/// Returns the price history of one item, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_price_history(
    pool: &PgPool,
    item_id: i64,
) -> Result<Vec<PriceHistoryRow>, DbError> {
    let rows = sqlx::query_as::<_, PriceHistoryRow>(
        "SELECT id, item_id, price, original_price, observed_at \
         FROM price_history \
         WHERE item_id = $1 \
         ORDER BY observed_at DESC, id DESC",
    )
    .bind(item_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
