//! Postgres-backed [`IdentityStore`].

use async_trait::async_trait;
use hvst_core::{ExtractedRecord, IdentityStore, KeyLocks, SaveOutcome, StoreError};
use sqlx::PgPool;

use crate::{categories, items, merchants, DbError};

const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Upserts harvested records into Postgres, one identity at a time.
///
/// Writes for the same key are serialized in-process through [`KeyLocks`];
/// across processes the `UNIQUE (unique_key)` constraint and the row lock
/// taken by [`items::save_item`] keep upserts single-row.
pub struct PgIdentityStore {
    pool: PgPool,
    locks: KeyLocks,
}

impl PgIdentityStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            locks: KeyLocks::new(),
        }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn save(&self, record: &ExtractedRecord) -> Result<SaveOutcome, StoreError> {
        let key = record.identity_key();
        let _guard = self.locks.lock(&key).await;

        let outcome = match record {
            ExtractedRecord::Category(category) => {
                let (id, is_new) = categories::upsert_category(&self.pool, &key, category)
                    .await
                    .map_err(into_store_error)?;
                plain_outcome(id, is_new)
            }
            ExtractedRecord::Merchant(merchant) => {
                let (id, is_new) = merchants::upsert_merchant(&self.pool, &key, merchant)
                    .await
                    .map_err(into_store_error)?;
                plain_outcome(id, is_new)
            }
            ExtractedRecord::Item(item) => {
                let saved = items::save_item(&self.pool, &key, item)
                    .await
                    .map_err(|e| match e {
                        DbError::Sqlx(sqlx::Error::Database(ref db))
                            if db.code().as_deref() == Some(FOREIGN_KEY_VIOLATION) =>
                        {
                            StoreError::UnknownMerchant {
                                merchant_id: item.merchant_id,
                            }
                        }
                        other => into_store_error(other),
                    })?;
                if saved.is_new {
                    SaveOutcome::New { id: saved.id }
                } else {
                    SaveOutcome::Duplicate {
                        id: saved.id,
                        price_changed: saved.price_changed,
                    }
                }
            }
        };

        tracing::debug!(
            kind = record.kind_str(),
            name = record.name(),
            key = %key,
            ?outcome,
            "record persisted"
        );
        Ok(outcome)
    }
}

fn plain_outcome(id: i64, is_new: bool) -> SaveOutcome {
    if is_new {
        SaveOutcome::New { id }
    } else {
        SaveOutcome::Duplicate {
            id,
            price_changed: false,
        }
    }
}

fn into_store_error(err: DbError) -> StoreError {
    StoreError::Backend(Box::new(err))
}
