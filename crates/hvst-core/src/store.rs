//! Identity-keyed persistence contract shared by every storage backend.
//!
//! All writes for one [`IdentityKey`] go through [`KeyLocks`], so two workers
//! saving the same entity cannot interleave their read-compare-write steps.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;

use crate::identity::IdentityKey;
use crate::records::{ExtractedRecord, PriceHistoryEntry};

/// Lock entries are pruned once the table grows past this many keys.
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("item references merchant {merchant_id} which is not persisted")]
    UnknownMerchant { merchant_id: i64 },

    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Result of one [`IdentityStore::save`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    New { id: i64 },
    Duplicate { id: i64, price_changed: bool },
}

impl SaveOutcome {
    #[must_use]
    pub fn id(self) -> i64 {
        match self {
            SaveOutcome::New { id } | SaveOutcome::Duplicate { id, .. } => id,
        }
    }

    #[must_use]
    pub fn is_new(self) -> bool {
        matches!(self, SaveOutcome::New { .. })
    }

    #[must_use]
    pub fn price_changed(self) -> bool {
        matches!(
            self,
            SaveOutcome::Duplicate {
                price_changed: true,
                ..
            }
        )
    }
}

/// Upsert persistence keyed by [`ExtractedRecord::identity_key`].
///
/// Unseen keys are inserted and reported as [`SaveOutcome::New`]; seen keys
/// have their mutable fields updated and are reported as
/// [`SaveOutcome::Duplicate`]. For items, a [`PriceHistoryEntry`] is appended
/// exactly when the stored price differs from the observed one.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails. Entities already committed
    /// for other keys are unaffected.
    async fn save(&self, record: &ExtractedRecord) -> Result<SaveOutcome, StoreError>;
}

/// Per-key async mutexes serializing writes to one identity.
#[derive(Debug, Default)]
pub struct KeyLocks {
    inner: Mutex<HashMap<IdentityKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `key`. The lock is released when the
    /// returned guard is dropped.
    pub async fn lock(&self, key: &IdentityKey) -> OwnedMutexGuard<()> {
        let slot = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if map.len() > PRUNE_THRESHOLD {
                map.retain(|_, slot| Arc::strong_count(slot) > 1);
            }
            Arc::clone(map.entry(key.clone()).or_default())
        };
        slot.lock_owned().await
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stored projection of a record.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedEntity {
    pub id: i64,
    pub key: IdentityKey,
    pub record: ExtractedRecord,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    entities: HashMap<IdentityKey, PersistedEntity>,
    history: Vec<PriceHistoryEntry>,
}

/// Process-local [`IdentityStore`] holding everything in memory. Tests use it
/// in place of the Postgres store.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    locks: KeyLocks,
    state: Mutex<MemoryState>,
}

impl MemoryIdentityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state().entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn get(&self, key: &IdentityKey) -> Option<PersistedEntity> {
        self.state().entities.get(key).cloned()
    }

    /// Price history for one item, oldest first.
    #[must_use]
    pub fn price_history(&self, item_id: i64) -> Vec<PriceHistoryEntry> {
        self.state()
            .history
            .iter()
            .filter(|h| h.item_id == item_id)
            .cloned()
            .collect()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn save(&self, record: &ExtractedRecord) -> Result<SaveOutcome, StoreError> {
        let key = record.identity_key();
        let _guard = self.locks.lock(&key).await;
        let now = Utc::now();
        let mut state = self.state();

        if let ExtractedRecord::Item(item) = record {
            let merchant_known = state.entities.values().any(|e| {
                e.id == item.merchant_id && matches!(e.record, ExtractedRecord::Merchant(_))
            });
            if !merchant_known {
                return Err(StoreError::UnknownMerchant {
                    merchant_id: item.merchant_id,
                });
            }
        }

        if let Some(existing) = state.entities.get(&key) {
            let id = existing.id;
            let price_changed = match (&existing.record, record) {
                (ExtractedRecord::Item(old), ExtractedRecord::Item(new)) => old.price != new.price,
                _ => false,
            };
            if let (true, ExtractedRecord::Item(new)) = (price_changed, record) {
                state.history.push(PriceHistoryEntry {
                    item_id: id,
                    price: new.price,
                    original_price: new.original_price,
                    observed_at: now,
                });
            }
            if let Some(entity) = state.entities.get_mut(&key) {
                entity.record = record.clone();
                entity.last_seen = now;
            }
            return Ok(SaveOutcome::Duplicate { id, price_changed });
        }

        state.next_id += 1;
        let id = state.next_id;
        state.entities.insert(
            key.clone(),
            PersistedEntity {
                id,
                key,
                record: record.clone(),
                first_seen: now,
                last_seen: now,
            },
        );
        Ok(SaveOutcome::New { id })
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
