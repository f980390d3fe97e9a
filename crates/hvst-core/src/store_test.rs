use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;

use super::*;
use crate::records::{ItemRecord, MerchantRecord, DEFAULT_ITEM_CATEGORY};

fn make_merchant(name: &str) -> ExtractedRecord {
    ExtractedRecord::Merchant(MerchantRecord {
        name: name.to_string(),
        category: "Pizza".to_string(),
        category_id: None,
        city: "Birigui".to_string(),
        rating: Some(Decimal::from_str("4.7").unwrap()),
        delivery_time: Some("30-40 min".to_string()),
        delivery_fee: Some("Grátis".to_string()),
        distance: Some("1,2 km".to_string()),
        url: None,
        logo_url: None,
        address: None,
        phone: None,
        opening_hours: None,
        minimum_order: None,
        payment_methods: Vec::new(),
        tags: Vec::new(),
    })
}

fn make_item(merchant_id: i64, name: &str, price: &str) -> ExtractedRecord {
    ExtractedRecord::Item(ItemRecord {
        merchant_id,
        name: name.to_string(),
        description: None,
        category: DEFAULT_ITEM_CATEGORY.to_string(),
        price: Decimal::from_str(price).unwrap(),
        original_price: None,
        image_url: None,
        is_available: true,
        preparation_time: None,
        serves: None,
        calories: None,
        ingredients: Vec::new(),
        allergens: Vec::new(),
    })
}

#[tokio::test]
async fn first_save_is_new_second_is_duplicate() {
    let store = MemoryIdentityStore::new();
    let record = make_merchant("Pizzaria Bella");

    let first = store.save(&record).await.unwrap();
    let second = store.save(&record).await.unwrap();

    assert!(first.is_new());
    assert_eq!(
        second,
        SaveOutcome::Duplicate {
            id: first.id(),
            price_changed: false
        }
    );
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn case_variant_names_resolve_to_one_entity() {
    let store = MemoryIdentityStore::new();
    store.save(&make_merchant("Pizzaria Bella")).await.unwrap();
    let outcome = store.save(&make_merchant(" PIZZARIA bella ")).await.unwrap();

    assert!(!outcome.is_new());
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn price_change_appends_exactly_one_history_entry() {
    let store = MemoryIdentityStore::new();
    let merchant_id = store.save(&make_merchant("Açaí da Praça")).await.unwrap().id();

    let item_id = store
        .save(&make_item(merchant_id, "Açaí 500ml", "19.90"))
        .await
        .unwrap()
        .id();
    assert!(store.price_history(item_id).is_empty());

    let outcome = store
        .save(&make_item(merchant_id, "Açaí 500ml", "21.50"))
        .await
        .unwrap();
    assert!(outcome.price_changed());

    let history = store.price_history(item_id);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].price, Decimal::from_str("21.50").unwrap());
}

#[tokio::test]
async fn unchanged_price_appends_nothing() {
    let store = MemoryIdentityStore::new();
    let merchant_id = store.save(&make_merchant("Açaí da Praça")).await.unwrap().id();
    let item = make_item(merchant_id, "Açaí 500ml", "19.90");

    let item_id = store.save(&item).await.unwrap().id();
    let outcome = store.save(&item).await.unwrap();

    assert!(!outcome.price_changed());
    assert!(store.price_history(item_id).is_empty());
}

#[tokio::test]
async fn item_for_unknown_merchant_is_rejected() {
    let store = MemoryIdentityStore::new();
    let err = store
        .save(&make_item(999, "Açaí 500ml", "19.90"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::UnknownMerchant { merchant_id: 999 }));
    assert!(store.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_saves_of_same_key_insert_once() {
    let store = Arc::new(MemoryIdentityStore::new());
    let record = make_merchant("Pizzaria Bella");

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let store = Arc::clone(&store);
            let record = record.clone();
            tokio::spawn(async move { store.save(&record).await.unwrap() })
        })
        .collect();

    let outcomes = futures::future::join_all(handles).await;
    let new_count = outcomes
        .into_iter()
        .map(Result::unwrap)
        .filter(|o| o.is_new())
        .count();

    assert_eq!(new_count, 1);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn key_locks_reuse_slots() {
    let locks = KeyLocks::new();
    let key = IdentityKey::category("Pizza", "Birigui");
    {
        let _guard = locks.lock(&key).await;
    }
    let _again = locks.lock(&key).await;
    assert_eq!(locks.len(), 1);
}
