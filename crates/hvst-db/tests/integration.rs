//! Offline unit tests for hvst-db pool configuration and row types.
//! These tests do not require a live database connection.

use std::path::PathBuf;

use chrono::Utc;
use hvst_core::{AppConfig, Environment};
use hvst_db::{CategoryRow, CollectionRunRow, ItemSave, PoolConfig, PriceHistoryRow};
use rust_decimal::Decimal;
use uuid::Uuid;

fn app_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        log_level: "info".to_string(),
        base_url: "https://www.ifood.com.br".to_string(),
        city: "Birigui".to_string(),
        headless: true,
        chrome_path: None,
        browser_ws_url: None,
        selectors_path: None,
        workers: 2,
        nav_timeout_secs: 30,
        target_deadline_secs: 600,
        retry_max_attempts: 3,
        retry_initial_delay_ms: 2000,
        retry_backoff_multiplier: 2.0,
        scroll_max_attempts: 50,
        scroll_no_growth_threshold: 5,
        human_delay_min_ms: 500,
        human_delay_max_ms: 1500,
        diagnostics_dir: PathBuf::from("./diagnostics"),
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
    }
}

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let pool_config = PoolConfig::from_app_config(&app_config());
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

/// Compile-time smoke test: [`CollectionRunRow`] has the expected fields.
#[test]
fn collection_run_row_has_expected_fields() {
    let row = CollectionRunRow {
        id: 1_i64,
        public_id: Uuid::new_v4(),
        run_type: "restaurant_list".to_string(),
        trigger_source: "cli".to_string(),
        status: "queued".to_string(),
        target_count: 5,
        started_at: None,
        completed_at: None,
        records_processed: 0_i32,
        error_message: None,
        created_at: Utc::now(),
    };

    assert_eq!(row.run_type, "restaurant_list");
    assert_eq!(row.status, "queued");
    assert_eq!(row.target_count, 5);
    assert!(row.started_at.is_none());
}

#[test]
fn category_row_has_expected_fields() {
    let row = CategoryRow {
        id: 3,
        unique_key: hvst_core::IdentityKey::category("Pizza", "Birigui").to_string(),
        name: "Pizza".to_string(),
        slug: "pizza".to_string(),
        url: "https://www.ifood.com.br/delivery/birigui-sp/pizza".to_string(),
        icon_url: None,
        city: "Birigui".to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    assert_eq!(row.unique_key.len(), 64);
    assert_eq!(row.slug, "pizza");
}

#[test]
fn price_history_row_holds_decimal_prices() {
    let row = PriceHistoryRow {
        id: 1,
        item_id: 9,
        price: Decimal::new(1990, 2),
        original_price: Some(Decimal::new(2500, 2)),
        observed_at: Utc::now(),
    };
    assert_eq!(row.price.to_string(), "19.90");
    assert_eq!(row.original_price.map(|p| p.to_string()).as_deref(), Some("25.00"));
}

#[test]
fn item_save_reports_price_change() {
    let saved = ItemSave {
        id: 10,
        is_new: false,
        price_changed: true,
    };
    assert!(!saved.is_new);
    assert!(saved.price_changed);
}
