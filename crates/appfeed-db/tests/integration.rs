//! Offline unit tests for appfeed-db pool configuration and row types.
//! These tests do not require a live database connection.

use appfeed_core::{load_app_config_from_env, NormalizedProduct};
use appfeed_db::{
    persist, ImportRunCounts, ImportRunRow, MemoryProductStore, PersistOutcome, PoolConfig,
};

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let mut app_config = load_app_config_from_env().expect("default config");
    app_config.db_max_connections = 42;
    app_config.db_min_connections = 7;
    app_config.db_acquire_timeout_secs = 9;

    let pool_config = PoolConfig::from_app_config(&app_config);
    assert_eq!(
        pool_config,
        PoolConfig {
            max_connections: 42,
            min_connections: 7,
            acquire_timeout_secs: 9,
        }
    );
}

/// Compile-time smoke test: confirm that [`ImportRunRow`] has all expected
/// fields with the correct types. No database required.
#[test]
fn import_run_row_has_expected_fields() {
    use chrono::Utc;
    use uuid::Uuid;

    let row = ImportRunRow {
        id: 1_i64,
        public_id: Uuid::new_v4(),
        trigger_source: "cli".to_string(),
        status: "queued".to_string(),
        started_at: None,
        completed_at: None,
        items_processed: 0_i32,
        items_inserted: 0_i32,
        items_skipped: 0_i32,
        items_failed: 0_i32,
        error_message: None,
        created_at: Utc::now(),
    };

    assert_eq!(row.status, "queued");
    assert!(row.started_at.is_none());
    assert_eq!(ImportRunCounts::default().processed, 0);
}

#[tokio::test]
async fn memory_store_is_usable_through_the_gate() {
    let store = MemoryProductStore::new();
    let product: NormalizedProduct = serde_json::from_value(serde_json::json!({
        "provider_id": 18,
        "provider_product_id": "19002",
        "title": "Angry Birds",
        "descriptions": [],
        "publisher": "Rovio",
        "platform": "Android",
        "price": { "currency": "USD", "amount": "19.99" },
        "category": { "id": 7, "name": "Games" },
        "subcategory": { "id": 12, "name": "Puzzle" },
        "release_date": "1970-01-01T00:00:00Z",
        "devices": [],
        "permissions": [],
        "territories": ["All"],
        "image_dir": "19/00",
        "image": {
            "source_url": "http://cdn.test/icon.png",
            "tmp_file_name": "icon.png",
            "tmp_dir": "/tmp",
            "images_dir": "/images",
            "engine_dir": "18/19/00",
            "ttl_secs": 60,
            "targets": []
        }
    }))
    .expect("product fixture");

    assert!(matches!(
        persist(&store, &product, true).await.unwrap(),
        PersistOutcome::Inserted { .. }
    ));
    assert_eq!(
        persist(&store, &product, true).await.unwrap(),
        PersistOutcome::SkippedDuplicate
    );
    assert_eq!(store.products()[0].title, "Angry Birds");
}
