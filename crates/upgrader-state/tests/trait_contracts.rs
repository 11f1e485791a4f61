//! Trait contract tests for HistoryStore.
//!
//! Every contract runs against both the in-memory fake and the SurrealDB
//! store on `mem://`. Any conforming implementation must pass these.

use upgrader_state::storage_traits::*;
use upgrader_state::{MemoryHistoryStore, StorageError, StoreConfig, SurrealHistoryStore};

async fn stores() -> Vec<(&'static str, Box<dyn HistoryStore>)> {
    vec![
        ("memory", Box::new(MemoryHistoryStore::new())),
        (
            "surreal",
            Box::new(SurrealHistoryStore::in_memory().await.unwrap()),
        ),
    ]
}

// ===========================================================================
// HistoryStore contract tests
// ===========================================================================

#[tokio::test]
async fn fresh_store_has_empty_history() {
    for (name, store) in stores().await {
        assert!(store.applied().await.unwrap().is_empty(), "{name}");
        assert!(store.load_history().await.unwrap().is_empty(), "{name}");
        assert_eq!(store.latest_applied("demo").await.unwrap(), None, "{name}");
    }
}

#[tokio::test]
async fn record_then_applied_newest_first() {
    for (name, store) in stores().await {
        store.record_success("demo_2024_01_01_a").await.unwrap();
        store.record_success("demo_2024_01_02_b").await.unwrap();
        store.record_success("other_2024_01_03_c").await.unwrap();

        let ids: Vec<String> = store
            .applied()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.upgrade_id)
            .collect();
        assert_eq!(
            ids,
            vec![
                "other_2024_01_03_c".to_string(),
                "demo_2024_01_02_b".to_string(),
                "demo_2024_01_01_a".to_string(),
            ],
            "{name}"
        );
    }
}

#[tokio::test]
async fn record_returns_matching_record() {
    for (name, store) in stores().await {
        let record = store.record_success("demo_release_1_0_0").await.unwrap();
        assert_eq!(record.upgrade_id, "demo_release_1_0_0", "{name}");

        let history = store.load_history().await.unwrap();
        assert!(history.contains_key("demo_release_1_0_0"), "{name}");
    }
}

#[tokio::test]
async fn duplicate_record_rejected() {
    for (name, store) in stores().await {
        store.record_success("demo_2024_01_01_a").await.unwrap();
        let err = store.record_success("demo_2024_01_01_a").await.unwrap_err();
        assert!(
            matches!(
                err,
                StorageError::Duplicate { ref upgrade_id } if upgrade_id == "demo_2024_01_01_a"
            ),
            "{name}: {err:?}"
        );
        assert_eq!(store.applied().await.unwrap().len(), 1, "{name}");
    }
}

#[tokio::test]
async fn latest_applied_filters_by_repository_prefix() {
    for (name, store) in stores().await {
        store.record_success("demo_2024_01_01_a").await.unwrap();
        store.record_success("demography_2024_02_01_x").await.unwrap();
        store.record_success("demo_2024_01_05_b").await.unwrap();
        store.record_success("other_2024_03_01_c").await.unwrap();

        assert_eq!(
            store.latest_applied("demo").await.unwrap().as_deref(),
            Some("demo_2024_01_05_b"),
            "{name}"
        );
        assert_eq!(
            store.latest_applied("demography").await.unwrap().as_deref(),
            Some("demography_2024_02_01_x"),
            "{name}"
        );
        assert_eq!(store.latest_applied("missing").await.unwrap(), None, "{name}");
    }
}

#[tokio::test]
async fn latest_applied_ignores_repositories_sharing_a_prefix() {
    for (name, store) in stores().await {
        store.record_success("demo_2024_01_01_a").await.unwrap();
        store.record_success("demo_extra_2024_02_01_x").await.unwrap();
        store.record_success("demo_extra_release_1_0").await.unwrap();

        assert_eq!(
            store.latest_applied("demo").await.unwrap().as_deref(),
            Some("demo_2024_01_01_a"),
            "{name}"
        );
        assert_eq!(
            store.latest_applied("demo_extra").await.unwrap().as_deref(),
            Some("demo_extra_release_1_0"),
            "{name}"
        );
    }
}

// ===========================================================================
// Memory fake specifics
// ===========================================================================

#[tokio::test]
async fn memory_unavailable_fails_instead_of_empty() {
    let store = MemoryHistoryStore::with_applied(["demo_2024_01_01_a"]);
    store.set_unavailable(true);

    assert!(matches!(
        store.applied().await.unwrap_err(),
        StorageError::Unavailable(_)
    ));
    assert!(matches!(
        store.load_history().await.unwrap_err(),
        StorageError::Unavailable(_)
    ));
    assert!(matches!(
        store.record_success("demo_2024_01_02_b").await.unwrap_err(),
        StorageError::Unavailable(_)
    ));

    store.set_unavailable(false);
    assert_eq!(store.applied_ids(), vec!["demo_2024_01_01_a".to_string()]);
}

#[tokio::test]
async fn memory_seeded_history_orders_by_seed_position() {
    let store = MemoryHistoryStore::with_applied(["demo_a", "demo_b"]);
    store.record_success("demo_c").await.unwrap();

    let ids: Vec<String> = store
        .applied()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.upgrade_id)
        .collect();
    assert_eq!(ids, vec!["demo_c", "demo_b", "demo_a"]);
}

// ===========================================================================
// SurrealDB persistence
// ===========================================================================

#[tokio::test]
async fn surreal_history_survives_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        url: format!("surrealkv://{}", dir.path().join("db").display()),
        ..StoreConfig::default()
    };

    {
        let store = SurrealHistoryStore::connect(&config).await.unwrap();
        store.record_success("demo_2024_01_01_a").await.unwrap();
    }

    let store = SurrealHistoryStore::connect(&config).await.unwrap();
    let history = store.load_history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history.contains_key("demo_2024_01_01_a"));
}

#[tokio::test]
async fn surreal_unreachable_endpoint_is_unavailable() {
    // Port 1 on loopback refuses connections immediately.
    let config = StoreConfig {
        url: "ws://127.0.0.1:1".to_string(),
        ..StoreConfig::default()
    };

    let outcome = tokio::time::timeout(
        std::time::Duration::from_secs(30),
        SurrealHistoryStore::connect(&config),
    )
    .await
    .expect("connect to a closed port should fail, not hang");

    match outcome {
        Err(StorageError::Unavailable(msg)) => assert!(msg.contains("127.0.0.1:1"), "{msg}"),
        Err(other) => panic!("expected Unavailable, got {other:?}"),
        Ok(_) => panic!("connected to a closed port"),
    }
}
