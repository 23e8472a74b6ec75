// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Concurrency properties of the claim and quota statements.
//!
//! Each test opens two independent `SqliteStorage` handles on one file so
//! that the statements race through SQLite itself, not one shared thread.

use std::sync::Arc;

use dmpilot_config::model::StorageConfig;
use dmpilot_core::StorageAdapter;
use dmpilot_storage::SqliteStorage;

async fn replicas(dir: &tempfile::TempDir, n: usize) -> Vec<Arc<SqliteStorage>> {
    let config = StorageConfig {
        database_path: dir.path().join("shared.db").display().to_string(),
        wal_mode: true,
    };
    let mut handles = Vec::new();
    for _ in 0..n {
        let storage = SqliteStorage::new(config.clone());
        storage.initialize().await.unwrap();
        handles.push(Arc::new(storage));
    }
    handles
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_have_exactly_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let stores = replicas(&dir, 2).await;

    let attempts = (0..16).map(|i| {
        let store = Arc::clone(&stores[i % stores.len()]);
        tokio::spawn(async move { store.claim_message_id("mid.shared").await.unwrap() })
    });
    let results = futures::future::join_all(attempts).await;

    let winners = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();
    assert_eq!(winners, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_increments_never_oversell() {
    let dir = tempfile::tempdir().unwrap();
    let stores = replicas(&dir, 2).await;

    let db = stores[0].database().unwrap().clone();
    db.connection()
        .call(|conn| -> Result<(), rusqlite::Error> {
            conn.execute_batch(
                "INSERT INTO users (id, replies_sent_monthly, replies_limit_monthly,
                                    replies_purchased, replies_used_purchased)
                 VALUES (7, 0, 3, 2, 0);",
            )?;
            Ok(())
        })
        .await
        .unwrap();

    let attempts = (0..20).map(|i| {
        let store = Arc::clone(&stores[i % stores.len()]);
        tokio::spawn(async move { store.increment_reply_count(7, 0).await.unwrap() })
    });
    let results = futures::future::join_all(attempts).await;

    let granted = results
        .into_iter()
        .filter(|r| r.as_ref().unwrap().is_some())
        .count();
    assert_eq!(granted, 5, "remaining was 5, so exactly 5 increments may succeed");

    let plans = dmpilot_core::types::PlanAllotments {
        starter_monthly: 150,
        standard_monthly: 1500,
    };
    let state = stores[1].quota_state(7, &plans).await.unwrap().unwrap();
    assert_eq!(state.monthly_used, 3);
    assert_eq!(state.purchased_used, 2);
    assert_eq!(state.remaining(), 0);
}
