//! PostgreSQL backend integration tests

#![cfg(feature = "postgres")]

use chrono::{Duration, Utc};
use huddle::config::DatabaseConfig;
use huddle::domain::call::{CallRepository, CallStatus, NewCall, Participant, TransitionPolicy};
use huddle::domain::collection::{Collection, CollectionStore};
use huddle::domain::shared::time;
use huddle::domain::storage::{StorageBackend, StorageDriver};
use huddle::domain::subscriber::{SubscriberRepository, UpsertSubscriber};
use huddle::domain::user::{UpsertUser, User, UserRepository};
use huddle::infrastructure::persistence::{create_pool, run_migrations, PgBackend};
use huddle::DomainError;
use sqlx::PgPool;

#[tokio::test]
#[ignore] // Requires database
async fn test_pg_upsert_keeps_created_at() {
    let backend = setup_backend(TransitionPolicy::Permissive).await;

    let first = backend
        .upsert_subscriber(UpsertSubscriber::new("pg-upsert-s1", "Alice"))
        .await
        .expect("Failed to insert subscriber");
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = backend
        .upsert_subscriber(UpsertSubscriber::new("pg-upsert-s1", "Alice B"))
        .await
        .expect("Failed to update subscriber");

    assert_eq!(second.name, "Alice B");
    assert_eq!(second.created_at, first.created_at);
    assert!(second.updated_at > first.updated_at);

    let stored = backend.get_subscriber("pg-upsert-s1").await.unwrap().unwrap();
    assert_eq!(stored, second);

    cleanup_database(backend.pool()).await;
    backend.close().await;
}

#[tokio::test]
#[ignore] // Requires database
async fn test_pg_pending_calls_and_status_update() {
    let backend = setup_backend(TransitionPolicy::Permissive).await;

    let created = backend
        .create_call(
            NewCall::new(
                Participant::new("pg-pending-alice", "Alice"),
                Participant::new("pg-pending-bob", "Bob"),
            )
            .with_id("pg-pending-c1"),
        )
        .await
        .expect("Failed to create call");
    assert_eq!(created.status, CallStatus::Pending);

    let pending = backend.list_pending_calls("pg-pending-bob").await.unwrap();
    assert_eq!(pending, vec![created.clone()]);

    let updated = backend
        .update_call_status("pg-pending-c1", CallStatus::Accepted)
        .await
        .unwrap()
        .expect("Call should exist");
    assert_eq!(updated.status, CallStatus::Accepted);
    assert_eq!(updated.created_at, created.created_at);
    assert_eq!(updated.from, created.from);

    assert!(backend
        .list_pending_calls("pg-pending-bob")
        .await
        .unwrap()
        .is_empty());

    cleanup_database(backend.pool()).await;
    backend.close().await;
}

#[tokio::test]
#[ignore] // Requires database
async fn test_pg_missing_call_is_not_found() {
    let backend = setup_backend(TransitionPolicy::Permissive).await;

    let result = backend
        .update_call_status("pg-missing-id", CallStatus::Accepted)
        .await
        .unwrap();
    assert!(result.is_none());
    assert!(!backend.delete_call("pg-missing-id").await.unwrap());

    backend.close().await;
}

#[tokio::test]
#[ignore] // Requires database
async fn test_pg_duplicate_call_is_rejected() {
    let backend = setup_backend(TransitionPolicy::Permissive).await;

    let data = NewCall::new(
        Participant::new("pg-dup-alice", "Alice"),
        Participant::new("pg-dup-bob", "Bob"),
    )
    .with_id("pg-dup-c1");

    backend.create_call(data.clone()).await.unwrap();
    let err = backend.create_call(data).await.unwrap_err();
    assert!(matches!(err, DomainError::AlreadyExists(_)));

    cleanup_database(backend.pool()).await;
    backend.close().await;
}

#[tokio::test]
#[ignore] // Requires database
async fn test_pg_cleanup_spares_pending_calls() {
    let backend = setup_backend(TransitionPolicy::Permissive).await;
    let old = Utc::now() - Duration::seconds(100);

    for (id, status) in [("pg-cleanup-a", "accepted"), ("pg-cleanup-b", "pending")] {
        sqlx::query(
            r#"
            INSERT INTO calls (id, from_id, from_name, to_id, to_name, status, created_at, updated_at)
            VALUES ($1, 'pg-cleanup-alice', 'Alice', 'pg-cleanup-bob', 'Bob', $2, $3, $3)
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(old)
        .execute(backend.pool())
        .await
        .expect("Failed to insert call");
    }

    let removed = backend
        .cleanup_calls(Utc::now() - Duration::seconds(50))
        .await
        .unwrap();
    assert!(removed >= 1);

    assert!(backend.get_call("pg-cleanup-a").await.unwrap().is_none());
    assert!(backend.get_call("pg-cleanup-b").await.unwrap().is_some());

    cleanup_database(backend.pool()).await;
    backend.close().await;
}

#[tokio::test]
#[ignore] // Requires database
async fn test_pg_strict_policy() {
    let backend = setup_backend(TransitionPolicy::Strict).await;

    backend
        .create_call(
            NewCall::new(
                Participant::new("pg-strict-alice", "Alice"),
                Participant::new("pg-strict-bob", "Bob"),
            )
            .with_id("pg-strict-c1")
            .with_status(CallStatus::Ended),
        )
        .await
        .unwrap();

    let err = backend
        .update_call_status("pg-strict-c1", CallStatus::Pending)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidStateTransition(_)));

    cleanup_database(backend.pool()).await;
    backend.close().await;
}

#[tokio::test]
#[ignore] // Requires database
async fn test_pg_whole_collection_round_trip_keeps_written_order() {
    let backend = setup_backend(TransitionPolicy::Permissive).await;
    let now = time::now();

    // newest first, so creation order and written order disagree
    let users = vec![
        User {
            id: "pg-round-u2".to_string(),
            name: "Bob".to_string(),
            created_at: now,
            updated_at: now,
        },
        User {
            id: "pg-round-u1".to_string(),
            name: "Alice".to_string(),
            created_at: now - Duration::seconds(10),
            updated_at: now,
        },
    ];
    let values: Vec<serde_json::Value> = users
        .iter()
        .map(|user| serde_json::to_value(user).unwrap())
        .collect();

    backend
        .write(Collection::Users, values.clone())
        .await
        .expect("Failed to write users");
    let read = backend.read(Collection::Users).await.unwrap();
    assert_eq!(read, values);

    // a new row goes after the snapshot
    backend
        .upsert_user(UpsertUser::new("pg-round-u0", "Carol"))
        .await
        .unwrap();
    let ids: Vec<String> = backend
        .list_users()
        .await
        .unwrap()
        .into_iter()
        .map(|user| user.id)
        .collect();
    assert_eq!(ids, vec!["pg-round-u2", "pg-round-u1", "pg-round-u0"]);

    backend.write(Collection::Users, Vec::new()).await.unwrap();
    backend.close().await;
}

#[tokio::test]
#[ignore] // Requires database
async fn test_pg_snapshot_rules_match_file_store() {
    let backend = setup_backend(TransitionPolicy::Permissive).await;
    let now = time::now();

    let user = User {
        id: "pg-snapshot-u1".to_string(),
        name: "Alice".to_string(),
        created_at: now,
        updated_at: now,
    };
    let duplicate = serde_json::to_value(&user).unwrap();
    let err = backend
        .write(Collection::Users, vec![duplicate.clone(), duplicate])
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::AlreadyExists(_)));

    let too_fine = User {
        updated_at: now + Duration::nanoseconds(1),
        ..user
    };
    let err = backend
        .write(Collection::Users, vec![serde_json::to_value(&too_fine).unwrap()])
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::ValidationError(_)));

    backend.close().await;
}

#[tokio::test]
#[ignore] // Requires database
async fn test_pg_status_update_with_stale_clock_keeps_timestamps_ordered() {
    let backend = setup_backend(TransitionPolicy::Permissive).await;

    let created = backend
        .create_call(
            NewCall::new(
                Participant::new("pg-stale-alice", "Alice"),
                Participant::new("pg-stale-bob", "Bob"),
            )
            .with_id("pg-stale-c1"),
        )
        .await
        .unwrap();

    let updated = backend
        .update_call_status_at(
            "pg-stale-c1",
            CallStatus::Accepted,
            created.created_at - Duration::seconds(30),
        )
        .await
        .unwrap()
        .expect("Call should exist");
    assert_eq!(updated.status, CallStatus::Accepted);
    assert_eq!(updated.updated_at, created.created_at);

    cleanup_database(backend.pool()).await;
    backend.close().await;
}

#[tokio::test]
#[ignore] // Requires database
async fn test_pg_close_is_idempotent() {
    let backend = setup_backend(TransitionPolicy::Permissive).await;
    assert_eq!(backend.driver(), StorageDriver::Postgres);

    backend.close().await;
    backend.close().await;
    assert!(backend.pool().is_closed());
}

// Helper functions

async fn setup_backend(policy: TransitionPolicy) -> PgBackend {
    let db_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://postgres@localhost/huddle_test".to_string());

    let config = DatabaseConfig {
        url: db_url,
        max_connections: 5,
        min_connections: 1,
        ..Default::default()
    };

    let pool = create_pool(&config).await.expect("Failed to create pool");
    run_migrations(&pool).await.expect("Failed to run migrations");
    PgBackend::new(pool, policy)
}

async fn cleanup_database(pool: &PgPool) {
    // Clean up test data
    sqlx::query("DELETE FROM calls WHERE id LIKE 'pg-%'")
        .execute(pool)
        .await
        .ok();
    sqlx::query("DELETE FROM subscribers WHERE id LIKE 'pg-%'")
        .execute(pool)
        .await
        .ok();
    sqlx::query("DELETE FROM users WHERE id LIKE 'pg-%'")
        .execute(pool)
        .await
        .ok();
}
