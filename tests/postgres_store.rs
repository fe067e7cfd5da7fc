//! `PostgresStore` against a live database.
//!
//! Ignored by default. Run with
//! `TEST_DATABASE_URL=postgres://... cargo test --test postgres_store -- --ignored`.

#![allow(clippy::panic)]

use retro_gateway::config::DatabaseConfig;
use retro_gateway::domain::{ArenaId, MembershipStatus, UserId};
use retro_gateway::store::{ArenaStore, PostgresStore, StoreError};
use sqlx::PgPool;
use uuid::Uuid;

async fn connect() -> (PostgresStore, PgPool) {
    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        panic!("TEST_DATABASE_URL must be set");
    };
    let config = DatabaseConfig {
        url: url.clone(),
        max_connections: 2,
        min_connections: 1,
        connect_timeout_secs: 5,
    };
    let Ok(store) = PostgresStore::connect(&config).await else {
        panic!("store must connect and migrate");
    };
    let Ok(pool) = PgPool::connect(&url).await else {
        panic!("seeding pool must connect");
    };
    (store, pool)
}

async fn seed(pool: &PgPool) -> (ArenaId, UserId, UserId) {
    let owner = Uuid::new_v4();
    let member = Uuid::new_v4();
    for (id, name) in [(owner, "Ada"), (member, "Brian")] {
        let inserted = sqlx::query("INSERT INTO users (id, name) VALUES ($1, $2)")
            .bind(id)
            .bind(name)
            .execute(pool)
            .await;
        assert!(inserted.is_ok(), "user insert failed: {inserted:?}");
    }
    let arena = Uuid::new_v4();
    let inserted = sqlx::query("INSERT INTO retro (id, name, owner_id) VALUES ($1, $2, $3)")
        .bind(arena)
        .bind("Sprint 12")
        .bind(owner)
        .execute(pool)
        .await;
    assert!(inserted.is_ok(), "arena insert failed: {inserted:?}");
    (
        ArenaId::from(arena),
        UserId::from(owner),
        UserId::from(member),
    )
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn membership_writes_follow_the_tri_state() {
    let (store, pool) = connect().await;
    let (arena_id, _, member) = seed(&pool).await;

    assert!(matches!(
        store.membership(arena_id, member).await,
        Ok(MembershipStatus::NotAMember)
    ));
    let Ok(users) = store.add_user(arena_id, member).await else {
        panic!("add_user failed");
    };
    assert_eq!(users.len(), 1);
    assert!(matches!(
        store.membership(arena_id, member).await,
        Ok(MembershipStatus::Active)
    ));
    let Ok(users) = store.retreat_user(arena_id, member).await else {
        panic!("retreat_user failed");
    };
    assert!(users.iter().all(|u| !u.active));
    assert!(matches!(
        store.membership(arena_id, member).await,
        Ok(MembershipStatus::Inactive)
    ));
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn deleted_arena_is_not_found_for_membership_calls() {
    let (store, pool) = connect().await;
    let (arena_id, owner, member) = seed(&pool).await;
    assert!(store.add_user(arena_id, member).await.is_ok());
    assert!(store.delete_arena(arena_id).await.is_ok());

    assert!(matches!(
        store.retreat_user(arena_id, member).await,
        Err(StoreError::NotFound("arena"))
    ));
    assert!(matches!(
        store.abandon_user(arena_id, member).await,
        Err(StoreError::NotFound("arena"))
    ));
    assert!(matches!(
        store.add_user(arena_id, owner).await,
        Err(StoreError::NotFound("arena"))
    ));
    assert!(matches!(
        store.membership(arena_id, member).await,
        Err(StoreError::NotFound("arena"))
    ));
}
