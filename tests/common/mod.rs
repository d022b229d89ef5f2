//! Common test utilities

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use account_ledger::domain::User;
use account_ledger::handlers::{LedgerSettings, RandomAccountNumberGenerator};
use account_ledger::lock::{InMemoryLockManager, LockSettings};
use account_ledger::store::InMemoryStore;
use account_ledger::{build_router, AppState};
use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Users seeded into every test ledger
pub const TEST_USERS: [(i64, &str); 3] = [(1, "alice"), (2, "bob"), (3, "carol")];

/// A router over in-memory backends, with handles on both for assertions
pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryStore>,
    pub locks: Arc<InMemoryLockManager>,
}

fn test_users() -> Vec<User> {
    TEST_USERS
        .iter()
        .map(|(id, name)| User {
            id: *id,
            name: name.to_string(),
        })
        .collect()
}

/// Build the full router on the in-memory store. Lock waits are short so
/// contention tests finish quickly.
pub fn test_app() -> TestApp {
    let store = Arc::new(InMemoryStore::with_users(test_users()));
    let locks = Arc::new(InMemoryLockManager::new());
    let settings = LedgerSettings {
        lock: LockSettings {
            wait: Duration::from_millis(100),
            lease: Duration::from_secs(5),
        },
        ..LedgerSettings::default()
    };

    let state = AppState::build(
        store.clone(),
        locks.clone(),
        Arc::new(RandomAccountNumberGenerator::with_seed(11)),
        settings,
    );

    TestApp {
        router: build_router(state),
        store,
        locks,
    }
}

/// Build a request with an optional JSON body
pub fn json_request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");

    match body {
        Some(json) => builder.body(Body::from(json.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Collect a response body as JSON
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Setup test database - truncate tables and seed test users
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    let mut tx = pool.begin().await.expect("Failed to begin transaction");

    // Clean up DB for fresh state
    sqlx::query("TRUNCATE TABLE transactions, accounts, account_users, distributed_locks CASCADE")
        .execute(&mut *tx)
        .await
        .expect("Failed to clean up DB");

    for (id, name) in TEST_USERS {
        sqlx::query("INSERT INTO account_users (id, name) VALUES ($1, $2)")
            .bind(id)
            .bind(name)
            .execute(&mut *tx)
            .await
            .expect("Failed to seed user");
    }

    tx.commit().await.expect("Failed to commit transaction");

    pool
}
