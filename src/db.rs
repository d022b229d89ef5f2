//! Database module
//!
//! Connection and schema verification utilities. The schema itself lives in
//! `migrations/` as raw SQL.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::Config;
use crate::domain::User;

/// Tables the server needs
pub const REQUIRED_TABLES: [&str; 4] = ["account_users", "accounts", "transactions", "distributed_locks"];

/// Open a connection pool for the configured database
pub async fn connect(config: &Config, database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(database_url)
        .await
}

/// Verify database connectivity
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for table in REQUIRED_TABLES {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    Ok(true)
}

/// Insert users that do not exist yet
pub async fn seed_users(pool: &PgPool, users: &[User]) -> Result<u64, sqlx::Error> {
    let mut inserted = 0;
    for user in users {
        inserted += sqlx::query(
            "INSERT INTO account_users (id, name) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING",
        )
        .bind(user.id)
        .bind(&user.name)
        .execute(pool)
        .await?
        .rows_affected();
    }
    Ok(inserted)
}
