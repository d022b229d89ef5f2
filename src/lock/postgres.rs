//! Postgres lock manager
//!
//! Each lock is a row in `distributed_locks`. Acquisition is a single
//! upsert that only overwrites an expired row, retried with capped
//! exponential backoff until the wait window closes. Release deletes the row
//! only if this handle still owns it.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use sqlx::PgPool;
use tokio::time::Instant;
use uuid::Uuid;

use super::{LockError, LockHandle, LockManager};

const BACKOFF_BASE: Duration = Duration::from_millis(25);
const BACKOFF_MAX: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct PgLockManager {
    pool: PgPool,
}

impl PgLockManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn try_acquire(&self, key: &str, holder: Uuid, lease: Duration) -> Result<bool, sqlx::Error> {
        let acquired: Option<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO distributed_locks (lock_key, holder, acquired_at, expires_at)
            VALUES ($1, $2, NOW(), NOW() + make_interval(secs => $3))
            ON CONFLICT (lock_key) DO UPDATE
            SET holder = EXCLUDED.holder,
                acquired_at = EXCLUDED.acquired_at,
                expires_at = EXCLUDED.expires_at
            WHERE distributed_locks.expires_at <= NOW()
            RETURNING holder
            "#,
        )
        .bind(key)
        .bind(holder)
        .bind(lease.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(acquired.is_some())
    }

    /// Delete lock rows whose lease has lapsed. Returns how many were removed.
    pub async fn purge_expired(&self) -> Result<u64, LockError> {
        let result = sqlx::query("DELETE FROM distributed_locks WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let exp = BACKOFF_BASE.saturating_mul(1u32 << attempt.min(4));
    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=10));
    exp.min(BACKOFF_MAX) + jitter
}

#[async_trait]
impl LockManager for PgLockManager {
    async fn acquire(
        &self,
        key: &str,
        wait: Duration,
        lease: Duration,
    ) -> Result<LockHandle, LockError> {
        let deadline = Instant::now() + wait;
        let holder = Uuid::new_v4();
        let mut attempt = 0u32;

        loop {
            if self.try_acquire(key, holder, lease).await? {
                return Ok(LockHandle::new(key, holder, lease));
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(LockError::Timeout {
                    key: key.to_string(),
                    waited: wait,
                });
            }

            let delay = backoff_delay(attempt).min(deadline - now);
            tokio::time::sleep(delay).await;
            attempt = attempt.saturating_add(1);
        }
    }

    async fn release(&self, handle: &LockHandle) -> Result<(), LockError> {
        let result = sqlx::query("DELETE FROM distributed_locks WHERE lock_key = $1 AND holder = $2")
            .bind(&handle.key)
            .bind(handle.holder)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(lock_key = %handle.key, "Lock no longer held by this handle");
        }
        Ok(())
    }
}
