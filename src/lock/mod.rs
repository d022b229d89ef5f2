//! Lock module
//!
//! Named mutual-exclusion locks with a bounded wait and a bounded lease.
//! Account creation serializes on one fixed key; balance changes serialize
//! per account number.
//!
//! Locks are taken with [`guarded`], which releases the lock after the guarded
//! body finishes whether it succeeded or failed, and turns an acquisition
//! timeout into the caller-specific "busy" error.

mod memory;
mod postgres;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{AccountNumber, DomainError};
use crate::error::{AppError, AppResult};

pub use memory::InMemoryLockManager;
pub use postgres::PgLockManager;

/// Key that serializes every account creation
pub const CREATE_ACCOUNT_LOCK_KEY: &str = "create-account";

/// Default time to wait for a lock
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(2);

/// Default lease before an unreleased lock expires
pub const DEFAULT_LOCK_LEASE: Duration = Duration::from_secs(15);

/// What a lock protects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockTarget {
    CreateAccount,
    ModifyAccount(AccountNumber),
}

impl LockTarget {
    pub fn lock_key(&self) -> String {
        match self {
            LockTarget::CreateAccount => CREATE_ACCOUNT_LOCK_KEY.to_string(),
            LockTarget::ModifyAccount(number) => format!("modify:{}", number),
        }
    }

    /// The error a client sees when this lock is busy
    pub fn busy_error(&self) -> DomainError {
        match self {
            LockTarget::CreateAccount => DomainError::AccountCreationLocked,
            LockTarget::ModifyAccount(number) => {
                DomainError::AccountModificationLocked(number.to_string())
            }
        }
    }
}

/// Wait and lease durations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSettings {
    pub wait: Duration,
    pub lease: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            wait: DEFAULT_LOCK_WAIT,
            lease: DEFAULT_LOCK_LEASE,
        }
    }
}

/// Proof of a held lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle {
    pub key: String,
    /// Unique per acquisition
    pub holder: Uuid,
    pub acquired_at: DateTime<Utc>,
    pub lease: Duration,
}

impl LockHandle {
    pub fn new(key: &str, holder: Uuid, lease: Duration) -> Self {
        Self {
            key: key.to_string(),
            holder,
            acquired_at: Utc::now(),
            lease,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The lock stayed held by someone else for the whole wait window
    #[error("Timed out after {waited:?} waiting for lock {key}")]
    Timeout { key: String, waited: Duration },

    #[error("Lock backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for LockError {
    fn from(err: sqlx::Error) -> Self {
        LockError::Backend(err.to_string())
    }
}

/// Cluster- or process-wide lock manager
#[async_trait]
pub trait LockManager: Send + Sync {
    /// Wait up to `wait` for exclusive ownership of `key`. On success the lock
    /// expires after `lease` unless released first.
    async fn acquire(&self, key: &str, wait: Duration, lease: Duration)
        -> Result<LockHandle, LockError>;

    /// Release a lock. Releasing a lock no longer held by `handle` is a no-op.
    async fn release(&self, handle: &LockHandle) -> Result<(), LockError>;
}

/// Run `body` while holding the lock for `target`.
///
/// The lock is released after `body` completes, whatever its outcome. If the
/// body panics or the returned future is dropped before finishing, the lock
/// is released from a background task instead. A release failure is logged
/// and never replaces the body's result; the lease bounds how long such a
/// lock can linger.
pub async fn guarded<T, F, Fut>(
    locks: &Arc<dyn LockManager>,
    target: &LockTarget,
    settings: LockSettings,
    body: F,
) -> AppResult<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let key = target.lock_key();
    tracing::debug!(lock_key = %key, "Trying lock");

    let handle = locks
        .acquire(&key, settings.wait, settings.lease)
        .await
        .map_err(|e| match e {
            LockError::Timeout { .. } => {
                tracing::warn!(lock_key = %key, "Lock acquisition timed out");
                AppError::Domain(target.busy_error())
            }
            LockError::Backend(msg) => AppError::Internal(format!("lock {}: {}", key, msg)),
        })?;

    let guard = LockGuard::new(locks.clone(), handle);
    let outcome = body().await;
    guard.release().await;

    outcome
}

/// Holds an acquired lock. Dropping it without calling `release` hands the
/// release to a spawned task.
struct LockGuard {
    locks: Arc<dyn LockManager>,
    handle: Option<LockHandle>,
}

impl LockGuard {
    fn new(locks: Arc<dyn LockManager>, handle: LockHandle) -> Self {
        Self {
            locks,
            handle: Some(handle),
        }
    }

    async fn release(mut self) {
        if let Some(handle) = &self.handle {
            tracing::debug!(lock_key = %handle.key, "Unlock");
            if let Err(e) = self.locks.release(handle).await {
                tracing::warn!(lock_key = %handle.key, error = %e, "Failed to release lock");
            }
        }
        // Cleared only after the release finished; a release cut short
        // falls back to the drop path.
        self.handle = None;
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        tracing::warn!(lock_key = %handle.key, "Guarded body did not finish, releasing lock in background");
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let locks = self.locks.clone();
                runtime.spawn(async move {
                    if let Err(e) = locks.release(&handle).await {
                        tracing::warn!(lock_key = %handle.key, error = %e, "Failed to release lock");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(lock_key = %handle.key, "No runtime to release lock, leaving it to lease expiry");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn number() -> AccountNumber {
        "1234567890".parse().unwrap()
    }

    #[test]
    fn test_lock_keys() {
        assert_eq!(LockTarget::CreateAccount.lock_key(), "create-account");
        assert_eq!(LockTarget::ModifyAccount(number()).lock_key(), "modify:1234567890");
    }

    #[test]
    fn test_busy_errors_are_target_specific() {
        assert_eq!(LockTarget::CreateAccount.busy_error(), DomainError::AccountCreationLocked);
        assert_eq!(
            LockTarget::ModifyAccount(number()).busy_error(),
            DomainError::AccountModificationLocked("1234567890".to_string())
        );
    }

    #[test]
    fn test_default_settings() {
        let settings = LockSettings::default();
        assert_eq!(settings.wait, Duration::from_secs(2));
        assert_eq!(settings.lease, Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_guarded_releases_after_error() {
        let locks = Arc::new(InMemoryLockManager::new());
        let manager: Arc<dyn LockManager> = locks.clone();
        let target = LockTarget::ModifyAccount(number());
        let settings = LockSettings { wait: Duration::from_millis(10), lease: Duration::from_secs(15) };

        let result: AppResult<()> = guarded(&manager, &target, settings, || async {
            Err(AppError::Domain(DomainError::AccountNotFound("1234567890".into())))
        })
        .await;
        assert!(matches!(result, Err(AppError::Domain(DomainError::AccountNotFound(_)))));

        // Lock is free again
        let handle = locks.acquire(&target.lock_key(), Duration::ZERO, settings.lease).await;
        assert!(handle.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_guarded_maps_timeout_to_busy_error() {
        let locks = Arc::new(InMemoryLockManager::new());
        let manager: Arc<dyn LockManager> = locks.clone();
        let settings = LockSettings { wait: Duration::from_millis(50), lease: Duration::from_secs(15) };
        let _held = locks
            .acquire(CREATE_ACCOUNT_LOCK_KEY, Duration::ZERO, settings.lease)
            .await
            .unwrap();

        let ran = AtomicBool::new(false);
        let ran_flag = &ran;
        let result: AppResult<()> = guarded(&manager, &LockTarget::CreateAccount, settings, move || async move {
            ran_flag.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await;

        assert!(!ran.load(Ordering::SeqCst));
        assert!(matches!(result, Err(AppError::Domain(DomainError::AccountCreationLocked))));
    }

    /// Give a background release a chance to run
    async fn wait_until_free(locks: &InMemoryLockManager, key: &str) -> bool {
        for _ in 0..100 {
            if !locks.is_held(key) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_guarded_releases_when_future_dropped() {
        let locks = Arc::new(InMemoryLockManager::new());
        let manager: Arc<dyn LockManager> = locks.clone();

        let stalled = guarded(&manager, &LockTarget::CreateAccount, LockSettings::default(), || {
            std::future::pending::<AppResult<()>>()
        });
        let timed_out = tokio::time::timeout(Duration::from_millis(20), stalled).await;
        assert!(timed_out.is_err());

        assert!(wait_until_free(&locks, CREATE_ACCOUNT_LOCK_KEY).await);
    }

    #[tokio::test]
    async fn test_guarded_releases_when_body_panics() {
        let locks = Arc::new(InMemoryLockManager::new());
        let manager: Arc<dyn LockManager> = locks.clone();

        let task = tokio::spawn(async move {
            guarded(&manager, &LockTarget::CreateAccount, LockSettings::default(), || async {
                if true {
                    panic!("body failed");
                }
                Ok(())
            })
            .await
        });
        assert!(task.await.unwrap_err().is_panic());

        assert!(wait_until_free(&locks, CREATE_ACCOUNT_LOCK_KEY).await);

        // And the key can be taken again right away
        let handle = locks
            .acquire(CREATE_ACCOUNT_LOCK_KEY, Duration::ZERO, Duration::from_secs(15))
            .await;
        assert!(handle.is_ok());
    }
}
