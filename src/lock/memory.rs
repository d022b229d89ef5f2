//! In-process lock manager
//!
//! Leases live in a mutex-guarded map. Waiters park on a `Notify` and wake
//! on release or when the blocking lease expires, whichever comes first.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

use super::{LockError, LockHandle, LockManager};

#[derive(Debug)]
struct Lease {
    holder: Uuid,
    expires_at: Instant,
}

#[derive(Debug, Default)]
pub struct InMemoryLockManager {
    leases: Mutex<HashMap<String, Lease>>,
    released: Notify,
}

impl InMemoryLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` is currently held by an unexpired lease
    pub fn is_held(&self, key: &str) -> bool {
        self.leases()
            .get(key)
            .is_some_and(|lease| lease.expires_at > Instant::now())
    }

    fn leases(&self) -> MutexGuard<'_, HashMap<String, Lease>> {
        self.leases.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl LockManager for InMemoryLockManager {
    async fn acquire(
        &self,
        key: &str,
        wait: Duration,
        lease: Duration,
    ) -> Result<LockHandle, LockError> {
        let deadline = Instant::now() + wait;

        loop {
            // Register interest before checking so a release between the
            // check and the wait is not missed.
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let blocked_until = {
                let mut leases = self.leases();
                let now = Instant::now();
                let current = leases.get(key).map(|l| (l.holder, l.expires_at));

                match current {
                    Some((_, expires_at)) if expires_at > now => expires_at,
                    stale => {
                        if let Some((previous, _)) = stale {
                            tracing::warn!(lock_key = key, previous_holder = %previous, "Lease expired, taking over lock");
                        }
                        let holder = Uuid::new_v4();
                        leases.insert(
                            key.to_string(),
                            Lease {
                                holder,
                                expires_at: now + lease,
                            },
                        );
                        return Ok(LockHandle::new(key, holder, lease));
                    }
                }
            };

            if Instant::now() >= deadline {
                return Err(LockError::Timeout {
                    key: key.to_string(),
                    waited: wait,
                });
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(blocked_until.min(deadline)) => {}
            }
        }
    }

    async fn release(&self, handle: &LockHandle) -> Result<(), LockError> {
        let released = {
            let mut leases = self.leases();
            if leases
                .get(&handle.key)
                .is_some_and(|lease| lease.holder == handle.holder)
            {
                leases.remove(&handle.key);
                true
            } else {
                false
            }
        };

        if released {
            self.released.notify_waiters();
        } else {
            tracing::debug!(lock_key = %handle.key, "Lock no longer held by this handle");
        }
        Ok(())
    }
}
