//! Scheduled Jobs
//!
//! Background maintenance for the Postgres backend.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::interval;

use crate::lock::{LockError, PgLockManager};

// =========================================================================
// Expired lock cleanup
// =========================================================================

/// Delete lock rows whose lease has lapsed. Acquisition already overwrites
/// expired rows, so this only keeps the table from accumulating dead keys.
pub async fn purge_expired_locks(locks: &PgLockManager) -> Result<u64, JobError> {
    let rows_deleted = locks.purge_expired().await?;

    if rows_deleted > 0 {
        tracing::info!(rows_deleted = rows_deleted, "Purged expired locks");
    }

    Ok(rows_deleted)
}

// =========================================================================
// Job Scheduler
// =========================================================================

/// Configuration for job scheduler
#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    /// Interval for expired lock cleanup (default: 1 minute)
    pub lock_cleanup_interval: Duration,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            lock_cleanup_interval: Duration::from_secs(60),
        }
    }
}

/// Job Scheduler - runs periodic maintenance tasks
pub struct JobScheduler {
    locks: PgLockManager,
    config: JobSchedulerConfig,
}

impl JobScheduler {
    pub fn new(locks: PgLockManager) -> Self {
        Self {
            locks,
            config: JobSchedulerConfig::default(),
        }
    }

    pub fn with_config(locks: PgLockManager, config: JobSchedulerConfig) -> Self {
        Self { locks, config }
    }

    /// Start the job scheduler in the background
    /// Returns a handle that can be used to abort the scheduler
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        tracing::info!("Job scheduler started");

        let mut lock_interval = interval(self.config.lock_cleanup_interval);

        loop {
            lock_interval.tick().await;
            if let Err(e) = purge_expired_locks(&self.locks).await {
                tracing::error!(error = %e, "Expired lock cleanup failed");
            }
        }
    }

    /// Run all maintenance jobs once (for manual trigger or testing)
    pub async fn run_all_once(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        match purge_expired_locks(&self.locks).await {
            Ok(count) => report.locks_purged = count,
            Err(e) => report.errors.push(format!("Lock cleanup: {}", e)),
        }

        report.completed_at = Utc::now();
        report
    }
}

/// Report from running maintenance jobs
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub locks_purged: u64,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Lock store error: {0}")]
    Lock(#[from] LockError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_scheduler_config_default() {
        let config = JobSchedulerConfig::default();
        assert_eq!(config.lock_cleanup_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_maintenance_report_default() {
        let report = MaintenanceReport::default();
        assert_eq!(report.locks_purged, 0);
        assert!(report.errors.is_empty());
    }
}
