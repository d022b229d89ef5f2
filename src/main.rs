//! account_ledger - Account and balance transaction ledger API
//!
//! Runs against Postgres when `DATABASE_URL` is set, otherwise against the
//! in-memory store with a few demo users.

use std::net::SocketAddr;
use std::sync::Arc;

use account_ledger::domain::User;
use account_ledger::handlers::{AccountNumberGenerator, RandomAccountNumberGenerator};
use account_ledger::jobs::{JobScheduler, JobSchedulerConfig};
use account_ledger::lock::{InMemoryLockManager, PgLockManager};
use account_ledger::store::{InMemoryStore, PgStore};
use account_ledger::{build_router, db, AppState, Config};
use sqlx::PgPool;
use tokio::task::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging
fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "account_ledger=debug,tower_http=debug".into());

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn demo_users() -> Vec<User> {
    [(1, "alice"), (2, "bob"), (3, "carol")]
        .into_iter()
        .map(|(id, name)| User {
            id,
            name: name.to_string(),
        })
        .collect()
}

/// Backend-specific resources that outlive the router
struct Backend {
    state: AppState,
    pool: Option<PgPool>,
    scheduler: Option<JoinHandle<()>>,
}

async fn postgres_backend(
    config: &Config,
    database_url: &str,
    numbers: Arc<dyn AccountNumberGenerator>,
) -> anyhow::Result<Backend> {
    tracing::info!("Connecting to database...");
    let pool = db::connect(config, database_url).await?;
    db::verify_connection(&pool).await?;

    if !db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }
    tracing::info!("Database connected successfully");

    if !config.is_production() {
        let seeded = db::seed_users(&pool, &demo_users()).await?;
        tracing::debug!(seeded = seeded, "Demo users ensured");
    }

    let locks = PgLockManager::new(pool.clone());
    let scheduler = JobScheduler::with_config(
        locks.clone(),
        JobSchedulerConfig {
            lock_cleanup_interval: config.lock_cleanup_interval,
        },
    );

    // Clear leases left behind by a previous run before taking traffic
    let report = scheduler.run_all_once().await;
    if report.errors.is_empty() {
        tracing::info!(locks_purged = report.locks_purged, "Startup maintenance done");
    } else {
        tracing::warn!(errors = ?report.errors, "Startup maintenance reported errors");
    }
    let scheduler = scheduler.start();

    let state = AppState::build(
        Arc::new(PgStore::new(pool.clone())),
        Arc::new(locks),
        numbers,
        config.ledger_settings(),
    );

    Ok(Backend {
        state,
        pool: Some(pool),
        scheduler: Some(scheduler),
    })
}

fn memory_backend(config: &Config, numbers: Arc<dyn AccountNumberGenerator>) -> Backend {
    tracing::warn!("DATABASE_URL not set, using the in-memory store");

    let state = AppState::build(
        Arc::new(InMemoryStore::with_users(demo_users())),
        Arc::new(InMemoryLockManager::new()),
        numbers,
        config.ledger_settings(),
    );

    Backend {
        state,
        pool: None,
        scheduler: None,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;
    init_tracing(config.is_production());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!("Starting account ledger server");

    let numbers: Arc<dyn AccountNumberGenerator> = match config.account_number_seed {
        Some(seed) => Arc::new(RandomAccountNumberGenerator::with_seed(seed)),
        None => Arc::new(RandomAccountNumberGenerator::new()),
    };

    let backend = match config.database_url.as_deref() {
        Some(url) => postgres_backend(&config, url, numbers).await?,
        None => memory_backend(&config, numbers),
    };

    let app = build_router(backend.state);

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cleanup
    tracing::info!("Server shutting down...");
    if let Some(scheduler) = backend.scheduler {
        scheduler.abort();
    }
    if let Some(pool) = backend.pool {
        pool.close().await;
        tracing::info!("Database connections closed");
    }
    tracing::info!("Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
