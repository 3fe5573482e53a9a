//! Database connection management
//!
//! Startup connects with a bounded retry; request paths acquire exactly one
//! transaction per saga and never retry a failed begin.

use std::future::Future;
use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::DatabaseConfig;

/// Startup connection attempts before giving up
pub const CONNECT_ATTEMPTS: u32 = 3;
/// Fixed pause between startup attempts
pub const CONNECT_BACKOFF: Duration = Duration::from_secs(3);

#[derive(Error, Debug)]
pub enum DbError {
    #[error("PostgreSQL unreachable after {attempts} attempts: {source}")]
    Exhausted { attempts: u32, source: sqlx::Error },

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Run `op` until it succeeds or `attempts` are used up, sleeping `backoff` in between.
///
/// Returns the last error on exhaustion. `op` receives the 1-based attempt number.
pub async fn retry_with_backoff<T, E, F, Fut>(
    attempts: u32,
    backoff: Duration,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    info!(attempt, "Connected after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt < attempts => {
                warn!(
                    attempt,
                    max_attempts = attempts,
                    backoff_secs = backoff.as_secs(),
                    error = %e,
                    "Connection attempt failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => {
                error!(attempt, error = %e, "Connection attempts exhausted");
                return Err(e);
            }
        }
    }
}

/// Pooled PostgreSQL connections for the transfer store
#[derive(Clone)]
pub struct ConnectionManager {
    pool: PgPool,
}

impl ConnectionManager {
    pub fn connect_options(config: &DatabaseConfig) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database_name)
            .options([("search_path", config.schema.as_str())])
    }

    /// Single connection attempt
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.db_timeout))
            .connect_with(Self::connect_options(config))
            .await?;

        info!(
            host = %config.host,
            database = %config.database_name,
            driver = %config.driver,
            "PostgreSQL connection pool established"
        );
        Ok(Self { pool })
    }

    /// Connect with [`CONNECT_ATTEMPTS`] attempts spaced by [`CONNECT_BACKOFF`].
    pub async fn connect_with_retry(config: &DatabaseConfig) -> Result<Self, DbError> {
        retry_with_backoff(CONNECT_ATTEMPTS, CONNECT_BACKOFF, |_| Self::connect(config))
            .await
            .map_err(|source| DbError::Exhausted {
                attempts: CONNECT_ATTEMPTS,
                source,
            })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check out one pooled connection; returned to the pool on drop.
    pub async fn acquire(&self) -> Result<PoolConnection<Postgres>, sqlx::Error> {
        self.pool.acquire().await
    }

    /// Begin a transaction that owns its connection.
    ///
    /// The connection goes back to the pool on commit, rollback or drop
    /// (an un-finished transaction is rolled back when dropped).
    pub async fn start_transaction(&self) -> Result<Transaction<'static, Postgres>, sqlx::Error> {
        self.pool.begin().await
    }

    /// Round-trip `SELECT 1` on a freshly checked-out connection.
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        let mut conn = self.acquire().await?;
        sqlx::query("SELECT 1").execute(&mut *conn).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
