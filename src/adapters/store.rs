//! # Store Adapter
//!
//! PostgreSQL access through a `sqlx` pool. The pool is dialed and verified
//! with `SELECT 1` at startup; afterwards each method issues exactly one
//! query through the store's executor.

use crate::adapters::resilient_executor;
use crate::config::loader::redact_url;
use crate::config::DatabaseConfig;
use crate::error::{BoxError, ResilienceError};
use crate::resilience::{
    CircuitBreaker, ConnectionBootstrapper, ExecuteError, LiveHandle, ResilientExecutor,
    SharedObserver,
};
use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgQueryResult, PgRow};
use sqlx::query::Query;
use sqlx::Postgres;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Error returned by store calls; the `sqlx` error is kept intact
pub type StoreError = ExecuteError<sqlx::Error>;

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
impl LiveHandle for PgPool {
    async fn check_liveness(&self) -> Result<(), BoxError> {
        sqlx::query("SELECT 1").execute(self).await?;
        Ok(())
    }

    async fn close(&self) {
        PgPool::close(self).await;
    }
}

/// Breaker-protected PostgreSQL client
#[derive(Debug, Clone)]
pub struct Store {
    pool: PgPool,
    executor: ResilientExecutor,
}

impl Store {
    pub const DEPENDENCY: &'static str = "store";

    /// Dial the database with retry, then wrap the pool in a breaker
    pub async fn connect(
        config: &DatabaseConfig,
        cancel: &CancellationToken,
        observer: SharedObserver,
    ) -> Result<Self, ResilienceError> {
        let resilience = &config.resilience;
        let bootstrapper =
            ConnectionBootstrapper::new(Self::DEPENDENCY, resilience.bootstrap_config());

        let pool = bootstrapper
            .connect(cancel, || {
                PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .min_connections(config.min_connections)
                    .acquire_timeout(resilience.timeout())
                    .connect(&config.url)
            })
            .await?;

        info!(
            url = %redact_url(&config.url),
            max_connections = config.max_connections,
            "Store connected"
        );

        Ok(Self::from_pool(
            pool,
            resilient_executor(Self::DEPENDENCY, resilience, observer),
        ))
    }

    /// Wrap an existing pool; no liveness check is performed
    pub fn from_pool(pool: PgPool, executor: ResilientExecutor) -> Self {
        Self { pool, executor }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        self.executor.breaker()
    }

    pub async fn ping(&self) -> StoreResult<()> {
        let pool = &self.pool;
        self.executor
            .execute(|| async move {
                sqlx::query("SELECT 1").execute(pool).await?;
                Ok::<_, sqlx::Error>(())
            })
            .await
    }

    /// Run a statement that returns no rows and takes no parameters; use
    /// [`execute_query`](Self::execute_query) for bound values
    pub async fn execute(&self, sql: &str) -> StoreResult<PgQueryResult> {
        let pool = &self.pool;
        let result = self
            .executor
            .execute(|| sqlx::query(sql).execute(pool))
            .await?;
        debug!(rows_affected = result.rows_affected(), "Store statement executed");
        Ok(result)
    }

    /// Run a statement with bound parameters
    ///
    /// ```rust,no_run
    /// # async fn example(store: &resilience_core::adapters::Store) -> Result<(), resilience_core::adapters::StoreError> {
    /// store
    ///     .execute_query(sqlx::query("UPDATE users SET name = $1 WHERE id = $2").bind("alice").bind(7_i64))
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn execute_query<'q>(
        &self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> StoreResult<PgQueryResult> {
        let pool = &self.pool;
        let result = self.executor.execute(move || query.execute(pool)).await?;
        debug!(rows_affected = result.rows_affected(), "Store statement executed");
        Ok(result)
    }

    /// Single-column, at-most-one-row query without parameters (`SELECT
    /// count(*) ...`); parameterized reads go through [`call`](Self::call)
    pub async fn fetch_optional_scalar<T>(&self, sql: &str) -> StoreResult<Option<T>>
    where
        T: for<'r> sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres> + Send + Unpin,
        (T,): for<'r> sqlx::FromRow<'r, PgRow>,
    {
        let pool = &self.pool;
        self.executor
            .execute(|| sqlx::query_scalar::<_, T>(sql).fetch_optional(pool))
            .await
    }

    /// Arbitrary single query against the pool, guarded like the built-in calls
    pub async fn call<T, F, Fut>(&self, op: F) -> StoreResult<T>
    where
        F: FnOnce(PgPool) -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let pool = self.pool.clone();
        self.executor.execute(|| op(pool)).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!(component = Self::DEPENDENCY, "Store closed");
    }
}
