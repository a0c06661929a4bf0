//! Configured owner of the process connection pool.
//!
//! A [`Connector`] is built explicitly from a validated [`DatabaseConfig`] and
//! handed to whatever needs database access. [`ConnectorSlot`] gives it a
//! single-instance-per-process lifecycle: the first caller constructs it,
//! concurrent first callers wait for that construction, and `shutdown` closes
//! the pool and resets the slot so a later call builds a fresh one.

use super::backend::{Connect, Session};
use super::pool::{ConnectionPool, PoolOptions, PooledConnection};
use super::postgres::PgConnector;
use super::query::Statement;
use crate::config::{DatabaseConfig, redact_dsn};
use crate::error::DbResult;
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

/// Schema whose tables are reported without qualification.
pub const DEFAULT_SCHEMA: &str = "public";

const USER_TABLES_SQL: &str = "SELECT schemaname, tablename \
     FROM pg_catalog.pg_tables \
     WHERE schemaname NOT IN ('pg_catalog', 'information_schema') \
     ORDER BY schemaname <> 'public', schemaname, tablename";

/// Owns exactly one connection pool.
pub struct Connector<C: Connect = PgConnector> {
    pool: ConnectionPool<C>,
    config: DatabaseConfig,
}

impl Connector<PgConnector> {
    /// Validates `config`, connects to PostgreSQL and pre-warms `min_size`
    /// connections.
    ///
    /// # Errors
    /// Returns a configuration error for an empty DSN or invalid pool bounds,
    /// or the backend error if the initial connections cannot be opened.
    pub async fn init(config: DatabaseConfig) -> DbResult<Self> {
        config.validate()?;
        let backend = PgConnector::new(config.dsn.clone());
        Self::with_backend(backend, config).await
    }
}

impl<C: Connect> Connector<C> {
    /// Builds a connector over an arbitrary backend.
    ///
    /// # Errors
    /// Same as [`Connector::init`].
    pub async fn with_backend(backend: C, config: DatabaseConfig) -> DbResult<Self> {
        config.validate()?;
        let options = PoolOptions {
            min_size: config.min_size as usize,
            max_size: config.max_size as usize,
        };
        let pool = ConnectionPool::open(backend, options).await?;

        info!(
            dsn = %redact_dsn(&config.dsn),
            min_size = config.min_size,
            max_size = config.max_size,
            "Database connector initialized"
        );

        Ok(Self { pool, config })
    }

    /// Checks out a connection. It returns to the pool when the guard drops.
    ///
    /// # Errors
    /// See [`ConnectionPool::acquire`].
    pub async fn connection(&self) -> DbResult<PooledConnection<C>> {
        self.pool.acquire().await
    }

    /// Lists user tables outside the system schemas.
    ///
    /// Tables in the default schema come first and unqualified; the rest
    /// follow as `schema.table`, ordered by schema then table name.
    ///
    /// # Errors
    /// Returns the backend error if the catalog query fails.
    pub async fn iter_user_tables(&self) -> DbResult<Vec<String>> {
        let rows = {
            let mut conn = self.connection().await?;
            conn.fetch_all(&Statement::new(USER_TABLES_SQL)).await?
        };

        let mut tables = rows
            .iter()
            .map(|row| {
                Ok((
                    row.try_get::<String>("schemaname")?,
                    row.try_get::<String>("tablename")?,
                ))
            })
            .collect::<DbResult<Vec<_>>>()?;
        tables.sort_by(|(a_schema, a_table), (b_schema, b_table)| {
            (a_schema != DEFAULT_SCHEMA, a_schema, a_table).cmp(&(
                b_schema != DEFAULT_SCHEMA,
                b_schema,
                b_table,
            ))
        });

        Ok(tables
            .into_iter()
            .map(|(schema, table)| {
                if schema == DEFAULT_SCHEMA {
                    table
                } else {
                    format!("{}.{}", schema, table)
                }
            })
            .collect())
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &ConnectionPool<C> {
        &self.pool
    }

    /// The validated configuration.
    #[must_use]
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Closes every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database connector shut down");
    }
}

/// Holds at most one [`Connector`] per process.
pub struct ConnectorSlot<C: Connect = PgConnector> {
    current: RwLock<Option<Arc<Connector<C>>>>,
    init_lock: tokio::sync::Mutex<()>,
}

impl<C: Connect> Default for ConnectorSlot<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connect> ConnectorSlot<C> {
    /// Creates an uninitialized slot.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            current: RwLock::new(None),
            init_lock: tokio::sync::Mutex::const_new(()),
        }
    }

    /// Returns the connector if one has been built.
    #[must_use]
    pub fn get(&self) -> Option<Arc<Connector<C>>> {
        self.current.read().clone()
    }

    /// Returns the connector, building it with `init` on first use.
    ///
    /// Concurrent first callers run `init` once; the others receive the same
    /// instance. A failed `init` leaves the slot empty.
    ///
    /// # Errors
    /// Propagates the error returned by `init`.
    pub async fn get_or_init<F, Fut>(&self, init: F) -> DbResult<Arc<Connector<C>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DbResult<Connector<C>>>,
    {
        if let Some(connector) = self.get() {
            return Ok(connector);
        }

        let _guard = self.init_lock.lock().await;
        if let Some(connector) = self.get() {
            return Ok(connector);
        }

        let connector = Arc::new(init().await?);
        *self.current.write() = Some(Arc::clone(&connector));
        Ok(connector)
    }

    /// Closes the connector and resets the slot to uninitialized.
    pub async fn shutdown(&self) {
        let _guard = self.init_lock.lock().await;
        let taken = self.current.write().take();
        if let Some(connector) = taken {
            connector.close().await;
        }
    }
}

static CONNECTOR: ConnectorSlot<PgConnector> = ConnectorSlot::new();

/// Initializes the process connector from `config` if it does not exist yet.
///
/// # Errors
/// See [`Connector::init`].
pub async fn init_connector(config: DatabaseConfig) -> DbResult<Arc<Connector>> {
    CONNECTOR.get_or_init(|| Connector::init(config)).await
}

/// Returns the process connector, building it from the environment on first
/// use.
///
/// # Errors
/// Returns a configuration error if the environment is incomplete, or the
/// backend error if connecting fails.
pub async fn connector() -> DbResult<Arc<Connector>> {
    CONNECTOR
        .get_or_init(|| async { Connector::init(DatabaseConfig::from_env()?).await })
        .await
}

/// Closes the process connector. A later call to [`connector`] rebuilds it.
pub async fn shutdown_connector() {
    CONNECTOR.shutdown().await;
}
