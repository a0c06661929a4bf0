//! Statement execution on pooled connections.
//!
//! [`Db`] is the only component that borrows connections. Each call checks
//! out one connection, runs the statement and releases it, so independent
//! calls may land on different sessions. [`Transaction`] keeps one session for
//! its whole lifetime.

use super::backend::{Connect, Session};
use super::connector::Connector;
use super::pool::PooledConnection;
use super::postgres::PgConnector;
use super::query::Statement;
use super::value::{Row, SqlValue};
use crate::error::DbResult;
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::warn;

/// Data access entry point.
pub struct Db<C: Connect = PgConnector> {
    connector: Arc<Connector<C>>,
}

impl<C: Connect> Clone for Db<C> {
    fn clone(&self) -> Self {
        Self {
            connector: Arc::clone(&self.connector),
        }
    }
}

impl<C: Connect> Db<C> {
    /// Creates a facade over `connector`.
    #[must_use]
    pub fn new(connector: Arc<Connector<C>>) -> Self {
        Self { connector }
    }

    /// The connector this facade draws connections from.
    #[must_use]
    pub fn connector(&self) -> &Arc<Connector<C>> {
        &self.connector
    }

    /// Runs `statement` and returns every row.
    ///
    /// # Errors
    /// Returns pool or backend errors unchanged.
    pub async fn fetch_all(&self, statement: &Statement) -> DbResult<Vec<Row>> {
        let mut conn = self.connector.connection().await?;
        conn.fetch_all(statement).await
    }

    /// Runs `statement` and returns the first row, or `None` when there is none.
    ///
    /// # Errors
    /// Returns pool or backend errors unchanged.
    pub async fn fetch_one(&self, statement: &Statement) -> DbResult<Option<Row>> {
        let mut conn = self.connector.connection().await?;
        conn.fetch_optional(statement).await
    }

    /// Runs `statement` and returns the affected-row count.
    ///
    /// # Errors
    /// Returns pool or backend errors unchanged.
    pub async fn execute(&self, statement: &Statement) -> DbResult<u64> {
        let mut conn = self.connector.connection().await?;
        conn.execute(statement).await
    }

    /// Runs `sql` once per parameter set on a single connection.
    ///
    /// Returns the total affected-row count. Stops at the first failure.
    ///
    /// # Errors
    /// Returns pool or backend errors unchanged.
    pub async fn execute_many<I>(&self, sql: &str, batches: I) -> DbResult<u64>
    where
        I: IntoIterator<Item = Vec<SqlValue>>,
        I::IntoIter: Send,
    {
        let mut conn = self.connector.connection().await?;
        let mut affected = 0;
        for params in batches {
            affected += conn.execute(&Statement::with_params(sql, params)).await?;
        }
        Ok(affected)
    }

    /// Opens a transaction on a dedicated connection.
    ///
    /// # Errors
    /// Returns pool or backend errors if the connection cannot be acquired or
    /// `BEGIN` fails.
    pub async fn transaction(&self) -> DbResult<Transaction<C>> {
        let conn = self.connector.connection().await?;
        Transaction::begin(conn).await
    }

    /// Runs `work` in a transaction: commits when it returns `Ok`, rolls back
    /// when it returns `Err`.
    ///
    /// ```ignore
    /// let moved = db
    ///     .in_transaction(|tx| {
    ///         Box::pin(async move {
    ///             tx.execute(&debit).await?;
    ///             tx.execute(&credit).await
    ///         })
    ///     })
    ///     .await?;
    /// ```
    ///
    /// # Errors
    /// Returns the error produced by `work`, or the error of `BEGIN`/`COMMIT`.
    pub async fn in_transaction<T, F>(&self, work: F) -> DbResult<T>
    where
        F: for<'t> FnOnce(&'t mut Transaction<C>) -> BoxFuture<'t, DbResult<T>>,
    {
        let mut tx = self.transaction().await?;
        match work(&mut tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }
}

/// An open transaction holding one connection.
///
/// Statements run on the same session in issue order. Call
/// [`Transaction::commit`] or [`Transaction::rollback`] to finish; a
/// transaction dropped while still open discards its connection, so the
/// uncommitted work is abandoned server-side and never leaks to another
/// checkout.
pub struct Transaction<C: Connect = PgConnector> {
    conn: PooledConnection<C>,
    open: bool,
}

impl<C: Connect> Transaction<C> {
    async fn begin(mut conn: PooledConnection<C>) -> DbResult<Self> {
        conn.execute(&Statement::new("BEGIN")).await?;
        Ok(Self { conn, open: true })
    }

    /// Runs `statement` inside the transaction and returns every row.
    ///
    /// # Errors
    /// Returns backend errors unchanged.
    pub async fn fetch_all(&mut self, statement: &Statement) -> DbResult<Vec<Row>> {
        self.conn.fetch_all(statement).await
    }

    /// Runs `statement` inside the transaction and returns the first row.
    ///
    /// # Errors
    /// Returns backend errors unchanged.
    pub async fn fetch_one(&mut self, statement: &Statement) -> DbResult<Option<Row>> {
        self.conn.fetch_optional(statement).await
    }

    /// Runs `statement` inside the transaction and returns the affected-row count.
    ///
    /// # Errors
    /// Returns backend errors unchanged.
    pub async fn execute(&mut self, statement: &Statement) -> DbResult<u64> {
        self.conn.execute(statement).await
    }

    /// Commits and releases the connection.
    ///
    /// # Errors
    /// Returns the backend error if `COMMIT` fails; the connection is then
    /// discarded.
    pub async fn commit(mut self) -> DbResult<()> {
        self.finish("COMMIT").await
    }

    /// Rolls back and releases the connection.
    ///
    /// # Errors
    /// Returns the backend error if `ROLLBACK` fails; the connection is then
    /// discarded.
    pub async fn rollback(mut self) -> DbResult<()> {
        self.finish("ROLLBACK").await
    }

    // `open` stays set until the command completes, so a cancelled commit is
    // still discarded by `Drop`.
    async fn finish(&mut self, command: &'static str) -> DbResult<()> {
        let result = self.conn.execute(&Statement::new(command)).await;
        self.open = false;
        if result.is_err() {
            self.conn.mark_for_discard();
        }
        result.map(|_| ())
    }
}

impl<C: Connect> Drop for Transaction<C> {
    fn drop(&mut self) {
        if self.open {
            warn!("Transaction dropped while open; discarding its connection");
            self.conn.mark_for_discard();
        }
    }
}
