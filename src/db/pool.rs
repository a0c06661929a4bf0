//! Bounded LIFO connection pool.
//!
//! The pool hands out at most `max_size` sessions. Idle sessions are reused
//! most-recently-released first so a small hot set stays warm. New sessions are
//! opened lazily once the idle stack is empty. When every session is checked
//! out, `acquire` waits until one is released.
//!
//! A session is checked for liveness with [`Session::is_closed`] only, with
//! no round trip on checkout. A session the server dropped while idle may
//! therefore be handed out; its first statement fails with a connection-loss
//! error, and the session is discarded when it is released.
//!
//! One mutex guards the idle stack and the `total_created` counter; it is
//! never held across an `.await`. Growth is decided and reserved under that
//! mutex, then the network connect runs against the reservation.

use super::backend::{Connect, Session};
use crate::config::ConfigError;
use crate::error::{DbError, DbResult};
use parking_lot::Mutex;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

/// Pool bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    /// Sessions opened by [`ConnectionPool::open`] before it returns.
    pub min_size: usize,
    /// Hard cap on live sessions.
    pub max_size: usize,
}

impl PoolOptions {
    /// Checks `1 <= min_size <= max_size`.
    ///
    /// # Errors
    /// Returns [`DbError::Configuration`] when the bounds are invalid.
    pub fn validate(&self) -> DbResult<()> {
        if self.min_size < 1 {
            return Err(
                ConfigError::InvalidValue("pool min_size must be at least 1".to_string()).into(),
            );
        }
        if self.max_size < self.min_size {
            return Err(ConfigError::InvalidValue(format!(
                "pool max_size ({}) cannot be smaller than min_size ({})",
                self.max_size, self.min_size
            ))
            .into());
        }
        Ok(())
    }
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Configured cap.
    pub max_size: usize,
    /// Live sessions owned by the pool, idle or checked out.
    pub total_created: usize,
    /// Sessions waiting on the idle stack.
    pub idle: usize,
    /// Sessions checked out or being opened.
    pub in_use: usize,
}

struct PoolState<T> {
    idle: Vec<T>,
    total_created: usize,
    closed: bool,
}

struct PoolInner<C: Connect> {
    connector: C,
    max_size: usize,
    permits: Arc<Semaphore>,
    state: Mutex<PoolState<C::Connection>>,
}

impl<C: Connect> PoolInner<C> {
    fn release(&self, conn: C::Connection, discard: bool) {
        let dropped = {
            let mut state = self.state.lock();
            if state.closed {
                Some(conn)
            } else if discard || conn.is_closed() {
                state.total_created = state.total_created.saturating_sub(1);
                debug!(
                    total_created = state.total_created,
                    "Discarded unusable connection"
                );
                Some(conn)
            } else {
                state.idle.push(conn);
                None
            }
        };
        drop(dropped);
    }

    fn cancel_reservation(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            state.total_created = state.total_created.saturating_sub(1);
        }
    }
}

/// Gives a growth reservation back unless the connect succeeded.
struct Reservation<'a, C: Connect> {
    inner: &'a PoolInner<C>,
    armed: bool,
}

impl<C: Connect> Reservation<'_, C> {
    async fn fulfil(mut self) -> DbResult<C::Connection> {
        let conn = self.inner.connector.connect().await?;
        self.armed = false;
        Ok(conn)
    }
}

impl<C: Connect> Drop for Reservation<'_, C> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.cancel_reservation();
        }
    }
}

enum Checkout<T> {
    Idle(T),
    Grow,
}

/// Fixed-capacity pool of backend sessions.
pub struct ConnectionPool<C: Connect> {
    inner: Arc<PoolInner<C>>,
}

impl<C: Connect> Clone for ConnectionPool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connect> fmt::Debug for ConnectionPool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("stats", &self.status())
            .finish()
    }
}

impl<C: Connect> ConnectionPool<C> {
    /// Validates `options` and opens `min_size` sessions before returning.
    ///
    /// # Errors
    /// Returns a configuration error for invalid bounds, or the backend error
    /// of the first failed connect (already opened sessions are closed).
    pub async fn open(connector: C, options: PoolOptions) -> DbResult<Self> {
        options.validate()?;

        let mut warm = Vec::with_capacity(options.min_size);
        for _ in 0..options.min_size {
            match connector.connect().await {
                Ok(conn) => warm.push(conn),
                Err(err) => {
                    for conn in warm {
                        if let Err(close_err) = conn.close().await {
                            warn!(error = %close_err, "Failed to close pre-warmed connection");
                        }
                    }
                    return Err(err);
                }
            }
        }

        info!(
            min_size = options.min_size,
            max_size = options.max_size,
            "Connection pool established"
        );

        let total_created = warm.len();
        Ok(Self {
            inner: Arc::new(PoolInner {
                connector,
                max_size: options.max_size,
                permits: Arc::new(Semaphore::new(options.max_size)),
                state: Mutex::new(PoolState {
                    idle: warm,
                    total_created,
                    closed: false,
                }),
            }),
        })
    }

    /// Checks out a session, waiting while the pool is at capacity.
    ///
    /// Idle sessions found closed are replaced transparently.
    ///
    /// # Errors
    /// Returns [`DbError::PoolClosed`] after [`ConnectionPool::close`], or the
    /// backend error when a new session cannot be opened.
    pub async fn acquire(&self) -> DbResult<PooledConnection<C>> {
        let permit = Arc::clone(&self.inner.permits)
            .acquire_owned()
            .await
            .map_err(|_| DbError::PoolClosed)?;

        let checkout = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(DbError::PoolClosed);
            }
            match state.idle.pop() {
                Some(conn) => Checkout::Idle(conn),
                None if state.total_created < self.inner.max_size => {
                    state.total_created += 1;
                    Checkout::Grow
                }
                // Sessions off the idle stack each hold a permit, and so do we.
                None => unreachable!("checkout permit granted with the pool at capacity"),
            }
        };

        let conn = match checkout {
            Checkout::Idle(conn) if !conn.is_closed() => conn,
            Checkout::Idle(stale) => {
                drop(stale);
                debug!("Replacing connection closed while idle");
                self.reservation().fulfil().await?
            }
            Checkout::Grow => {
                let conn = self.reservation().fulfil().await?;
                debug!("Opened new pooled connection");
                conn
            }
        };

        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(&self.inner),
            discard: false,
            _permit: permit,
        })
    }

    /// Closes every idle session and resets the pool.
    ///
    /// Checked-out sessions are not reclaimed; they are dropped when released.
    /// Later acquires fail with [`DbError::PoolClosed`].
    pub async fn close(&self) {
        self.inner.permits.close();
        let drained = {
            let mut state = self.inner.state.lock();
            state.closed = true;
            state.total_created = 0;
            std::mem::take(&mut state.idle)
        };

        let count = drained.len();
        for conn in drained {
            if let Err(err) = conn.close().await {
                warn!(error = %err, "Failed to close pooled connection");
            }
        }
        info!(closed = count, "Connection pool closed");
    }

    /// Returns `true` once [`ConnectionPool::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Current counters.
    #[must_use]
    pub fn status(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            max_size: self.inner.max_size,
            total_created: state.total_created,
            idle: state.idle.len(),
            in_use: state.total_created.saturating_sub(state.idle.len()),
        }
    }

    fn reservation(&self) -> Reservation<'_, C> {
        Reservation {
            inner: &self.inner,
            armed: true,
        }
    }
}

/// A checked-out session.
///
/// Dereferences to the backend session. Dropping the guard releases the
/// session back to the pool on every exit path; closed sessions are discarded
/// instead of being reused.
pub struct PooledConnection<C: Connect> {
    conn: Option<C::Connection>,
    pool: Arc<PoolInner<C>>,
    discard: bool,
    _permit: OwnedSemaphorePermit,
}

impl<C: Connect> PooledConnection<C> {
    /// Returns `true` when the session can no longer be used.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.conn.as_ref().is_none_or(Session::is_closed)
    }

    /// Releases the session now instead of at end of scope.
    pub fn release(self) {
        drop(self);
    }

    /// Drops the session on release instead of returning it to the pool.
    pub(crate) fn mark_for_discard(&mut self) {
        self.discard = true;
    }
}

impl<C: Connect> Deref for PooledConnection<C> {
    type Target = C::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn
            .as_ref()
            .expect("connection is present until the guard is dropped")
    }
}

impl<C: Connect> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn
            .as_mut()
            .expect("connection is present until the guard is dropped")
    }
}

impl<C: Connect> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn, self.discard);
        }
    }
}
