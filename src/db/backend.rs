//! Backend seam between the pool and a concrete database driver.

use super::query::Statement;
use super::value::Row;
use crate::error::DbResult;
use std::future::Future;

/// A live backend session.
pub trait Session: Send + 'static {
    /// Returns `true` once the session is known to be unusable.
    ///
    /// A backend may only learn this from a failed statement, so a session
    /// the server dropped while idle can report `false` until it is used.
    fn is_closed(&self) -> bool;

    /// Runs `statement` and materializes every result row.
    fn fetch_all(
        &mut self,
        statement: &Statement,
    ) -> impl Future<Output = DbResult<Vec<Row>>> + Send;

    /// Runs `statement` and returns only its first row.
    fn fetch_optional(
        &mut self,
        statement: &Statement,
    ) -> impl Future<Output = DbResult<Option<Row>>> + Send;

    /// Runs `statement` and returns the number of affected rows.
    fn execute(&mut self, statement: &Statement) -> impl Future<Output = DbResult<u64>> + Send;

    /// Closes the session gracefully.
    fn close(self) -> impl Future<Output = DbResult<()>> + Send;
}

/// Opens new sessions against one backend.
pub trait Connect: Send + Sync + 'static {
    /// Session type produced by this backend.
    type Connection: Session;

    /// Establishes a new session.
    fn connect(&self) -> impl Future<Output = DbResult<Self::Connection>> + Send;
}
