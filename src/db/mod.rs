//! Pooled PostgreSQL access.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `value` | Bindable values and ordered rows |
//! | `query` | Statement builders |
//! | `backend` | Session and connect traits the pool is generic over |
//! | `postgres` | sqlx-backed sessions |
//! | `pool` | Bounded LIFO connection pool |
//! | `connector` | Configured pool owner and the process-wide slot |
//! | `facade` | Statement execution and transactions |

mod backend;
mod connector;
mod facade;
mod pool;
mod postgres;
mod query;
mod value;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{Connect, Session};
pub use connector::{
    Connector, ConnectorSlot, DEFAULT_SCHEMA, connector, init_connector, shutdown_connector,
};
pub use facade::{Db, Transaction};
pub use pool::{ConnectionPool, PoolOptions, PoolStats, PooledConnection};
pub use postgres::{PgConnector, PgSession};
pub use query::{
    SelectOptions, Statement, build_delete, build_insert, build_select, build_update,
    sanitize_order_by,
};
pub use value::{FromSqlValue, Record, Row, SqlEnum, SqlValue};
