//! Integration tests for the accounts database access layer.
//!
//! These tests need a reachable PostgreSQL server. Point `DATABASE_URL` at a
//! scratch database; when it is unset every test returns early. The helpers
//! create the `users` table, the `user_role` enum and `audit.logs` if they do
//! not exist yet.

use accounts_db::config::{DATABASE_URL_ENV, DatabaseConfig};
use accounts_db::db::{Connector, Db, Statement};
use accounts_db::error::DbResult;
use std::sync::Arc;

const SCHEMA_LOCK_SQL: &str = "SELECT pg_advisory_xact_lock(720301)";

const SCHEMA_SQL: &str = r#"
DO $$ BEGIN
    CREATE TYPE user_role AS ENUM ('admin', 'player');
EXCEPTION WHEN duplicate_object THEN NULL;
END $$;

CREATE TABLE IF NOT EXISTS users (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    verified BOOLEAN NOT NULL DEFAULT FALSE,
    blocked BOOLEAN NOT NULL DEFAULT FALSE,
    role user_role NOT NULL DEFAULT 'player',
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE SCHEMA IF NOT EXISTS audit;

CREATE TABLE IF NOT EXISTS audit.logs (
    id BIGSERIAL PRIMARY KEY,
    message TEXT NOT NULL
);
"#;

/// Gets the database URL from the environment.
#[must_use]
pub fn database_url() -> Option<String> {
    std::env::var(DATABASE_URL_ENV)
        .ok()
        .filter(|url| !url.trim().is_empty())
}

/// Opens a connector with the given pool bounds and makes sure the test
/// schema exists. Returns `None` when no database is configured.
///
/// # Errors
/// Returns error if connecting or creating the schema fails.
pub async fn test_connector(min_size: u32, max_size: u32) -> DbResult<Option<Arc<Connector>>> {
    let Some(url) = database_url() else {
        eprintln!("{} not set; skipping", DATABASE_URL_ENV);
        return Ok(None);
    };

    let config = DatabaseConfig::new(url).with_pool_size(min_size, max_size);
    let connector = Arc::new(Connector::init(config).await?);
    ensure_schema(&Db::new(Arc::clone(&connector))).await?;
    Ok(Some(connector))
}

/// Creates the tables the tests use. Serialized across test binaries with an
/// advisory lock.
///
/// # Errors
/// Returns error if any DDL statement fails.
pub async fn ensure_schema(db: &Db) -> DbResult<()> {
    db.in_transaction(|tx| {
        Box::pin(async move {
            tx.execute(&Statement::new(SCHEMA_LOCK_SQL)).await?;
            tx.execute(&Statement::new(SCHEMA_SQL)).await?;
            Ok(())
        })
    })
    .await
}

/// Generates a unique e-mail address to avoid conflicts between tests.
#[must_use]
pub fn unique_email(prefix: &str) -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);

    format!(
        "{}_{}_{}_{}@example.com",
        prefix,
        std::process::id(),
        ts,
        counter
    )
}
