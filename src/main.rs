//! accounts-db admin tool
//!
//! Connects with the configured pool, lists user tables and reports pool
//! status.
//!
//! Configuration comes from the TOML file given as the first argument or in
//! `ACCOUNTS_DB_CONFIG`, otherwise from `DATABASE_URL` and friends.

use accounts_db::config::{Config, DatabaseConfig};
use accounts_db::db::{init_connector, shutdown_connector};
use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CONFIG_PATH_ENV: &str = "ACCOUNTS_DB_CONFIG";

fn load_config() -> anyhow::Result<DatabaseConfig> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok());

    let config = match path {
        Some(path) => {
            info!("Loading configuration from {}", path);
            Config::load(&path).with_context(|| format!("failed to load {}", path))?
        }
        None => Config::from_env().context("failed to read configuration from environment")?,
    };
    Ok(config.database)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config()?;
    info!("Using database {:?}", config);

    let connector = init_connector(config).await?;

    let tables = connector.iter_user_tables().await?;
    info!("Found {} user tables", tables.len());
    for table in &tables {
        println!("{}", table);
    }

    let stats = connector.pool().status();
    println!(
        "pool: max_size={} total_created={} idle={} in_use={}",
        stats.max_size, stats.total_created, stats.idle, stats.in_use
    );

    shutdown_connector().await;
    Ok(())
}
