/// Durable storage for the hub
///
/// libsql (SQLite) tables for validators, monitored targets and ticks,
/// exposed to the hub core through `uplink::hub::HubStorage`.
pub mod migrations;
pub mod repository;

pub use repository::LibsqlStorage;

use anyhow::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}
