use anyhow::Result;
use libsql::Connection;

/// Schema version - increment when making schema changes
const SCHEMA_VERSION: i32 = 2;

/// Run database migrations
pub async fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            description TEXT
        )",
        (),
    )
    .await?;

    let current_version = get_current_version(conn).await?;

    if current_version >= SCHEMA_VERSION {
        tracing::info!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    tracing::info!("Running migrations from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        run_migration_v1(conn).await?;
        record_migration(conn, 1, "Validators, targets and ticks").await?;
    }

    if current_version < 2 {
        run_migration_v2(conn).await?;
        record_migration(conn, 2, "Tick lookup indexes").await?;
    }

    tracing::info!("Database migrations completed (now at version {})", SCHEMA_VERSION);
    Ok(())
}

async fn get_current_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn.query("SELECT MAX(version) FROM schema_migrations", ()).await?;

    if let Some(row) = rows.next().await? {
        let version: Option<i32> = row.get(0)?;
        Ok(version.unwrap_or(0))
    } else {
        Ok(0)
    }
}

async fn record_migration(conn: &Connection, version: i32, description: &str) -> Result<()> {
    let now = crate::database::repository::unix_now();

    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
        libsql::params![version, now, description],
    )
    .await?;

    tracing::info!("Applied migration v{}: {}", version, description);
    Ok(())
}

/// Migration v1: core tables
async fn run_migration_v1(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS validators (
            id TEXT PRIMARY KEY,
            public_key TEXT NOT NULL UNIQUE,
            origin_address TEXT NOT NULL,
            location TEXT NOT NULL DEFAULT 'unknown',
            pending_reward INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        )",
        (),
    )
    .await?;

    // Written by the target management API, read here
    conn.execute(
        "CREATE TABLE IF NOT EXISTS targets (
            id TEXT PRIMARY KEY,
            url TEXT NOT NULL,
            owner_id TEXT NOT NULL,
            disabled INTEGER NOT NULL DEFAULT 0
        )",
        (),
    )
    .await?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS ticks (
            id TEXT PRIMARY KEY,
            target_id TEXT NOT NULL,
            validator_id TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('Good', 'Bad')),
            latency_ms INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            disabled INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (target_id) REFERENCES targets(id) ON DELETE CASCADE,
            FOREIGN KEY (validator_id) REFERENCES validators(id)
        )",
        (),
    )
    .await?;

    Ok(())
}

/// Migration v2: indexes for per-target and per-validator history
async fn run_migration_v2(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_ticks_target_created ON ticks(target_id, created_at DESC)",
        (),
    )
    .await?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_ticks_validator ON ticks(validator_id)", ())
        .await?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_targets_disabled ON targets(disabled)", ())
        .await?;
    Ok(())
}
