use anyhow::{Result, bail};
use async_trait::async_trait;
use libsql::{Row, params};
#[cfg(test)]
use std::time::Duration;
use std::time::{SystemTime, UNIX_EPOCH};
use uplink::CheckOutcome;
use uplink::hub::{HubStorage, MonitoredTarget, NewTick, Tick, Validator};
use uuid::Uuid;

use crate::pool::{LibsqlManager, LibsqlPool};

/// Seconds since the Unix epoch
pub fn unix_now() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

#[cfg(test)]
fn from_unix(timestamp: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(timestamp.max(0) as u64)
}

/// SQLite integers are signed; larger values saturate
fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// `HubStorage` over a pooled libsql database
pub struct LibsqlStorage {
    pool: LibsqlPool,
}

impl LibsqlStorage {
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>> {
        Ok(self.pool.get().await?)
    }

    /// Validator by id
    #[cfg(test)]
    pub async fn get_validator(&self, id: &str) -> Result<Option<Validator>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, public_key, origin_address, location, pending_reward FROM validators WHERE id = ?",
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(validator_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Most recent ticks for a target, newest first
    #[cfg(test)]
    pub async fn recent_ticks(&self, target_id: &str, limit: usize) -> Result<Vec<Tick>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, target_id, validator_id, status, latency_ms, created_at, disabled FROM ticks WHERE target_id = ? ORDER BY created_at DESC LIMIT ?",
                params![target_id, limit as i64],
            )
            .await?;

        let mut ticks = Vec::new();
        while let Some(row) = rows.next().await? {
            let status: String = row.get(3)?;
            ticks.push(Tick {
                id: row.get(0)?,
                target_id: row.get(1)?,
                validator_id: row.get(2)?,
                outcome: status.parse::<CheckOutcome>().map_err(anyhow::Error::msg)?,
                latency_ms: row.get::<i64>(4)? as u64,
                created_at: from_unix(row.get(5)?),
                disabled: row.get::<i64>(6)? != 0,
            });
        }
        Ok(ticks)
    }
}

fn validator_from_row(row: &Row) -> Result<Validator> {
    Ok(Validator {
        id: row.get(0)?,
        public_key: row.get(1)?,
        origin_address: row.get(2)?,
        location: row.get(3)?,
        pending_reward: row.get::<i64>(4)? as u64,
    })
}

#[async_trait]
impl HubStorage for LibsqlStorage {
    async fn list_active_targets(&self) -> Result<Vec<MonitoredTarget>> {
        let conn = self.get_conn().await?;
        let mut rows =
            conn.query("SELECT id, url, owner_id FROM targets WHERE disabled = 0", ()).await?;

        let mut targets = Vec::new();
        while let Some(row) = rows.next().await? {
            targets.push(MonitoredTarget {
                id: row.get(0)?,
                url: row.get(1)?,
                owner_id: row.get(2)?,
                disabled: false,
            });
        }
        Ok(targets)
    }

    async fn find_validator_by_public_key(&self, public_key: &str) -> Result<Option<Validator>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, public_key, origin_address, location, pending_reward FROM validators WHERE public_key = ?",
                params![public_key],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(validator_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn create_validator(&self, public_key: &str, origin_address: &str) -> Result<Validator> {
        let conn = self.get_conn().await?;
        let validator = Validator {
            id: Uuid::new_v4().to_string(),
            public_key: public_key.to_string(),
            origin_address: origin_address.to_string(),
            location: "unknown".to_string(),
            pending_reward: 0,
        };

        conn.execute(
            "INSERT INTO validators (id, public_key, origin_address, location, pending_reward, created_at) VALUES (?, ?, ?, ?, 0, ?)",
            params![
                validator.id.clone(),
                validator.public_key.clone(),
                validator.origin_address.clone(),
                validator.location.clone(),
                unix_now()
            ],
        )
        .await?;

        Ok(validator)
    }

    async fn record_check(&self, tick: NewTick, reward: u64) -> Result<Tick> {
        let conn = self.get_conn().await?;
        let tick = Tick {
            id: Uuid::new_v4().to_string(),
            target_id: tick.target_id,
            validator_id: tick.validator_id,
            outcome: tick.outcome,
            latency_ms: tick.latency_ms,
            created_at: SystemTime::now(),
            disabled: false,
        };

        // Dropping `tx` without commit rolls both writes back
        let tx = conn.transaction().await?;

        tx.execute(
            "INSERT INTO ticks (id, target_id, validator_id, status, latency_ms, created_at, disabled) VALUES (?, ?, ?, ?, ?, ?, 0)",
            params![
                tick.id.clone(),
                tick.target_id.clone(),
                tick.validator_id.clone(),
                tick.outcome.to_string(),
                to_sql_int(tick.latency_ms),
                unix_now()
            ],
        )
        .await?;

        let updated = tx
            .execute(
                "UPDATE validators SET pending_reward = pending_reward + ? WHERE id = ?",
                params![to_sql_int(reward), tick.validator_id.clone()],
            )
            .await?;
        if updated != 1 {
            bail!("validator {} not found, tick discarded", tick.validator_id);
        }

        tx.commit().await?;
        Ok(tick)
    }
}
