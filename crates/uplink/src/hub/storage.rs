//! Storage collaborator required by the hub core.
//!
//! The hub never owns durable state. It reads active targets, resolves or
//! creates validator records at signup, and writes attested ticks together
//! with their reward through this trait.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::protocol::CheckOutcome;

/// A URL whose uptime validators attest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredTarget {
    pub id: String,
    pub url: String,
    pub owner_id: String,
    pub disabled: bool,
}

/// Durable validator record, outlives any single connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub id: String,
    pub public_key: String,
    pub origin_address: String,
    pub location: String,
    /// Accrued, unpaid reward
    pub pending_reward: u64,
}

/// Tick about to be recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTick {
    pub target_id: String,
    pub validator_id: String,
    pub outcome: CheckOutcome,
    pub latency_ms: u64,
}

/// Recorded check outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    pub id: String,
    pub target_id: String,
    pub validator_id: String,
    pub outcome: CheckOutcome,
    pub latency_ms: u64,
    pub created_at: SystemTime,
    pub disabled: bool,
}

/// Transactional interface the hub requires from durable storage
#[async_trait]
pub trait HubStorage: Send + Sync {
    /// All targets that are not disabled
    async fn list_active_targets(&self) -> Result<Vec<MonitoredTarget>>;

    /// Look up a validator by its hex public key
    async fn find_validator_by_public_key(&self, public_key: &str) -> Result<Option<Validator>>;

    /// Create a validator record for a first-seen public key
    async fn create_validator(&self, public_key: &str, origin_address: &str) -> Result<Validator>;

    /// Create `tick` and add `reward` to its validator's pending reward.
    ///
    /// Both writes commit together or not at all.
    async fn record_check(&self, tick: NewTick, reward: u64) -> Result<Tick>;
}
