//! In-process `HubStorage` backed by plain collections.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::SystemTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::storage::{HubStorage, MonitoredTarget, NewTick, Tick, Validator};

#[derive(Debug, Default)]
struct State {
    targets: Vec<MonitoredTarget>,
    validators: Vec<Validator>,
    ticks: Vec<Tick>,
}

/// Storage that keeps everything in memory.
///
/// A single lock covers all collections, which makes `record_check` atomic.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Mutex<State>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an active target and return its id
    pub async fn add_target(&self, url: &str) -> String {
        let target = MonitoredTarget {
            id: Uuid::new_v4().to_string(),
            url: url.to_string(),
            owner_id: "local".to_string(),
            disabled: false,
        };
        let id = target.id.clone();
        self.state.lock().await.targets.push(target);
        id
    }

    /// Insert a target as-is
    pub async fn insert_target(&self, target: MonitoredTarget) {
        self.state.lock().await.targets.push(target);
    }

    /// Insert a validator record as-is
    pub async fn insert_validator(&self, validator: Validator) {
        self.state.lock().await.validators.push(validator);
    }

    pub async fn validator(&self, id: &str) -> Option<Validator> {
        self.state.lock().await.validators.iter().find(|v| v.id == id).cloned()
    }

    pub async fn validators(&self) -> Vec<Validator> {
        self.state.lock().await.validators.clone()
    }

    pub async fn ticks(&self) -> Vec<Tick> {
        self.state.lock().await.ticks.clone()
    }

    /// Validators and ticks read under one lock
    pub async fn ledger(&self) -> (Vec<Validator>, Vec<Tick>) {
        let state = self.state.lock().await;
        (state.validators.clone(), state.ticks.clone())
    }
}

#[async_trait]
impl HubStorage for MemoryStorage {
    async fn list_active_targets(&self) -> Result<Vec<MonitoredTarget>> {
        let state = self.state.lock().await;
        Ok(state.targets.iter().filter(|t| !t.disabled).cloned().collect())
    }

    async fn find_validator_by_public_key(&self, public_key: &str) -> Result<Option<Validator>> {
        let state = self.state.lock().await;
        Ok(state.validators.iter().find(|v| v.public_key == public_key).cloned())
    }

    async fn create_validator(&self, public_key: &str, origin_address: &str) -> Result<Validator> {
        let mut state = self.state.lock().await;
        if state.validators.iter().any(|v| v.public_key == public_key) {
            bail!("validator with public key {public_key} already exists");
        }

        let validator = Validator {
            id: Uuid::new_v4().to_string(),
            public_key: public_key.to_string(),
            origin_address: origin_address.to_string(),
            location: "unknown".to_string(),
            pending_reward: 0,
        };
        state.validators.push(validator.clone());
        Ok(validator)
    }

    async fn record_check(&self, tick: NewTick, reward: u64) -> Result<Tick> {
        let mut state = self.state.lock().await;

        let Some(validator) = state.validators.iter_mut().find(|v| v.id == tick.validator_id)
        else {
            bail!("unknown validator {}", tick.validator_id);
        };
        validator.pending_reward += reward;

        let tick = Tick {
            id: Uuid::new_v4().to_string(),
            target_id: tick.target_id,
            validator_id: tick.validator_id,
            outcome: tick.outcome,
            latency_ms: tick.latency_ms,
            created_at: SystemTime::now(),
            disabled: false,
        };
        state.ticks.push(tick.clone());
        Ok(tick)
    }
}
