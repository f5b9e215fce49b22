//! Periodic fan-out of check requests.
//!
//! Every tick sends one request per (active target, admitted validator) pair.
//! Nothing waits for replies: each request leaves a continuation in the
//! callback table, which the receiving session resolves whenever the reply
//! shows up.

use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::callbacks::{CallbackTable, PendingCallback};
use super::registry::{ConnectedValidator, ValidatorRegistry};
use super::storage::{HubStorage, MonitoredTarget, NewTick};
use crate::config::DispatchConfig;
use crate::crypto::{verify, Challenge};
use crate::protocol::{CheckReply, CheckRequest, ValidatorBound};

/// Counts from one dispatch tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub targets: usize,
    pub validators: usize,
    pub dispatched: usize,
    pub send_failures: usize,
}

/// What the hub expects a reply to attest, fixed at dispatch time
#[derive(Debug, Clone)]
struct Expectation {
    correlation_id: String,
    validator_id: String,
    public_key: String,
    target_id: String,
}

pub struct Dispatcher {
    storage: Arc<dyn HubStorage>,
    registry: Arc<ValidatorRegistry>,
    callbacks: Arc<CallbackTable>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        storage: Arc<dyn HubStorage>,
        registry: Arc<ValidatorRegistry>,
        callbacks: Arc<CallbackTable>,
        config: DispatchConfig,
    ) -> Self {
        Self { storage, registry, callbacks, config }
    }

    /// Run one dispatch round
    pub async fn dispatch_tick(&self) -> anyhow::Result<TickSummary> {
        let targets = self.storage.list_active_targets().await?;
        let validators = self.registry.snapshot().await;

        let mut summary = TickSummary {
            targets: targets.len(),
            validators: validators.len(),
            ..TickSummary::default()
        };

        let deadline = Instant::now() + self.config.callback_ttl();

        for target in &targets {
            for validator in &validators {
                if self.dispatch_one(target, validator, deadline).await {
                    summary.dispatched += 1;
                } else {
                    summary.send_failures += 1;
                }
            }
        }

        Ok(summary)
    }

    async fn dispatch_one(
        &self,
        target: &MonitoredTarget,
        validator: &ConnectedValidator,
        deadline: Instant,
    ) -> bool {
        let correlation_id = Uuid::new_v4().to_string();
        let expectation = Expectation {
            correlation_id: correlation_id.clone(),
            validator_id: validator.validator_id.clone(),
            public_key: validator.public_key.clone(),
            target_id: target.id.clone(),
        };

        let storage = self.storage.clone();
        let reward = self.config.reward_per_check;
        let callback = PendingCallback::new(
            validator.validator_id.clone(),
            target.id.clone(),
            deadline,
            Box::new(move |reply| accept_reply(storage, reward, expectation, reply).boxed()),
        );

        if let Err(e) = self.callbacks.register(correlation_id.clone(), callback).await {
            error!(validator_id = %validator.validator_id, "Failed to register check request: {e}");
            return false;
        }

        debug!(
            validator_id = %validator.validator_id,
            target_id = %target.id,
            %correlation_id,
            "Sending check request"
        );

        let request = ValidatorBound::CheckRequest(CheckRequest {
            target_id: target.id.clone(),
            target_url: target.url.clone(),
            correlation_id: correlation_id.clone(),
        });

        match validator.handle.send(request) {
            Ok(()) => true,
            Err(e) => {
                // The validator is unreachable; the target was never probed
                warn!(
                    validator_id = %validator.validator_id,
                    target_id = %target.id,
                    %correlation_id,
                    error = %e,
                    "Validator connection closed, check request not sent"
                );
                self.callbacks.withdraw(&correlation_id).await;
                false
            }
        }
    }

    /// Dispatch on the configured period until the task is aborted
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let period: Duration = self.config.period();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                match self.dispatch_tick().await {
                    Ok(summary) => info!(
                        targets = summary.targets,
                        validators = summary.validators,
                        dispatched = summary.dispatched,
                        send_failures = summary.send_failures,
                        "Dispatch tick complete"
                    ),
                    Err(e) => error!("Dispatch tick skipped, could not list targets: {e:#}"),
                }
            }
        })
    }
}

/// Verify a reply and record it together with the validator's reward.
///
/// Attribution comes from the dispatch context and the key that verified the
/// signature, never from the ids the reply claims.
async fn accept_reply(
    storage: Arc<dyn HubStorage>,
    reward: u64,
    expected: Expectation,
    reply: CheckReply,
) {
    let challenge = Challenge::Reply { correlation_id: &expected.correlation_id };
    if !verify(&challenge, &expected.public_key, &reply.signature) {
        debug!(
            correlation_id = %expected.correlation_id,
            validator_id = %expected.validator_id,
            "Discarding reply with invalid signature"
        );
        return;
    }

    if reply.validator_id != expected.validator_id || reply.target_id != expected.target_id {
        debug!(
            correlation_id = %expected.correlation_id,
            claimed_validator = %reply.validator_id,
            claimed_target = %reply.target_id,
            "Reply claims differ from dispatch context, using dispatch context"
        );
    }

    let tick = NewTick {
        target_id: expected.target_id,
        validator_id: expected.validator_id,
        outcome: reply.outcome,
        latency_ms: reply.latency_millis,
    };

    match storage.record_check(tick, reward).await {
        Ok(tick) => debug!(
            tick_id = %tick.id,
            validator_id = %tick.validator_id,
            target_id = %tick.target_id,
            outcome = %tick.outcome,
            latency_ms = tick.latency_ms,
            "Recorded attested check"
        ),
        Err(e) => error!(
            correlation_id = %expected.correlation_id,
            "Failed to record attested check, nothing was written: {e:#}"
        ),
    }
}
