//! Runs one check request: probe, classify, sign.

use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

use super::probe::Prober;
use crate::crypto::{sign, Challenge, KeyPair};
use crate::protocol::{CheckOutcome, CheckReply, CheckRequest};

/// Status code counted as a healthy target
const SUCCESS_STATUS: u16 = 200;

/// Probes targets and signs the results
pub struct ProbeExecutor {
    prober: Arc<dyn Prober>,
    keypair: Arc<KeyPair>,
}

impl ProbeExecutor {
    pub fn new(prober: Arc<dyn Prober>, keypair: Arc<KeyPair>) -> Self {
        Self { prober, keypair }
    }

    /// Probe `url` once and classify it.
    ///
    /// A response other than 200 is `Bad` with its real latency; a transport
    /// failure is `Bad` with latency 0.
    pub async fn probe(&self, url: &str) -> (CheckOutcome, u64) {
        let start = Instant::now();

        match self.prober.fetch(url).await {
            Ok(status) => {
                let latency = start.elapsed().as_millis() as u64;
                let outcome =
                    if status == SUCCESS_STATUS { CheckOutcome::Good } else { CheckOutcome::Bad };
                debug!(url, status, latency, %outcome, "Probe completed");
                (outcome, latency)
            }
            Err(e) => {
                debug!(url, "Probe failed: {e:#}");
                (CheckOutcome::Bad, 0)
            }
        }
    }

    /// Probe the requested target and build the signed reply
    pub async fn execute(&self, request: CheckRequest, validator_id: &str) -> CheckReply {
        let (outcome, latency_millis) = self.probe(&request.target_url).await;
        let signature =
            sign(&Challenge::Reply { correlation_id: &request.correlation_id }, &self.keypair);

        CheckReply {
            correlation_id: request.correlation_id,
            validator_id: validator_id.to_string(),
            target_id: request.target_id,
            outcome,
            latency_millis,
            signature,
        }
    }
}
