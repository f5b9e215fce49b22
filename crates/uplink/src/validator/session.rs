//! Validator side of the hub connection.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::executor::ProbeExecutor;
use crate::crypto::{sign, Challenge, KeyPair};
use crate::protocol::{self, CheckRequest, HubBound, SignupAck, SignupRequest, ValidatorBound};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatorState {
    Connecting,
    /// Signup sent, waiting for the ack carrying `correlation_id`
    Handshaking { correlation_id: String },
    Admitted { validator_id: String },
    Closed,
}

pub struct ValidatorSession {
    executor: Arc<ProbeExecutor>,
    keypair: Arc<KeyPair>,
    origin_address: String,
    outbound: mpsc::Sender<HubBound>,
    state: ValidatorState,
}

impl ValidatorSession {
    pub fn new(
        executor: Arc<ProbeExecutor>,
        keypair: Arc<KeyPair>,
        origin_address: String,
        outbound: mpsc::Sender<HubBound>,
    ) -> Self {
        Self { executor, keypair, origin_address, outbound, state: ValidatorState::Connecting }
    }

    pub fn state(&self) -> &ValidatorState {
        &self.state
    }

    /// Build the signed signup for a freshly opened connection
    pub fn begin_handshake(&mut self) -> HubBound {
        let correlation_id = Uuid::new_v4().to_string();
        let public_key = self.keypair.public_key_hex();
        let signature = sign(
            &Challenge::Signup { correlation_id: &correlation_id, public_key: &public_key },
            &self.keypair,
        );

        self.state = ValidatorState::Handshaking { correlation_id: correlation_id.clone() };

        HubBound::Signup(SignupRequest {
            public_key,
            origin_address: self.origin_address.clone(),
            signature,
            correlation_id,
        })
    }

    /// Handle one inbound text frame. Malformed frames are dropped.
    pub async fn on_frame(&mut self, frame: &str) {
        if self.state == ValidatorState::Closed {
            return;
        }

        let message: ValidatorBound = match protocol::decode(frame) {
            Ok(message) => message,
            Err(e) => {
                debug!("Discarding frame from hub: {e}");
                return;
            }
        };

        match message {
            ValidatorBound::SignupAck(ack) => self.on_signup_ack(ack),
            ValidatorBound::CheckRequest(request) => self.on_check_request(request),
        }
    }

    fn on_signup_ack(&mut self, ack: SignupAck) {
        let expected = matches!(
            &self.state,
            ValidatorState::Handshaking { correlation_id } if *correlation_id == ack.correlation_id
        );
        if !expected {
            debug!(correlation_id = %ack.correlation_id, "Ignoring unexpected signup ack");
            return;
        }

        info!(validator_id = %ack.validator_id, "Admitted by hub");
        self.state = ValidatorState::Admitted { validator_id: ack.validator_id };
    }

    /// Probe on a separate task so slow targets never hold up the connection
    fn on_check_request(&mut self, request: CheckRequest) {
        let ValidatorState::Admitted { validator_id } = &self.state else {
            debug!(
                correlation_id = %request.correlation_id,
                "Ignoring check request before admission"
            );
            return;
        };

        info!(url = %request.target_url, "Starting check");

        let executor = self.executor.clone();
        let outbound = self.outbound.clone();
        let validator_id = validator_id.clone();
        tokio::spawn(async move {
            let reply = executor.execute(request, &validator_id).await;
            if outbound.send(HubBound::CheckReply(reply)).await.is_err() {
                warn!("Connection to hub closed before check reply could be sent");
            }
        });
    }

    pub fn close(&mut self) {
        self.state = ValidatorState::Closed;
    }
}
