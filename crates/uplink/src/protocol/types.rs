//! Protocol type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a single probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckOutcome {
    Good,
    Bad,
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckOutcome::Good => write!(f, "Good"),
            CheckOutcome::Bad => write!(f, "Bad"),
        }
    }
}

impl std::str::FromStr for CheckOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Good" => Ok(CheckOutcome::Good),
            "Bad" => Ok(CheckOutcome::Bad),
            other => Err(format!("unknown check outcome: {other}")),
        }
    }
}

/// Identity handshake sent by a validator right after connecting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    /// Hex-encoded Ed25519 public key
    pub public_key: String,

    /// Address the validator reports for itself (informational)
    pub origin_address: String,

    /// Signature over the signup challenge
    pub signature: String,

    pub correlation_id: String,
}

/// Hub acknowledgement of an accepted signup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupAck {
    pub validator_id: String,
    pub correlation_id: String,
}

/// Request to probe one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    pub target_id: String,
    pub target_url: String,
    pub correlation_id: String,
}

/// Signed result of a probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckReply {
    pub correlation_id: String,

    /// Self-reported; the hub attributes the reply by verifying key instead
    pub validator_id: String,

    pub target_id: String,
    pub outcome: CheckOutcome,
    pub latency_millis: u64,

    /// Signature over the reply challenge for `correlation_id`
    pub signature: String,
}

/// Messages travelling validator -> hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum HubBound {
    Signup(SignupRequest),
    CheckReply(CheckReply),
}

/// Messages travelling hub -> validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ValidatorBound {
    SignupAck(SignupAck),
    CheckRequest(CheckRequest),
}

impl HubBound {
    /// Wire name of the variant, for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            HubBound::Signup(_) => "signup",
            HubBound::CheckReply(_) => "check-reply",
        }
    }
}

impl ValidatorBound {
    /// Wire name of the variant, for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            ValidatorBound::SignupAck(_) => "signup-ack",
            ValidatorBound::CheckRequest(_) => "check-request",
        }
    }
}
