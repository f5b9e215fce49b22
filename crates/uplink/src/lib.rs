//! Uplink - attested hub/validator coordination for distributed uptime checks
//!
//! A central hub dispatches check requests to independent validators over
//! persistent WebSocket connections. Validators prove their identity by
//! signing a handshake challenge and sign every check result they return, so
//! the hub only records work it can attribute to a verified key.

pub mod config;
pub mod crypto;
pub mod hub;
pub mod protocol;
pub mod validator;

// Re-export main types
pub use config::{HubConfig, ValidatorConfig};
pub use crypto::{Challenge, KeyPair};
pub use hub::Hub;
pub use protocol::{CheckOutcome, HubBound, ValidatorBound};
pub use validator::ValidatorNode;

/// Re-export common error types
pub use anyhow;

/// Uplink result type using anyhow for error handling
pub type Result<T> = anyhow::Result<T>;

/// Default port the hub listens on for validator connections
pub const DEFAULT_HUB_PORT: u16 = 8081;

/// Default reward accrued per accepted check
pub const DEFAULT_REWARD_PER_CHECK: u64 = 100;
