//! Wire contract between hub and validators.
//!
//! Every frame is a JSON text frame shaped `{ "type": ..., "data": {...} }`.
//! Messages are split by direction so each side matches exhaustively on
//! exactly the variants it can receive.

pub mod codec;
pub mod types;

pub use codec::{decode, encode, CodecError};
pub use types::{
    CheckOutcome, CheckReply, CheckRequest, HubBound, SignupAck, SignupRequest, ValidatorBound,
};
