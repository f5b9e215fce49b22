//! Challenge strings that signatures are computed over.
//!
//! Each variant renders a distinct, human-readable sentence containing the
//! correlation id, so a signature produced for one purpose never verifies
//! for another.

use std::fmt;

/// Message a validator signs to attest an action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Challenge<'a> {
    /// Identity handshake binding a correlation id to the claimed public key
    Signup { correlation_id: &'a str, public_key: &'a str },
    /// Check reply binding the correlation id of the dispatched request
    Reply { correlation_id: &'a str },
}

impl Challenge<'_> {
    /// Render the exact string that is signed and verified
    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Challenge<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Challenge::Signup { correlation_id, public_key } => {
                write!(f, "Signed message for {correlation_id} with {public_key}")
            }
            Challenge::Reply { correlation_id } => {
                write!(f, "Replying to callback id : {correlation_id}")
            }
        }
    }
}
