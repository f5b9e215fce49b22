//! Process-wide tracing setup shared by the hub and validator binaries.

mod subscriber;

pub use subscriber::{init, init_with_level};
