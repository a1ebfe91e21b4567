//! Configuration shared between the intake and delivery sides.

pub mod timeouts;

pub use timeouts::{ClientTimeouts, ServerTimeouts, TimeoutConfig};
