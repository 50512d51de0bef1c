//! Shared helpers for the TomChain workspace.

pub mod logging;
pub mod time;

pub use logging::init_tracing;
pub use time::now_millis;
