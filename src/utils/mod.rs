//! # Utility Modules
//!
//! Supporting utilities shared by the node, the game session and the binary.
//!
//! ## Components
//! - **Metrics**: per-node atomic counters
//! - **Timeout**: default durations and async timeout wrappers
//! - **Logging**: `tracing-subscriber` setup from [`LoggingConfig`](crate::config::LoggingConfig)
//! - **Net**: local address discovery for display

pub mod logging;
pub mod metrics;
pub mod net;
pub mod timeout;
