//! # Delay Scheduler
//!
//! Polling-based timed-message dispatcher over the message log. Each
//! configured delay level owns one intake topic and one poller task; messages
//! carry a `real-topic` header naming their destination and are re-emitted
//! there once due, FIFO per level, with trace context preserved end-to-end.

pub mod config;
pub mod health;
pub mod poller;

pub use config::Config;
pub use poller::{DelayLevel, LevelMode, LevelPoller};
