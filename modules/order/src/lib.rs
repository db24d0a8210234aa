//! # Order Service
//!
//! Saga-based order orchestration: consumes `OrderCreationRequested` events,
//! drives fraud/seckill/inventory/pricing reservations with compensating
//! unwind, schedules payment-timeout checks through the delay scheduler and
//! reaps unpaid orders when they come due.

pub mod adapters;
pub mod config;
pub mod consumer;
pub mod domain;
pub mod error;
pub mod health;
pub mod ports;
pub mod reaper;
pub mod routes;
pub mod saga;

pub use config::Config;
pub use consumer::OrderCreationHandler;
pub use reaper::TimeoutReaperHandler;
