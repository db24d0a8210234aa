//! Order-service error taxonomy.
//!
//! Four kinds, and the consumer harness routes on them:
//! - `Transport` is retryable (retry-topic ladder)
//! - `Timeout` fails the current saga and is not retried (the saga is not
//!   idempotent end to end)
//! - `Validation` is permanent (dead letter)
//! - `Reject` is a business outcome, not a defect: clean compensating
//!   unwind, no retry, no dead letter

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("transport failure in {context}: {message}")]
    Transport { context: String, message: String },

    #[error("deadline exceeded during {0}")]
    Timeout(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Reject(#[from] BusinessReject),
}

/// Clean business refusals. These abort a saga without being errors in the
/// technical sense.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusinessReject {
    #[error("product {product_id} is sold out")]
    SeckillSoldOut { product_id: String },

    #[error("user {user_id} has already purchased product {product_id}")]
    SeckillDuplicate {
        product_id: String,
        user_id: String,
    },

    #[error("fraud check refused user {user_id}")]
    FraudRefused { user_id: String },

    #[error("insufficient stock for item {item_id}")]
    InventoryInsufficient { item_id: String },
}

impl OrderError {
    pub fn transport(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn is_reject(&self) -> bool {
        matches!(self, Self::Reject(_))
    }

    /// Failure class carried into dead-letter headers.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "TransportError",
            Self::Timeout(_) => "TimeoutError",
            Self::Validation(_) => "ValidationError",
            Self::Reject(_) => "BusinessReject",
        }
    }
}
