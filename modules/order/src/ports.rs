//! Outbound ports of the order service. Adapters live in `crate::adapters`;
//! the saga only ever sees these traits.

use crate::domain::Order;
use crate::error::OrderError;
use async_trait::async_trait;
use message_log::headers::{BusinessContext, TraceContext};

/// Per-call propagation bundle: trace lineage plus the business-context
/// channel. The two ride as distinct header sets on every outbound hop.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub trace: TraceContext,
    pub business: BusinessContext,
}

impl CallContext {
    pub fn new(trace: TraceContext, business: BusinessContext) -> Self {
        Self { trace, business }
    }

    pub fn root() -> Self {
        Self::new(TraceContext::new_root(), BusinessContext::new())
    }

    /// Context for compensation work: same trace lineage, same business
    /// values, no inherited deadline.
    pub fn detached(&self) -> Self {
        Self {
            trace: self.trace.detached(),
            business: self.business.clone(),
        }
    }
}

/// Verdict of one seckill admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeckillVerdict {
    Granted,
    SoldOut,
    Duplicate,
}

/// Synchronous fraud screen. Refusal is a business reject, not an error.
#[async_trait]
pub trait FraudService: Send + Sync {
    async fn check(
        &self,
        call: &CallContext,
        user_id: &str,
        items: &[String],
    ) -> Result<(), OrderError>;
}

/// Per-item stock reservation. `release` is idempotent and safe to replay.
#[async_trait]
pub trait InventoryService: Send + Sync {
    async fn reserve(
        &self,
        call: &CallContext,
        item_id: &str,
        quantity: u32,
        user_id: &str,
        order_id: &str,
    ) -> Result<(), OrderError>;

    async fn release(
        &self,
        call: &CallContext,
        item_id: &str,
        order_id: &str,
    ) -> Result<(), OrderError>;
}

/// Price calculation. The adapter routes to the promotion service when the
/// business-context channel carries a promotion id.
#[async_trait]
pub trait PricingService: Send + Sync {
    async fn calculate_price(
        &self,
        call: &CallContext,
        user_id: &str,
        is_vip: bool,
    ) -> Result<f64, OrderError>;
}

#[async_trait]
pub trait ShippingService: Send + Sync {
    async fn quote(&self, call: &CallContext) -> Result<f64, OrderError>;
}

/// Atomic flash-sale admission against the shared store.
#[async_trait]
pub trait SeckillGate: Send + Sync {
    /// One linearized round-trip: duplicate check, stock check, decrement
    /// plus buyer record.
    async fn attempt(&self, product_id: &str, user_id: &str) -> Result<SeckillVerdict, OrderError>;

    /// Compensation for a granted attempt. Idempotent; invoked at most once
    /// per grant.
    async fn cancel(&self, product_id: &str, user_id: &str) -> Result<(), OrderError>;

    /// Admin path: set the stock counter and clear the buyer set.
    async fn prepare(&self, product_id: &str, stock: i64) -> Result<(), OrderError>;
}

/// Enqueues the payment-timeout check into the delay scheduler's intake.
#[async_trait]
pub trait PaymentTimeoutScheduler: Send + Sync {
    async fn schedule_payment_timeout(
        &self,
        call: &CallContext,
        order: &Order,
    ) -> Result<(), OrderError>;
}

/// Fire-and-forget user notifications.
#[async_trait]
pub trait NotificationProducer: Send + Sync {
    async fn order_created(&self, call: &CallContext, order: &Order) -> Result<(), OrderError>;
}
