//! # Order Saga
//!
//! A per-order pipeline of steps, each of which may register a compensation
//! before reporting success. Steps execute strictly in sequence under one
//! processing deadline; the first failure (or the deadline) stops the
//! pipeline and unwinds the compensation stack in LIFO order on a detached
//! context.
//!
//! The step sequence is an explicit array, which keeps the order visible in
//! one place and trivially reorderable in tests:
//!
//! 1. fraud check (no side effect, no compensation)
//! 2. seckill gate (skipped without a seckill product; grant registers a
//!    cancel)
//! 3. per-item inventory reservation (each success registers a release)
//! 4. pricing + shipping fan-out (concurrent, errors aggregated, no
//!    compensation)
//! 5. persist PENDING_PAYMENT + schedule the payment-timeout check
//! 6. fire-and-forget notification

mod compensation;
mod fraud;
mod inventory;
mod notify;
mod persist;
mod pricing;
mod seckill;

pub use compensation::{Compensation, CompensationStack};
pub use fraud::FraudCheck;
pub use inventory::ReserveInventory;
pub use notify::NotifyUser;
pub use persist::PlaceOrder;
pub use pricing::PriceAndShip;
pub use seckill::SeckillAdmission;

use crate::domain::{Order, OrderCreationRequested, OrderRepository};
use crate::error::OrderError;
use crate::ports::{
    CallContext, FraudService, InventoryService, NotificationProducer, PaymentTimeoutScheduler,
    PricingService, SeckillGate, ShippingService,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Everything the steps call out to. Constructed once at wiring time and
/// shared by every saga run.
pub struct Deps {
    pub repo: Arc<dyn OrderRepository>,
    pub fraud: Arc<dyn FraudService>,
    pub gate: Arc<dyn SeckillGate>,
    pub inventory: Arc<dyn InventoryService>,
    pub pricing: Arc<dyn PricingService>,
    pub shipping: Arc<dyn ShippingService>,
    pub scheduler: Arc<dyn PaymentTimeoutScheduler>,
    pub notifier: Arc<dyn NotificationProducer>,
}

/// Mutable state of one saga run: the aggregate, the propagation contexts
/// and the compensation stack. Owned by the task driving the run.
pub struct SagaRun {
    pub order: Order,
    pub call: CallContext,
    pub compensations: CompensationStack,
}

/// One pipeline step.
#[async_trait]
pub trait SagaStep: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self, deps: &Deps, run: &mut SagaRun) -> Result<(), OrderError>;
}

/// Drives the step pipeline for each incoming order event.
pub struct Orchestrator {
    deps: Arc<Deps>,
    steps: Vec<Box<dyn SagaStep>>,
    processing_deadline: Duration,
}

impl Orchestrator {
    pub fn new(deps: Arc<Deps>, processing_deadline: Duration) -> Self {
        Self::with_steps(
            deps,
            processing_deadline,
            vec![
                Box::new(FraudCheck),
                Box::new(SeckillAdmission),
                Box::new(ReserveInventory),
                Box::new(PriceAndShip),
                Box::new(PlaceOrder),
                Box::new(NotifyUser),
            ],
        )
    }

    /// Construct with an explicit step sequence. Production wiring uses
    /// [`Orchestrator::new`]; this exists so tests can shrink or reorder the
    /// pipeline.
    pub fn with_steps(
        deps: Arc<Deps>,
        processing_deadline: Duration,
        steps: Vec<Box<dyn SagaStep>>,
    ) -> Self {
        Self {
            deps,
            steps,
            processing_deadline,
        }
    }

    /// Run the full saga for one creation event.
    ///
    /// On success the returned order is PENDING_PAYMENT. On failure the
    /// compensation stack has been unwound, the order has been marked FAILED
    /// and the original failure is returned for the consumer to classify.
    pub async fn process(
        &self,
        event: OrderCreationRequested,
        call: CallContext,
    ) -> Result<Order, OrderError> {
        let mut order = Order::from_event(&event)?;

        // Record the accepted request before doing any work; an upsert, so
        // redelivery of the same event id lands on the same row.
        self.deps.repo.save(&order).await?;
        order.mark_validating()?;
        self.deps.repo.save(&order).await?;

        tracing::info!(
            order_id = %order.id,
            user_id = %order.user_id,
            trace_id = %call.trace.trace_id,
            "starting verification and reservation pipeline"
        );

        let compensations = CompensationStack::new();
        let mut run = SagaRun {
            order,
            call: call.clone(),
            compensations: compensations.clone(),
        };

        let outcome = tokio::time::timeout(self.processing_deadline, async {
            for step in &self.steps {
                tracing::debug!(order_id = %run.order.id, step = step.name(), "saga step starting");
                step.run(&self.deps, &mut run).await.map_err(|e| {
                    tracing::warn!(
                        order_id = %run.order.id,
                        step = step.name(),
                        error = %e,
                        "saga step failed"
                    );
                    e
                })?;
            }
            Ok(())
        })
        .await;

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(_) => Some(OrderError::Timeout(format!(
                "order processing exceeded {:?}",
                self.processing_deadline
            ))),
        };

        let mut order = run.order;
        match failure {
            None => {
                tracing::info!(
                    order_id = %order.id,
                    state = %order.state,
                    "all resources reserved; order is pending payment"
                );
                Ok(order)
            }
            Some(e) => {
                // Unwind on the original call so the compensations share the
                // trace; each thunk detaches its own deadline-free context.
                let executed = compensations.unwind(&call).await;
                tracing::warn!(
                    order_id = %order.id,
                    error = %e,
                    compensations = executed,
                    "saga failed; compensations executed"
                );

                order.mark_failed();
                if let Err(save_err) = self.deps.repo.save(&order).await {
                    tracing::error!(
                        order_id = %order.id,
                        error = %save_err,
                        "failed to record FAILED state after compensation"
                    );
                }
                Err(e)
            }
        }
    }
}
