use crate::error::OrderError;
use crate::saga::{Deps, SagaRun, SagaStep};
use async_trait::async_trait;

/// Step 5: transition to PENDING_PAYMENT, persist, then schedule the
/// payment-timeout check.
///
/// A scheduler enqueue failure is logged and swallowed: the order has already
/// been placed, and a missing timeout check is the lesser harm compared to
/// failing a placed order.
pub struct PlaceOrder;

#[async_trait]
impl SagaStep for PlaceOrder {
    fn name(&self) -> &'static str {
        "place-order"
    }

    async fn run(&self, deps: &Deps, run: &mut SagaRun) -> Result<(), OrderError> {
        run.order.mark_pending_payment()?;
        deps.repo.save(&run.order).await?;

        if let Err(e) = deps
            .scheduler
            .schedule_payment_timeout(&run.call, &run.order)
            .await
        {
            tracing::error!(
                order_id = %run.order.id,
                error = %e,
                "failed to schedule payment timeout; order stays placed"
            );
        }

        Ok(())
    }
}
