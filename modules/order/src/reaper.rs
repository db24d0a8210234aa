//! Timeout reaper: consumes the topic the delay scheduler re-emits into and
//! cancels orders that are still unpaid past their deadline.

use crate::domain::{OrderRepository, OrderState, OrderTimeoutCheck};
use crate::ports::{CallContext, InventoryService};
use async_trait::async_trait;
use message_log::harness::{HandlerError, RecordHandler};
use message_log::headers::{BusinessContext, TraceContext};
use message_log::Record;
use std::sync::Arc;

pub struct TimeoutReaperHandler {
    repo: Arc<dyn OrderRepository>,
    inventory: Arc<dyn InventoryService>,
}

impl TimeoutReaperHandler {
    pub fn new(repo: Arc<dyn OrderRepository>, inventory: Arc<dyn InventoryService>) -> Self {
        Self { repo, inventory }
    }
}

#[async_trait]
impl RecordHandler for TimeoutReaperHandler {
    fn name(&self) -> &str {
        "order-timeout-reaper"
    }

    async fn handle(&self, record: &Record) -> Result<(), HandlerError> {
        let event: OrderTimeoutCheck = serde_json::from_slice(&record.payload)
            .map_err(|e| HandlerError::fatal("MalformedPayload", e.to_string()))?;

        let trace = TraceContext::extract_or_root(&record.headers);
        // The releases must not be cut short by any inherited deadline.
        let call = CallContext::new(trace, BusinessContext::new()).detached();

        let order = self
            .repo
            .find(&event.order_id)
            .await
            .map_err(|e| HandlerError::retryable(e.class(), e.to_string()))?;
        let Some(mut order) = order else {
            return Err(HandlerError::fatal(
                "UnknownOrder",
                format!("timeout check for unknown order {}", event.order_id),
            ));
        };

        match order.state {
            OrderState::PendingPayment => {
                tracing::warn!(
                    order_id = %order.id,
                    trace_id = %call.trace.trace_id,
                    "order unpaid past deadline; releasing resources and cancelling"
                );

                // Release is idempotent on the service side, so a redelivered
                // event replays these calls harmlessly.
                for item_id in &event.items {
                    self.inventory
                        .release(&call, item_id, &event.order_id)
                        .await
                        .map_err(|e| HandlerError::retryable(e.class(), e.to_string()))?;
                }

                order
                    .cancel()
                    .map_err(|e| HandlerError::fatal(e.class(), e.to_string()))?;
                self.repo
                    .save(&order)
                    .await
                    .map_err(|e| HandlerError::retryable(e.class(), e.to_string()))?;

                tracing::info!(order_id = %order.id, "order cancelled by timeout reaper");
                Ok(())
            }
            OrderState::Paid | OrderState::Cancelled | OrderState::Failed => {
                tracing::info!(
                    order_id = %order.id,
                    state = %order.state,
                    "timeout check is a no-op for settled order"
                );
                Ok(())
            }
            // The saga has not settled this order yet; let the retry ladder
            // look again after the saga deadline has had a chance to pass.
            OrderState::Created | OrderState::Validating => Err(HandlerError::retryable(
                "OrderNotSettled",
                format!("order {} still {}", order.id, order.state),
            )),
        }
    }
}
