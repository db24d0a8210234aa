//! Order-creation consumer: bridges the `order-creation` topic into the saga
//! orchestrator through the resilient harness.

use crate::domain::OrderCreationRequested;
use crate::error::OrderError;
use crate::ports::CallContext;
use crate::saga::Orchestrator;
use async_trait::async_trait;
use message_log::harness::{HandlerError, RecordHandler};
use message_log::headers::{BusinessContext, TraceContext};
use message_log::Record;
use std::sync::Arc;

pub struct OrderCreationHandler {
    orchestrator: Arc<Orchestrator>,
}

impl OrderCreationHandler {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl RecordHandler for OrderCreationHandler {
    fn name(&self) -> &str {
        "order-creation"
    }

    async fn handle(&self, record: &Record) -> Result<(), HandlerError> {
        let event: OrderCreationRequested = serde_json::from_slice(&record.payload)
            .map_err(|e| HandlerError::fatal("MalformedPayload", e.to_string()))?;

        // Prefer the header pair; fall back to the payload's trace id so a
        // producer that only filled the body still joins one lineage.
        let trace = TraceContext::extract(&record.headers).unwrap_or_else(|| {
            if event.trace_id.is_empty() {
                TraceContext::new_root()
            } else {
                TraceContext {
                    trace_id: event.trace_id.clone(),
                    span_id: uuid::Uuid::new_v4().simple().to_string(),
                }
            }
        });
        let business = BusinessContext::extract(&record.headers);
        let call = CallContext::new(trace, business);
        let order_id = event.event_id.clone();

        match self.orchestrator.process(event, call).await {
            Ok(order) => {
                tracing::info!(order_id = %order.id, state = %order.state, "order placed");
                Ok(())
            }
            // The saga already unwound and recorded FAILED; rejection is a
            // final business outcome, not something the ladder can fix.
            Err(OrderError::Reject(reason)) => Err(HandlerError::reject(reason.to_string())),
            // A timed-out saga has also fully unwound. The pipeline is not
            // idempotent end to end (the gate would read a replay as a
            // duplicate), so the event is not retried either.
            Err(OrderError::Timeout(what)) => {
                tracing::warn!(order_id = %order_id, deadline = %what, "saga timed out; order failed");
                Ok(())
            }
            Err(e @ OrderError::Transport { .. }) => {
                Err(HandlerError::retryable(e.class(), e.to_string()))
            }
            Err(e @ OrderError::Validation(_)) => Err(HandlerError::fatal(e.class(), e.to_string())),
        }
    }
}
