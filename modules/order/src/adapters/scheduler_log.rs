use crate::domain::{Order, OrderTimeoutCheck};
use crate::error::OrderError;
use crate::ports::{CallContext, PaymentTimeoutScheduler};
use async_trait::async_trait;
use chrono::Utc;
use message_log::headers::HEADER_REAL_TOPIC;
use message_log::MessageLog;
use std::collections::HashMap;
use std::sync::Arc;

/// Schedules payment-timeout checks by producing into a fixed-delay level of
/// the delay scheduler. The level's duration is chosen at deployment time to
/// match the payment deadline; the message itself only names its destination.
/// Keyed by order id so redeliveries of one order stay ordered.
pub struct LogTimeoutScheduler {
    log: Arc<dyn MessageLog>,
    delay_topic: String,
    timeout_topic: String,
}

impl LogTimeoutScheduler {
    pub fn new(
        log: Arc<dyn MessageLog>,
        delay_topic: impl Into<String>,
        timeout_topic: impl Into<String>,
    ) -> Self {
        Self {
            log,
            delay_topic: delay_topic.into(),
            timeout_topic: timeout_topic.into(),
        }
    }
}

#[async_trait]
impl PaymentTimeoutScheduler for LogTimeoutScheduler {
    async fn schedule_payment_timeout(
        &self,
        call: &CallContext,
        order: &Order,
    ) -> Result<(), OrderError> {
        let event = OrderTimeoutCheck {
            trace_id: call.trace.trace_id.clone(),
            order_id: order.id.clone(),
            user_id: order.user_id.clone(),
            items: order.items.clone(),
            creation_time: Utc::now(),
        };
        let payload = serde_json::to_vec(&event)
            .map_err(|e| OrderError::Validation(format!("timeout event serialization: {}", e)))?;

        let mut headers = HashMap::new();
        headers.insert(
            HEADER_REAL_TOPIC.to_string(),
            self.timeout_topic.clone(),
        );
        call.trace.child().inject(&mut headers);

        self.log
            .produce(&self.delay_topic, Some(&order.id), payload, headers)
            .await
            .map_err(|e| OrderError::transport("timeout-schedule", e.to_string()))?;

        tracing::info!(
            order_id = %order.id,
            delay_topic = %self.delay_topic,
            timeout_topic = %self.timeout_topic,
            "payment timeout check scheduled"
        );
        Ok(())
    }
}
