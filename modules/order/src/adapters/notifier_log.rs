use crate::domain::{NotificationEvent, Order};
use crate::error::OrderError;
use crate::ports::{CallContext, NotificationProducer};
use async_trait::async_trait;
use message_log::MessageLog;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Publishes user notifications to the notifications topic, keyed by user id.
pub struct LogNotificationProducer {
    log: Arc<dyn MessageLog>,
    topic: String,
    payment_timeout: Duration,
}

impl LogNotificationProducer {
    pub fn new(
        log: Arc<dyn MessageLog>,
        topic: impl Into<String>,
        payment_timeout: Duration,
    ) -> Self {
        Self {
            log,
            topic: topic.into(),
            payment_timeout,
        }
    }
}

#[async_trait]
impl NotificationProducer for LogNotificationProducer {
    async fn order_created(&self, call: &CallContext, order: &Order) -> Result<(), OrderError> {
        let message = match &order.promo_id {
            Some(promo_id) => format!(
                "Your VIP promotion order ({}) has been successfully created!",
                promo_id
            ),
            None => format!(
                "Your order {} is waiting for payment. Please complete it within {}s.",
                order.id,
                self.payment_timeout.as_secs()
            ),
        };

        let event = NotificationEvent {
            user_id: order.user_id.clone(),
            message,
            promotion_id: order.promo_id.clone(),
        };
        let payload = serde_json::to_vec(&event)
            .map_err(|e| OrderError::Validation(format!("notification serialization: {}", e)))?;

        let mut headers = HashMap::new();
        call.trace.child().inject(&mut headers);

        self.log
            .produce(&self.topic, Some(&order.user_id), payload, headers)
            .await
            .map_err(|e| OrderError::transport("notification-publish", e.to_string()))
    }
}
