use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Published when a user asks to place an order. Consumed by the saga
/// orchestrator from the `order-creation` topic, keyed by user id.
///
/// `event_id` doubles as the order id: a producer-side retry carries the same
/// event id and therefore upserts the same order row instead of creating a
/// second one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreationRequested {
    pub trace_id: String,
    pub user_id: String,
    pub is_vip: bool,
    pub items: Vec<String>,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promo_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seckill_product_id: Option<String>,
    pub event_id: String,
}

/// Scheduled into a delay level when an order reaches PENDING_PAYMENT;
/// surfaces on the `order-timeout-check` topic once the payment deadline has
/// elapsed. Keyed by order id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTimeoutCheck {
    pub trace_id: String,
    pub order_id: String,
    pub user_id: String,
    pub items: Vec<String>,
    pub creation_time: DateTime<Utc>,
}

/// Fire-and-forget user notification on the `notifications` topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub user_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_creation_event_json_shape() {
        let event = OrderCreationRequested {
            trace_id: "t1".to_string(),
            user_id: "U1".to_string(),
            is_vip: true,
            items: vec!["A".to_string(), "B".to_string()],
            quantity: 1,
            promo_id: None,
            seckill_product_id: Some("P1".to_string()),
            event_id: "e-1".to_string(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["traceId"], "t1");
        assert_eq!(json["isVip"], true);
        assert_eq!(json["seckillProductId"], "P1");
        assert_eq!(json["eventId"], "e-1");
        assert!(json.get("promoId").is_none());
    }

    #[test]
    fn optional_fields_default_when_absent() {
        let event: OrderCreationRequested = serde_json::from_str(
            r#"{"traceId":"t","userId":"U1","isVip":false,"items":["A"],"quantity":2,"eventId":"e"}"#,
        )
        .unwrap();
        assert!(event.promo_id.is_none());
        assert!(event.seckill_product_id.is_none());
    }
}
