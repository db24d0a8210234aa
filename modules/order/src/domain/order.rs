use crate::domain::events::OrderCreationRequested;
use crate::domain::state::OrderState;
use crate::error::OrderError;
use chrono::{DateTime, Utc};

/// The order aggregate root. Owned exclusively by the saga task that is
/// processing it; the timeout reaper acquires it read+transition only.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub is_vip: bool,
    pub items: Vec<String>,
    pub quantity: u32,
    pub promo_id: Option<String>,
    pub seckill_product_id: Option<String>,
    pub state: OrderState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Build a fresh aggregate from a creation event. The event id becomes
    /// the order id.
    pub fn from_event(event: &OrderCreationRequested) -> Result<Self, OrderError> {
        if event.event_id.is_empty() || event.user_id.is_empty() || event.items.is_empty() {
            return Err(OrderError::Validation(
                "order event requires eventId, userId and at least one item".to_string(),
            ));
        }
        if event.quantity == 0 {
            return Err(OrderError::Validation(
                "order quantity must be at least 1".to_string(),
            ));
        }

        let now = Utc::now();
        Ok(Self {
            id: event.event_id.clone(),
            user_id: event.user_id.clone(),
            is_vip: event.is_vip,
            items: event.items.clone(),
            quantity: event.quantity,
            promo_id: normalize(event.promo_id.as_deref()),
            seckill_product_id: normalize(event.seckill_product_id.as_deref()),
            state: OrderState::Created,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn mark_validating(&mut self) -> Result<(), OrderError> {
        if self.state != OrderState::Created {
            return Err(self.illegal_transition(OrderState::Validating));
        }
        self.transition(OrderState::Validating);
        Ok(())
    }

    pub fn mark_pending_payment(&mut self) -> Result<(), OrderError> {
        if self.state != OrderState::Created && self.state != OrderState::Validating {
            return Err(self.illegal_transition(OrderState::PendingPayment));
        }
        self.transition(OrderState::PendingPayment);
        Ok(())
    }

    pub fn pay(&mut self) -> Result<(), OrderError> {
        if self.state != OrderState::PendingPayment {
            return Err(self.illegal_transition(OrderState::Paid));
        }
        self.transition(OrderState::Paid);
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), OrderError> {
        if self.state != OrderState::PendingPayment {
            return Err(self.illegal_transition(OrderState::Cancelled));
        }
        self.transition(OrderState::Cancelled);
        Ok(())
    }

    /// Any non-terminal order may fail.
    pub fn mark_failed(&mut self) {
        self.transition(OrderState::Failed);
    }

    fn transition(&mut self, to: OrderState) {
        self.state = to;
        self.updated_at = Utc::now();
    }

    fn illegal_transition(&self, to: OrderState) -> OrderError {
        OrderError::Validation(format!(
            "order {} cannot move from {} to {}",
            self.id, self.state, to
        ))
    }
}

fn normalize(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> OrderCreationRequested {
        OrderCreationRequested {
            trace_id: "t".to_string(),
            user_id: "U1".to_string(),
            is_vip: false,
            items: vec!["A".to_string()],
            quantity: 1,
            promo_id: Some("".to_string()),
            seckill_product_id: None,
            event_id: "order-1".to_string(),
        }
    }

    #[test]
    fn event_id_becomes_order_id() {
        let order = Order::from_event(&event()).unwrap();
        assert_eq!(order.id, "order-1");
        assert_eq!(order.state, OrderState::Created);
        // Empty strings collapse to None so "no promotion" has one spelling.
        assert!(order.promo_id.is_none());
    }

    #[test]
    fn rejects_incomplete_events() {
        let mut bad = event();
        bad.items.clear();
        assert!(matches!(
            Order::from_event(&bad),
            Err(OrderError::Validation(_))
        ));

        let mut bad = event();
        bad.quantity = 0;
        assert!(Order::from_event(&bad).is_err());
    }

    #[test]
    fn happy_path_transitions() {
        let mut order = Order::from_event(&event()).unwrap();
        order.mark_validating().unwrap();
        order.mark_pending_payment().unwrap();
        order.pay().unwrap();
        assert_eq!(order.state, OrderState::Paid);
    }

    #[test]
    fn cancel_only_from_pending_payment() {
        let mut order = Order::from_event(&event()).unwrap();
        assert!(order.cancel().is_err());

        order.mark_validating().unwrap();
        order.mark_pending_payment().unwrap();
        order.cancel().unwrap();
        assert_eq!(order.state, OrderState::Cancelled);

        // Terminal: a second cancel is an illegal transition.
        assert!(order.cancel().is_err());
        assert!(order.pay().is_err());
    }

    #[test]
    fn any_state_may_fail() {
        let mut order = Order::from_event(&event()).unwrap();
        order.mark_validating().unwrap();
        order.mark_failed();
        assert_eq!(order.state, OrderState::Failed);
    }
}
