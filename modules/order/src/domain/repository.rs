use crate::domain::Order;
use crate::error::OrderError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Persistence port for the order aggregate. Save is an upsert keyed by
/// order id, which is what makes event redelivery idempotent at the
/// repository: the same event id always lands on the same row.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn save(&self, order: &Order) -> Result<(), OrderError>;
    async fn find(&self, order_id: &str) -> Result<Option<Order>, OrderError>;
}

/// In-memory repository for dev and tests.
#[derive(Clone, Default)]
pub struct InMemoryOrderRepository {
    orders: Arc<RwLock<HashMap<String, Order>>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn save(&self, order: &Order) -> Result<(), OrderError> {
        self.orders
            .write()
            .await
            .insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn find(&self, order_id: &str) -> Result<Option<Order>, OrderError> {
        Ok(self.orders.read().await.get(order_id).cloned())
    }
}
