use crate::error::OrderError;
use crate::ports::{SeckillGate, SeckillVerdict};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

/// In-memory seckill gate for dev and tests. The mutex linearizes attempts,
/// giving the same observable behavior as the store-side script.
#[derive(Clone, Default)]
pub struct InMemorySeckillGate {
    products: Arc<Mutex<HashMap<String, ProductState>>>,
}

#[derive(Default)]
struct ProductState {
    stock: i64,
    buyers: HashSet<String>,
}

impl InMemorySeckillGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining stock, for assertions.
    pub async fn remaining(&self, product_id: &str) -> i64 {
        self.products
            .lock()
            .await
            .get(product_id)
            .map(|p| p.stock)
            .unwrap_or(0)
    }
}

#[async_trait]
impl SeckillGate for InMemorySeckillGate {
    async fn attempt(&self, product_id: &str, user_id: &str) -> Result<SeckillVerdict, OrderError> {
        let mut products = self.products.lock().await;
        // Unprepared products read as zero stock, like a missing counter key.
        let Some(product) = products.get_mut(product_id) else {
            return Ok(SeckillVerdict::SoldOut);
        };

        if product.buyers.contains(user_id) {
            return Ok(SeckillVerdict::Duplicate);
        }
        if product.stock > 0 {
            product.stock -= 1;
            product.buyers.insert(user_id.to_string());
            Ok(SeckillVerdict::Granted)
        } else {
            Ok(SeckillVerdict::SoldOut)
        }
    }

    async fn cancel(&self, product_id: &str, user_id: &str) -> Result<(), OrderError> {
        let mut products = self.products.lock().await;
        if let Some(product) = products.get_mut(product_id) {
            if product.buyers.remove(user_id) {
                product.stock += 1;
            }
        }
        Ok(())
    }

    async fn prepare(&self, product_id: &str, stock: i64) -> Result<(), OrderError> {
        self.products.lock().await.insert(
            product_id.to_string(),
            ProductState {
                stock,
                buyers: HashSet::new(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn grants_until_sold_out_then_rejects() {
        let gate = InMemorySeckillGate::new();
        gate.prepare("P", 1).await.unwrap();

        assert_eq!(gate.attempt("P", "U1").await.unwrap(), SeckillVerdict::Granted);
        assert_eq!(gate.attempt("P", "U2").await.unwrap(), SeckillVerdict::SoldOut);
        assert_eq!(
            gate.attempt("P", "U1").await.unwrap(),
            SeckillVerdict::Duplicate
        );
    }

    #[tokio::test]
    async fn duplicate_short_circuits_before_stock() {
        let gate = InMemorySeckillGate::new();
        gate.prepare("P", 5).await.unwrap();

        gate.attempt("P", "U1").await.unwrap();
        assert_eq!(
            gate.attempt("P", "U1").await.unwrap(),
            SeckillVerdict::Duplicate
        );
        assert_eq!(gate.remaining("P").await, 4);
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let gate = InMemorySeckillGate::new();
        gate.prepare("P", 1).await.unwrap();
        gate.attempt("P", "U1").await.unwrap();

        gate.cancel("P", "U1").await.unwrap();
        gate.cancel("P", "U1").await.unwrap();
        assert_eq!(gate.remaining("P").await, 1);

        // The user can contend again after a cancel.
        assert_eq!(gate.attempt("P", "U1").await.unwrap(), SeckillVerdict::Granted);
    }

    #[tokio::test]
    async fn unprepared_product_is_sold_out() {
        let gate = InMemorySeckillGate::new();
        assert_eq!(
            gate.attempt("ghost", "U1").await.unwrap(),
            SeckillVerdict::SoldOut
        );
    }

    #[tokio::test]
    async fn bounded_admission_under_concurrency() {
        let gate = InMemorySeckillGate::new();
        gate.prepare("P", 10).await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..100 {
            let gate = gate.clone();
            tasks.push(tokio::spawn(async move {
                gate.attempt("P", &format!("user-{}", i)).await.unwrap()
            }));
        }

        let mut granted = 0;
        for task in tasks {
            if task.await.unwrap() == SeckillVerdict::Granted {
                granted += 1;
            }
        }
        assert_eq!(granted, 10);
        assert_eq!(gate.remaining("P").await, 0);
    }
}
