use crate::error::OrderError;
use crate::saga::{Deps, SagaRun, SagaStep};
use async_trait::async_trait;

/// Step 3: reserve stock item by item.
///
/// Every successful per-item reservation immediately registers a release for
/// exactly that item and this order, so a failure on item N unwinds items
/// 1..N-1 and nothing else.
pub struct ReserveInventory;

#[async_trait]
impl SagaStep for ReserveInventory {
    fn name(&self) -> &'static str {
        "inventory-reserve"
    }

    async fn run(&self, deps: &Deps, run: &mut SagaRun) -> Result<(), OrderError> {
        for item_id in run.order.items.clone() {
            deps.inventory
                .reserve(
                    &run.call,
                    &item_id,
                    run.order.quantity,
                    &run.order.user_id,
                    &run.order.id,
                )
                .await?;

            let inventory = deps.inventory.clone();
            let order_id = run.order.id.clone();
            run.compensations
                .push(
                    "inventory-release",
                    Box::new(move |call| {
                        Box::pin(async move { inventory.release(&call, &item_id, &order_id).await })
                    }),
                )
                .await;
        }

        tracing::info!(
            order_id = %run.order.id,
            items = run.order.items.len(),
            "all items reserved"
        );
        Ok(())
    }
}
