use crate::error::{BusinessReject, OrderError};
use crate::ports::SeckillVerdict;
use crate::saga::{Deps, SagaRun, SagaStep};
use async_trait::async_trait;

/// Step 2: flash-sale admission. Skipped entirely for ordinary orders.
///
/// A grant is a store-side mutation, so it registers a cancel before the step
/// reports success. Sold-out and duplicate verdicts abort the saga without a
/// compensation of their own; the gate did not change state for this user.
pub struct SeckillAdmission;

#[async_trait]
impl SagaStep for SeckillAdmission {
    fn name(&self) -> &'static str {
        "seckill-admission"
    }

    async fn run(&self, deps: &Deps, run: &mut SagaRun) -> Result<(), OrderError> {
        let Some(product_id) = run.order.seckill_product_id.clone() else {
            return Ok(());
        };
        let user_id = run.order.user_id.clone();

        match deps.gate.attempt(&product_id, &user_id).await? {
            SeckillVerdict::Granted => {
                tracing::info!(
                    order_id = %run.order.id,
                    product_id = %product_id,
                    user_id = %user_id,
                    "seckill admission granted"
                );

                let gate = deps.gate.clone();
                run.compensations
                    .push(
                        "seckill-cancel",
                        Box::new(move |_call| {
                            Box::pin(async move { gate.cancel(&product_id, &user_id).await })
                        }),
                    )
                    .await;
                Ok(())
            }
            SeckillVerdict::SoldOut => Err(BusinessReject::SeckillSoldOut { product_id }.into()),
            SeckillVerdict::Duplicate => Err(BusinessReject::SeckillDuplicate {
                product_id,
                user_id,
            }
            .into()),
        }
    }
}
