use crate::error::OrderError;
use crate::saga::{Deps, SagaRun, SagaStep};
use async_trait::async_trait;

/// Step 4: price and shipping quote, fanned out concurrently.
///
/// Both calls start before either completes and the step joins on both.
/// Failures from either side are aggregated into a single error; neither
/// call reserves anything, so there is no compensation.
pub struct PriceAndShip;

#[async_trait]
impl SagaStep for PriceAndShip {
    fn name(&self) -> &'static str {
        "pricing-shipping"
    }

    async fn run(&self, deps: &Deps, run: &mut SagaRun) -> Result<(), OrderError> {
        let (price, quote) = tokio::join!(
            deps.pricing
                .calculate_price(&run.call, &run.order.user_id, run.order.is_vip),
            deps.shipping.quote(&run.call),
        );

        let mut failures = Vec::new();
        match price {
            Ok(price) => {
                tracing::debug!(order_id = %run.order.id, price, "price calculated");
            }
            Err(e) => failures.push(format!("pricing service error: {}", e)),
        }
        match quote {
            Ok(quote) => {
                tracing::debug!(order_id = %run.order.id, quote, "shipping quote received");
            }
            Err(e) => failures.push(format!("shipping service error: {}", e)),
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(OrderError::transport(
                "pricing/shipping fan-out",
                failures.join("; "),
            ))
        }
    }
}
