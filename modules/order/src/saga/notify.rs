use crate::error::OrderError;
use crate::saga::{Deps, SagaRun, SagaStep};
use async_trait::async_trait;

/// Final step: tell the user their order is waiting for payment.
/// Fire-and-forget; a publish failure never rolls anything back.
pub struct NotifyUser;

#[async_trait]
impl SagaStep for NotifyUser {
    fn name(&self) -> &'static str {
        "notify-user"
    }

    async fn run(&self, deps: &Deps, run: &mut SagaRun) -> Result<(), OrderError> {
        if let Err(e) = deps.notifier.order_created(&run.call, &run.order).await {
            tracing::warn!(
                order_id = %run.order.id,
                error = %e,
                "failed to publish order notification"
            );
        }
        Ok(())
    }
}
