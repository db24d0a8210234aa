use crate::error::OrderError;
use crate::saga::{Deps, SagaRun, SagaStep};
use async_trait::async_trait;

/// Step 1: synchronous fraud screen. The check has no side effect, so there
/// is nothing to compensate.
pub struct FraudCheck;

#[async_trait]
impl SagaStep for FraudCheck {
    fn name(&self) -> &'static str {
        "fraud-check"
    }

    async fn run(&self, deps: &Deps, run: &mut SagaRun) -> Result<(), OrderError> {
        deps.fraud
            .check(&run.call, &run.order.user_id, &run.order.items)
            .await
    }
}
