//! Per-saga compensation stack.

use crate::error::OrderError;
use crate::ports::CallContext;
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A captured undo action. Takes the (detached) context it should run under;
/// everything else it needs was captured when the side effect happened.
pub type Compensation = Box<dyn FnOnce(CallContext) -> BoxFuture<'static, Result<(), OrderError>> + Send>;

/// LIFO stack of compensations for one saga run.
///
/// Cloning shares the stack: the orchestrator keeps a handle outside the
/// deadline-bounded future so a timed-out run still unwinds everything the
/// steps registered. Mutation is serialized by the internal mutex; reads only
/// happen during unwind.
#[derive(Clone, Default)]
pub struct CompensationStack {
    inner: Arc<Mutex<Vec<(&'static str, Compensation)>>>,
}

impl CompensationStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an undo action for a side effect that just succeeded.
    pub async fn push(&self, label: &'static str, compensation: Compensation) {
        self.inner.lock().await.push((label, compensation));
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Run every registered compensation in reverse registration order, each
    /// on a context that keeps the trace lineage but drops any inherited
    /// deadline. A failing compensation is logged at the highest severity and
    /// never stops the rest of the unwind. Returns how many ran.
    pub async fn unwind(&self, call: &CallContext) -> usize {
        let drained = std::mem::take(&mut *self.inner.lock().await);
        let count = drained.len();
        if count == 0 {
            return 0;
        }

        tracing::info!(
            trace_id = %call.trace.trace_id,
            compensations = count,
            "unwinding saga"
        );

        for (label, compensation) in drained.into_iter().rev() {
            if let Err(e) = compensation(call.detached()).await {
                tracing::error!(
                    trace_id = %call.trace.trace_id,
                    compensation = label,
                    error = %e,
                    "compensation failed; continuing unwind"
                );
            }
        }
        count
    }
}
