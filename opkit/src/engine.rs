//! Reconcile operation engine.
//!
//! A reconcile pass is an ordered list of operations run against one shared
//! context. The engine runs them strictly in order and stops at the first
//! terminal result, which it translates into an [`Action`] for the control
//! loop (or an [`Error`] if the step failed). It never retries: repeating
//! a pass is the control loop's job.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::debug;

use crate::error::{Error, Result};
use crate::result::{OperationResult, Outcome};

/// One step of a reconcile pass.
///
/// Returning `Err` is treated exactly like returning
/// `Ok(OperationResult::requeue_on_error(err))`.
#[async_trait]
pub trait Operation<C: Send>: Send + Sync {
    /// Name used in errors and traces.
    fn name(&self) -> &str;

    async fn execute(&self, ctx: &mut C) -> anyhow::Result<OperationResult>;
}

/// Operation backed by a synchronous closure.
pub struct FnOperation<F> {
    name: String,
    f: F,
}

/// Wrap a closure as an [`Operation`].
pub fn from_fn<C, F>(name: impl Into<String>, f: F) -> FnOperation<F>
where
    C: Send,
    F: Fn(&mut C) -> anyhow::Result<OperationResult> + Send + Sync,
{
    FnOperation {
        name: name.into(),
        f,
    }
}

#[async_trait]
impl<C, F> Operation<C> for FnOperation<F>
where
    C: Send,
    F: Fn(&mut C) -> anyhow::Result<OperationResult> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &mut C) -> anyhow::Result<OperationResult> {
        (self.f)(ctx)
    }
}

/// Decision handed back to the control loop after a successful pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Nothing more to do until the next change notification.
    Done,
    /// Run another pass as soon as the rate limiter allows.
    Requeue,
    /// Run another pass after the delay.
    RequeueAfter(Duration),
}

impl Action {
    pub fn requeue(&self) -> bool {
        !matches!(self, Action::Done)
    }

    pub fn requeue_after(&self) -> Option<Duration> {
        match self {
            Action::RequeueAfter(delay) => Some(*delay),
            _ => None,
        }
    }
}

/// Run `operations` in order against `ctx`.
///
/// Stops at the first terminal result; later operations are not invoked.
/// An exhausted sequence counts as `stop_processing()`.
pub async fn run<C: Send>(ctx: &mut C, operations: &[Box<dyn Operation<C>>]) -> Result<Action> {
    for op in operations {
        let result = op
            .execute(ctx)
            .await
            .unwrap_or_else(|err| OperationResult::requeue_on_error(err));

        if !result.is_terminal() {
            debug!(operation = op.name(), "Operation continued");
            continue;
        }

        debug!(operation = op.name(), result = ?result, "Operation ended pass");
        return translate(op.name(), result);
    }

    debug!("All operations continued, pass complete");
    translate("", OperationResult::stop_processing())
}

fn translate(operation: &str, result: OperationResult) -> Result<Action> {
    match result.into_outcome() {
        Outcome::Continue | Outcome::Stop => Ok(Action::Done),
        Outcome::Requeue => Ok(Action::Requeue),
        Outcome::RequeueAfter(delay) => Ok(Action::RequeueAfter(delay)),
        Outcome::Failed(source) => Err(Error::Step {
            operation: operation.to_string(),
            source,
        }),
    }
}

/// A reusable, ordered list of operations.
pub struct ReconcileEngine<C: Send> {
    operations: Vec<Box<dyn Operation<C>>>,
}

impl<C: Send> ReconcileEngine<C> {
    pub fn new() -> Self {
        Self {
            operations: Vec::new(),
        }
    }

    /// Append an operation, builder style.
    pub fn with_operation(mut self, op: impl Operation<C> + 'static) -> Self {
        self.push(op);
        self
    }

    pub fn push(&mut self, op: impl Operation<C> + 'static) {
        self.operations.push(Box::new(op));
    }

    /// Operation names in execution order.
    pub fn operation_names(&self) -> Vec<&str> {
        self.operations.iter().map(|op| op.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Run one reconcile pass. See [`run`].
    pub async fn run(&self, ctx: &mut C) -> Result<Action> {
        run(ctx, &self.operations).await
    }
}

impl<C: Send> Default for ReconcileEngine<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-pass context: the resource under reconciliation plus a cancellation
/// signal from the control loop.
///
/// The engine does not look at the signal. Operations that may block check
/// [`PassContext::is_cancelled`] and return promptly.
pub struct PassContext<R> {
    pub resource: R,
    cancel: Option<watch::Receiver<bool>>,
}

impl<R> PassContext<R> {
    pub fn new(resource: R) -> Self {
        Self {
            resource,
            cancel: None,
        }
    }

    /// Attach a shutdown channel; `true` on the channel means cancelled.
    pub fn with_cancellation(resource: R, cancel: watch::Receiver<bool>) -> Self {
        Self {
            resource,
            cancel: Some(cancel),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    pub fn into_resource(self) -> R {
        self.resource
    }
}
