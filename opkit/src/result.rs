//! Outcome of a single reconcile operation.
//!
//! Every operation in a pass reports exactly one of five outcomes. The
//! representation is private: values only come from the named constructors,
//! so combinations such as "continue, but with an error" or a zero-length
//! wait cannot be expressed.

use std::fmt;
use std::time::Duration;

/// Result produced by one operation of a reconcile pass.
pub struct OperationResult(Outcome);

pub(crate) enum Outcome {
    /// The step succeeded; run the next operation.
    Continue,
    /// The pass is complete; no further pass is needed.
    Stop,
    /// The pass is incomplete; schedule another one as soon as allowed.
    Requeue,
    /// The pass is waiting on something; schedule another one after the delay.
    RequeueAfter(Duration),
    /// The step failed; the control loop retries with its own backoff.
    Failed(anyhow::Error),
}

impl OperationResult {
    /// Proceed to the next operation in the sequence.
    pub fn continue_processing() -> Self {
        Self(Outcome::Continue)
    }

    /// Finish the pass without scheduling another one.
    pub fn stop_processing() -> Self {
        Self(Outcome::Stop)
    }

    /// Finish the pass and schedule another one immediately.
    pub fn requeue() -> Self {
        Self(Outcome::Requeue)
    }

    /// Finish the pass and schedule another one after `delay`.
    ///
    /// A zero delay means "as soon as possible" and is the same as
    /// [`OperationResult::requeue`].
    pub fn requeue_after(delay: Duration) -> Self {
        if delay.is_zero() {
            Self::requeue()
        } else {
            Self(Outcome::RequeueAfter(delay))
        }
    }

    /// Finish the pass with a failure.
    pub fn requeue_on_error(err: impl Into<anyhow::Error>) -> Self {
        Self(Outcome::Failed(err.into()))
    }

    /// True if no later operation in the pass may run.
    pub fn is_terminal(&self) -> bool {
        !matches!(self.0, Outcome::Continue)
    }

    /// True if the control loop should schedule another pass.
    pub fn should_requeue(&self) -> bool {
        matches!(
            self.0,
            Outcome::Requeue | Outcome::RequeueAfter(_) | Outcome::Failed(_)
        )
    }

    /// Minimum wait before the next pass, if one was requested.
    pub fn requeue_delay(&self) -> Option<Duration> {
        match self.0 {
            Outcome::RequeueAfter(delay) => Some(delay),
            _ => None,
        }
    }

    /// The failure carried by this result, if any.
    pub fn error(&self) -> Option<&anyhow::Error> {
        match &self.0 {
            Outcome::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub(crate) fn into_outcome(self) -> Outcome {
        self.0
    }
}

impl fmt::Debug for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Outcome::Continue => write!(f, "Continue"),
            Outcome::Stop => write!(f, "Stop"),
            Outcome::Requeue => write!(f, "Requeue"),
            Outcome::RequeueAfter(delay) => write!(f, "RequeueAfter({:?})", delay),
            Outcome::Failed(err) => write!(f, "RequeueOnError({:#})", err),
        }
    }
}

impl From<anyhow::Error> for OperationResult {
    fn from(err: anyhow::Error) -> Self {
        Self::requeue_on_error(err)
    }
}
