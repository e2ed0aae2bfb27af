//! opkit: building blocks for operator-style controllers.
//!
//! - [`engine`]: runs a reconcile pass as an ordered list of operations and
//!   folds their [`OperationResult`]s into one [`Action`].
//! - [`conditions`]: the condition ledger kept in a resource's status.
//! - [`client`], [`predicate`], [`requeue`]: the pieces a control loop
//!   wires around the engine.
//! - [`testing`]: fixtures for controller integration tests.

pub mod client;
pub mod conditions;
pub mod engine;
pub mod error;
pub mod event;
pub mod predicate;
pub mod requeue;
pub mod resource;
pub mod result;
pub mod testing;

pub use client::{InMemoryClient, ResourceClient};
pub use conditions::{Condition, ConditionLedger, ConditionStatus};
pub use engine::{Action, FnOperation, Operation, PassContext, ReconcileEngine, from_fn};
pub use error::{ClientError, Error, Result};
pub use event::WatchEvent;
pub use predicate::{AdmitAll, EventPredicate, GenerationPredicate};
pub use requeue::{BackoffConfig, RequeuePolicy};
pub use resource::{HasConditions, ObjectKey, ObjectMeta, Resource};
pub use result::OperationResult;
