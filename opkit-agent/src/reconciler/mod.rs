//! Release reconciler.
//!
//! A pass runs these operations in order:
//! 1. `handle-deletion`: finalize and remove releases marked for deletion
//! 2. `validate-spec`: reject specs that can never be rolled out
//! 3. `initialize-conditions`: seed the condition ledger on first sight
//! 4. `roll-out`: drive `spec.version` to all replicas, waiting between passes
//! 5. `publish-status`: mark Ready and record the observed generation

pub mod lifecycle;
pub mod rollout;

use std::sync::Arc;
use std::time::Duration;

use opkit::{
    ClientError, InMemoryClient, OperationResult, PassContext, ReconcileEngine, ResourceClient,
};
use tracing::debug;

use crate::release::Release;
use lifecycle::{HandleDeletion, InitializeConditions, PublishStatus, ValidateSpec};
use rollout::RollOut;

/// Context shared by the operations of one pass.
pub type ReleaseContext = PassContext<Release>;

/// Build the ordered operation list for Release passes.
pub fn build_engine(
    store: Arc<InMemoryClient<Release>>,
    rollout_duration: Duration,
) -> ReconcileEngine<ReleaseContext> {
    let client: Arc<dyn ResourceClient<Release>> = store.clone();
    ReconcileEngine::new()
        .with_operation(HandleDeletion::new(store))
        .with_operation(ValidateSpec::new(client.clone()))
        .with_operation(InitializeConditions)
        .with_operation(RollOut::new(client.clone(), rollout_duration))
        .with_operation(PublishStatus::new(client))
}

/// Write the context's status back to the store.
///
/// On success the context picks up the stored copy (new resource version)
/// and `on_success` is returned. A vanished resource ends the pass, a
/// conflicting write asks for a fresh pass.
pub(crate) async fn persist_status(
    client: &dyn ResourceClient<Release>,
    ctx: &mut ReleaseContext,
    on_success: OperationResult,
) -> anyhow::Result<OperationResult> {
    match client.update_status(&ctx.resource).await {
        Ok(updated) => {
            ctx.resource = updated;
            Ok(on_success)
        }
        Err(ClientError::NotFound(key)) => {
            debug!("Release {} vanished during reconcile", key);
            Ok(OperationResult::stop_processing())
        }
        Err(e @ ClientError::Conflict { .. }) => {
            debug!("Status write conflicted: {}", e);
            Ok(OperationResult::requeue())
        }
        Err(e) => Err(e.into()),
    }
}
