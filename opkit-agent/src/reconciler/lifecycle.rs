//! Operations that bracket a release pass: deletion, validation, condition
//! seeding and the final status publish.

use std::sync::Arc;

use async_trait::async_trait;
use opkit::{
    ConditionStatus, HasConditions, InMemoryClient, Operation, OperationResult, Resource,
    ResourceClient,
};
use tracing::info;

use super::{ReleaseContext, persist_status};
use crate::release::{CONDITION_READY, CONDITION_RELEASED, Release};

/// Removes releases that were marked for deletion. Nothing else runs for them.
pub struct HandleDeletion {
    store: Arc<InMemoryClient<Release>>,
}

impl HandleDeletion {
    pub fn new(store: Arc<InMemoryClient<Release>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Operation<ReleaseContext> for HandleDeletion {
    fn name(&self) -> &str {
        "handle-deletion"
    }

    async fn execute(&self, ctx: &mut ReleaseContext) -> anyhow::Result<OperationResult> {
        if !ctx.resource.metadata.deletion_requested {
            return Ok(OperationResult::continue_processing());
        }

        let key = ctx.resource.key();
        info!("Finalizing release {}", key);
        match self.store.delete(&key).await {
            Ok(()) => Ok(OperationResult::stop_processing()),
            Err(e) if e.is_not_found() => Ok(OperationResult::stop_processing()),
            Err(e) => Ok(OperationResult::requeue_on_error(e)),
        }
    }
}

/// Rejects specs that cannot be rolled out. The pass stops without a
/// requeue: only a spec change can fix an invalid spec.
pub struct ValidateSpec {
    client: Arc<dyn ResourceClient<Release>>,
}

impl ValidateSpec {
    pub fn new(client: Arc<dyn ResourceClient<Release>>) -> Self {
        Self { client }
    }
}

fn validation_error(release: &Release) -> Option<String> {
    if release.spec.version.trim().is_empty() {
        return Some("spec.version must not be empty".to_string());
    }
    if release.spec.replicas == 0 {
        return Some("spec.replicas must be at least 1".to_string());
    }
    None
}

#[async_trait]
impl Operation<ReleaseContext> for ValidateSpec {
    fn name(&self) -> &str {
        "validate-spec"
    }

    async fn execute(&self, ctx: &mut ReleaseContext) -> anyhow::Result<OperationResult> {
        let Some(message) = validation_error(&ctx.resource) else {
            return Ok(OperationResult::continue_processing());
        };

        info!("Release {} has an invalid spec: {}", ctx.resource.key(), message);
        let generation = ctx.resource.metadata.generation;
        ctx.resource.status.observed_generation = generation;
        ctx.resource.conditions_mut().set_condition_with_message(
            CONDITION_READY,
            ConditionStatus::False,
            "InvalidSpec",
            &message,
        );
        persist_status(
            self.client.as_ref(),
            ctx,
            OperationResult::stop_processing(),
        )
        .await
    }
}

/// Seeds Ready and Released as Unknown the first time a release is seen.
pub struct InitializeConditions;

#[async_trait]
impl Operation<ReleaseContext> for InitializeConditions {
    fn name(&self) -> &str {
        "initialize-conditions"
    }

    async fn execute(&self, ctx: &mut ReleaseContext) -> anyhow::Result<OperationResult> {
        let conditions = ctx.resource.conditions_mut();
        if conditions.get(CONDITION_READY).is_none() {
            conditions.set_condition(CONDITION_READY, ConditionStatus::Unknown, "Reconciling");
        }
        if conditions.get(CONDITION_RELEASED).is_none() {
            conditions.set_condition(CONDITION_RELEASED, ConditionStatus::Unknown, "Pending");
        }
        Ok(OperationResult::continue_processing())
    }
}

/// Marks the release Ready for the current generation and ends the pass.
pub struct PublishStatus {
    client: Arc<dyn ResourceClient<Release>>,
}

impl PublishStatus {
    pub fn new(client: Arc<dyn ResourceClient<Release>>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Operation<ReleaseContext> for PublishStatus {
    fn name(&self) -> &str {
        "publish-status"
    }

    async fn execute(&self, ctx: &mut ReleaseContext) -> anyhow::Result<OperationResult> {
        let release = &mut ctx.resource;
        release.status.observed_generation = release.metadata.generation;
        let message = format!(
            "{} replicas running {}",
            release.spec.replicas, release.spec.version
        );
        release.conditions_mut().set_condition_with_message(
            CONDITION_READY,
            ConditionStatus::True,
            "Reconciled",
            &message,
        );
        persist_status(
            self.client.as_ref(),
            ctx,
            OperationResult::stop_processing(),
        )
        .await
    }
}
