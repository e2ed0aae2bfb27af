//! Rollout of `spec.version` to all replicas.
//!
//! The rollout itself is an external, slow process. The operation never
//! waits for it inside a pass: it records when the rollout started and
//! requeues the release until the rollout duration has elapsed.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use opkit::{
    ConditionStatus, HasConditions, Operation, OperationResult, Resource, ResourceClient,
};
use tracing::info;

use super::{ReleaseContext, persist_status};
use crate::release::{CONDITION_READY, CONDITION_RELEASED, Release, Rollout};

pub struct RollOut {
    client: Arc<dyn ResourceClient<Release>>,
    duration: Duration,
}

impl RollOut {
    pub fn new(client: Arc<dyn ResourceClient<Release>>, duration: Duration) -> Self {
        Self { client, duration }
    }

    /// Time left before a rollout started at `started_at` is complete.
    fn remaining(&self, started_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
        let elapsed = (now - started_at).to_std().unwrap_or(Duration::ZERO);
        self.duration.saturating_sub(elapsed)
    }
}

#[async_trait]
impl Operation<ReleaseContext> for RollOut {
    fn name(&self) -> &str {
        "roll-out"
    }

    async fn execute(&self, ctx: &mut ReleaseContext) -> anyhow::Result<OperationResult> {
        if ctx.is_cancelled() {
            return Ok(OperationResult::requeue_on_error(anyhow!(
                "rollout interrupted by shutdown"
            )));
        }

        let now = Utc::now();
        let key = ctx.resource.key();
        let release = &mut ctx.resource;
        let target = release.spec.version.clone();

        if release.status.released_version.as_deref() == Some(target.as_str())
            && release.status.rollout.is_none()
        {
            release.conditions_mut().set_condition(
                CONDITION_RELEASED,
                ConditionStatus::True,
                "RolloutComplete",
            );
            return Ok(OperationResult::continue_processing());
        }

        match release.status.rollout.clone() {
            Some(rollout) if rollout.version == target => {
                let remaining = self.remaining(rollout.started_at, now);
                if !remaining.is_zero() {
                    return Ok(OperationResult::requeue_after(remaining));
                }

                info!("Release {} rolled out {}", key, target);
                release.status.released_version = Some(target.clone());
                release.status.rollout = None;
                let message = format!("{} replicas running {}", release.spec.replicas, target);
                release.conditions_mut().set_condition_with_message(
                    CONDITION_RELEASED,
                    ConditionStatus::True,
                    "RolloutComplete",
                    &message,
                );
                Ok(OperationResult::continue_processing())
            }
            // No rollout yet, or the spec moved on to another version.
            _ => {
                info!("Release {} rolling out {}", key, target);
                release.status.rollout = Some(Rollout {
                    version: target.clone(),
                    started_at: now,
                });
                let message = format!(
                    "rolling out {} to {} replicas",
                    target, release.spec.replicas
                );
                let conditions = release.conditions_mut();
                conditions.set_condition_with_message(
                    CONDITION_RELEASED,
                    ConditionStatus::False,
                    "RollingOut",
                    &message,
                );
                conditions.set_condition(CONDITION_READY, ConditionStatus::False, "RollingOut");
                persist_status(
                    self.client.as_ref(),
                    ctx,
                    OperationResult::requeue_after(self.duration),
                )
                .await
            }
        }
    }
}
