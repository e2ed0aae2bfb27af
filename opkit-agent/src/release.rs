//! Release resource reconciled by the agent.

use chrono::{DateTime, Utc};
use opkit::{ConditionLedger, HasConditions, ObjectMeta, Resource};
use serde::{Deserialize, Serialize};

/// Condition set once the release's spec has been fully reconciled.
pub const CONDITION_READY: &str = "Ready";
/// Condition tracking the rollout of `spec.version`.
pub const CONDITION_RELEASED: &str = "Released";

/// A versioned release rolled out to a number of replicas.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub metadata: ObjectMeta,
    pub spec: ReleaseSpec,
    #[serde(default)]
    pub status: ReleaseStatus,
}

/// Desired state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseSpec {
    pub version: String,
    pub replicas: u32,
}

/// Observed state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseStatus {
    #[serde(default)]
    pub conditions: ConditionLedger,
    /// Generation last fully reconciled.
    #[serde(default)]
    pub observed_generation: i64,
    /// Version currently running on all replicas.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub released_version: Option<String>,
    /// Rollout in progress, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollout: Option<Rollout>,
}

/// An in-flight rollout of one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rollout {
    pub version: String,
    pub started_at: DateTime<Utc>,
}

impl Release {
    pub fn new(namespace: &str, name: &str, version: &str, replicas: u32) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec: ReleaseSpec {
                version: version.to_string(),
                replicas,
            },
            status: ReleaseStatus::default(),
        }
    }

    /// True once the current generation is reconciled and Ready.
    pub fn is_ready(&self) -> bool {
        self.status.observed_generation == self.metadata.generation
            && self.status.conditions.is_true(CONDITION_READY)
    }
}

impl Resource for Release {
    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl HasConditions for Release {
    fn conditions(&self) -> &ConditionLedger {
        &self.status.conditions
    }

    fn conditions_mut(&mut self) -> &mut ConditionLedger {
        &mut self.status.conditions
    }
}
