//! Resource identity and metadata.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::conditions::ConditionLedger;

/// Identity of a resource: namespace plus name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Metadata shared by every reconciled resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    /// Assigned by the store on create.
    #[serde(default)]
    pub uid: Option<Uuid>,
    /// Bumped whenever the desired-state spec changes.
    #[serde(default)]
    pub generation: i64,
    /// Bumped on every write; used for optimistic concurrency.
    #[serde(default)]
    pub resource_version: u64,
    /// Set when deletion was requested but finalization is pending.
    #[serde(default)]
    pub deletion_requested: bool,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }
}

/// A resource that can be stored and reconciled.
pub trait Resource: Clone + Send + Sync + 'static {
    fn meta(&self) -> &ObjectMeta;

    fn meta_mut(&mut self) -> &mut ObjectMeta;

    fn key(&self) -> ObjectKey {
        self.meta().key()
    }
}

/// A resource whose status carries a condition ledger.
pub trait HasConditions {
    fn conditions(&self) -> &ConditionLedger;

    fn conditions_mut(&mut self) -> &mut ConditionLedger;
}
