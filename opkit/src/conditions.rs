//! Condition ledger attached to a resource status.
//!
//! A condition records one observed aspect of a resource (for example
//! "Ready" or "Released"). The ledger keeps at most one condition per type,
//! in insertion order. `last_transition_time` only moves when the status
//! flips, so observers can measure how long a resource has been in a state.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Truth value of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionStatus::True => write!(f, "True"),
            ConditionStatus::False => write!(f, "False"),
            ConditionStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        }
    }
}

/// A single named status condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Symbolic name, unique within a ledger.
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: ConditionStatus,
    /// Short machine-readable reason.
    pub reason: String,
    /// Human-readable detail, may be empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// Last time `status` changed.
    pub last_transition_time: DateTime<Utc>,
}

/// Ordered set of conditions, unique by type.
///
/// Serialized as a plain array. When a stored array repeats a type, the
/// first entry is kept and later ones are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Condition>", into = "Vec<Condition>")]
pub struct ConditionLedger {
    conditions: Vec<Condition>,
}

impl ConditionLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a condition with an empty message.
    pub fn set_condition(
        &mut self,
        condition_type: &str,
        status: ConditionStatus,
        reason: &str,
    ) {
        self.set_condition_with_message(condition_type, status, reason, "");
    }

    /// Set a condition, preserving its transition time unless the status flips.
    pub fn set_condition_with_message(
        &mut self,
        condition_type: &str,
        status: ConditionStatus,
        reason: &str,
        message: &str,
    ) {
        self.set_condition_at(condition_type, status, reason, message, Utc::now());
    }

    /// Same as [`ConditionLedger::set_condition_with_message`] with an explicit clock.
    pub fn set_condition_at(
        &mut self,
        condition_type: &str,
        status: ConditionStatus,
        reason: &str,
        message: &str,
        now: DateTime<Utc>,
    ) {
        match self
            .conditions
            .iter_mut()
            .find(|c| c.condition_type == condition_type)
        {
            Some(existing) => {
                if existing.status != status {
                    existing.status = status;
                    existing.last_transition_time = now;
                }
                existing.reason = reason.to_string();
                existing.message = message.to_string();
            }
            None => self.conditions.push(Condition {
                condition_type: condition_type.to_string(),
                status,
                reason: reason.to_string(),
                message: message.to_string(),
                last_transition_time: now,
            }),
        }
    }

    /// Look up a condition by type.
    pub fn get(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }

    /// Status of a condition, if present.
    pub fn status_of(&self, condition_type: &str) -> Option<ConditionStatus> {
        self.get(condition_type).map(|c| c.status)
    }

    /// True only if the condition is present with status `True`.
    pub fn is_true(&self, condition_type: &str) -> bool {
        self.status_of(condition_type) == Some(ConditionStatus::True)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.conditions.iter()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

impl From<Vec<Condition>> for ConditionLedger {
    fn from(stored: Vec<Condition>) -> Self {
        let mut conditions: Vec<Condition> = Vec::with_capacity(stored.len());
        for condition in stored {
            if conditions
                .iter()
                .all(|c| c.condition_type != condition.condition_type)
            {
                conditions.push(condition);
            }
        }
        Self { conditions }
    }
}

impl From<ConditionLedger> for Vec<Condition> {
    fn from(ledger: ConditionLedger) -> Self {
        ledger.conditions
    }
}

impl<'a> IntoIterator for &'a ConditionLedger {
    type Item = &'a Condition;
    type IntoIter = std::slice::Iter<'a, Condition>;

    fn into_iter(self) -> Self::IntoIter {
        self.conditions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_set_condition_appends_new_type() {
        let mut ledger = ConditionLedger::new();
        ledger.set_condition_at("Ready", ConditionStatus::True, "Succeeded", "", t0());

        let ready = ledger.get("Ready").unwrap();
        assert_eq!(ready.status, ConditionStatus::True);
        assert_eq!(ready.reason, "Succeeded");
        assert_eq!(ready.message, "");
        assert_eq!(ready.last_transition_time, t0());
    }

    #[test]
    fn test_same_status_keeps_transition_time() {
        let mut ledger = ConditionLedger::new();
        let later = t0() + Duration::seconds(42);
        ledger.set_condition_at("Ready", ConditionStatus::True, "Succeeded", "", t0());
        ledger.set_condition_at(
            "Ready",
            ConditionStatus::True,
            "StillSucceeded",
            "all good",
            later,
        );

        assert_eq!(ledger.len(), 1);
        let ready = ledger.get("Ready").unwrap();
        assert_eq!(ready.reason, "StillSucceeded");
        assert_eq!(ready.message, "all good");
        assert_eq!(ready.last_transition_time, t0());
    }

    #[test]
    fn test_status_flip_updates_transition_time() {
        let mut ledger = ConditionLedger::new();
        let later = t0() + Duration::seconds(42);
        ledger.set_condition_at("Ready", ConditionStatus::True, "Succeeded", "", t0());
        ledger.set_condition_at("Ready", ConditionStatus::False, "Failed", "", later);

        let ready = ledger.get("Ready").unwrap();
        assert_eq!(ready.status, ConditionStatus::False);
        assert_eq!(ready.reason, "Failed");
        assert_eq!(ready.last_transition_time, later);
    }

    #[test]
    fn test_repeated_identical_calls_are_idempotent() {
        let mut ledger = ConditionLedger::new();
        for i in 0..5 {
            ledger.set_condition_at(
                "Released",
                ConditionStatus::Unknown,
                "Pending",
                "waiting",
                t0() + Duration::seconds(i),
            );
        }

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get("Released").unwrap().last_transition_time, t0());
    }

    #[test]
    fn test_update_preserves_insertion_order() {
        let mut ledger = ConditionLedger::new();
        ledger.set_condition("Initialized", ConditionStatus::True, "Done");
        ledger.set_condition("Released", ConditionStatus::False, "Pending");
        ledger.set_condition("Ready", ConditionStatus::False, "Pending");
        ledger.set_condition("Initialized", ConditionStatus::False, "Reset");
        ledger.set_condition("Released", ConditionStatus::True, "Done");

        let types: Vec<_> = ledger.iter().map(|c| c.condition_type.as_str()).collect();
        assert_eq!(types, vec!["Initialized", "Released", "Ready"]);
    }

    #[test]
    fn test_status_queries() {
        let mut ledger = ConditionLedger::new();
        ledger.set_condition("Ready", ConditionStatus::True, "Succeeded");
        ledger.set_condition("Released", ConditionStatus::Unknown, "Pending");

        assert!(ledger.is_true("Ready"));
        assert!(!ledger.is_true("Released"));
        assert!(!ledger.is_true("Missing"));
        assert_eq!(ledger.status_of("Released"), Some(ConditionStatus::Unknown));
        assert_eq!(ledger.status_of("Missing"), None);
    }

    #[test]
    fn test_serializes_as_camel_case_array() {
        let mut ledger = ConditionLedger::new();
        ledger.set_condition_at("Ready", ConditionStatus::True, "Succeeded", "", t0());

        let json = serde_json::to_value(&ledger).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{
                "type": "Ready",
                "status": "True",
                "reason": "Succeeded",
                "lastTransitionTime": "2024-01-01T00:00:00Z"
            }])
        );

        let back: ConditionLedger = serde_json::from_value(json).unwrap();
        assert_eq!(back, ledger);
    }

    #[test]
    fn test_deserialize_drops_duplicate_types() {
        let json = serde_json::json!([
            {"type": "Ready", "status": "True", "reason": "A", "lastTransitionTime": "2024-01-01T00:00:00Z"},
            {"type": "Released", "status": "False", "reason": "Pending", "lastTransitionTime": "2024-01-01T00:00:00Z"},
            {"type": "Ready", "status": "False", "reason": "B", "lastTransitionTime": "2024-01-02T00:00:00Z"}
        ]);
        let mut ledger: ConditionLedger = serde_json::from_value(json).unwrap();

        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.get("Ready").unwrap().reason, "A");

        ledger.set_condition("Ready", ConditionStatus::True, "C");
        let ready: Vec<_> = ledger
            .iter()
            .filter(|c| c.condition_type == "Ready")
            .collect();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].reason, "C");
        let types: Vec<_> = ledger.iter().map(|c| c.condition_type.as_str()).collect();
        assert_eq!(types, vec!["Ready", "Released"]);
    }

    #[test]
    fn test_set_condition_clears_message() {
        let mut ledger = ConditionLedger::new();
        ledger.set_condition_with_message("Ready", ConditionStatus::False, "Waiting", "detail");
        ledger.set_condition("Ready", ConditionStatus::False, "Waiting");

        assert_eq!(ledger.get("Ready").unwrap().message, "");
        let json = serde_json::to_value(&ledger).unwrap();
        assert!(json[0].get("message").is_none());
    }
}
