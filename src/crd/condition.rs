//! # Conditions
//!
//! Status conditions written on every reconciliation so that failures are
//! diagnosable without log access.
//!
//! Two condition types are maintained:
//! - `Ready`: Available, Creating, Deleting, Unavailable
//! - `Synced`: ReconcileSuccess, ReconcileError

use serde::{Deserialize, Serialize};

pub const TYPE_READY: &str = "Ready";
pub const TYPE_SYNCED: &str = "Synced";

/// Condition represents a status condition for the resource
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of condition (True, False, Unknown)
    pub status: String,
    /// Last transition time
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Reason for condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Message describing condition
    #[serde(default)]
    pub message: Option<String>,
}

impl Condition {
    fn new(r#type: &str, status: &str, reason: &str, message: Option<String>) -> Self {
        Self {
            r#type: r#type.to_string(),
            status: status.to_string(),
            last_transition_time: Some(chrono::Utc::now().to_rfc3339()),
            reason: Some(reason.to_string()),
            message,
        }
    }

    /// The external resource exists and is usable
    pub fn available() -> Self {
        Self::new(TYPE_READY, "True", "Available", None)
    }

    /// The external resource is being created
    pub fn creating() -> Self {
        Self::new(TYPE_READY, "False", "Creating", None)
    }

    /// The external resource is being deleted
    pub fn deleting() -> Self {
        Self::new(TYPE_READY, "False", "Deleting", None)
    }

    /// The external resource is not (yet) usable
    pub fn unavailable() -> Self {
        Self::new(TYPE_READY, "False", "Unavailable", None)
    }

    /// The last reconciliation succeeded
    pub fn reconcile_success() -> Self {
        Self::new(TYPE_SYNCED, "True", "ReconcileSuccess", None)
    }

    /// The last reconciliation failed
    pub fn reconcile_error(err: &crate::Error) -> Self {
        Self::new(TYPE_SYNCED, "False", err.reason(), Some(err.to_string()))
    }

    /// Equal apart from the transition time
    pub fn same_state(&self, other: &Condition) -> bool {
        self.r#type == other.r#type
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}

/// Merge `updates` into `conditions`, one condition per type.
///
/// A condition that did not change keeps its original transition time so that
/// repeated reconciliations do not churn the status.
pub fn set_conditions(conditions: &mut Vec<Condition>, updates: Vec<Condition>) {
    for update in updates {
        match conditions.iter_mut().find(|c| c.r#type == update.r#type) {
            Some(existing) if existing.same_state(&update) => {}
            Some(existing) => *existing = update,
            None => conditions.push(update),
        }
    }
}

/// Look up a condition by type
pub fn get_condition<'a>(conditions: &'a [Condition], r#type: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == r#type)
}
