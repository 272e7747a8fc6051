//! Events consumed by the workflow.

use crate::utils::Timestamp;
use serde::{Deserialize, Serialize};

/// Published once a human (or the gate) approves an action.
///
/// Delivery is at-least-once; handling the same event twice is safe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionApproved {
    /// The approved action.
    pub action_id: String,
    /// Who approved it.
    pub approved_by: String,
    /// When it was approved.
    pub approved_at: Timestamp,
}

impl ActionApproved {
    /// Creates an approval event.
    #[must_use]
    pub fn new(
        action_id: impl Into<String>,
        approved_by: impl Into<String>,
        approved_at: Timestamp,
    ) -> Self {
        Self {
            action_id: action_id.into(),
            approved_by: approved_by.into(),
            approved_at,
        }
    }
}
