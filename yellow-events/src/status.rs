//! Canonical execution statuses.

use serde::{Deserialize, Serialize};

/// Canonical status of an intent's execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    /// Intent accepted, nothing done yet
    Created,
    /// A solver quote is available
    Quoted,
    /// Channel work is in progress
    Executing,
    /// Settlement is in progress
    Settling,
    /// Funds settled
    Settled,
    /// Execution stopped with a failure
    Aborted,
    /// A deadline passed
    Expired,
}

impl ExecutionStatus {
    /// Returns true for statuses no further event can move out of.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Settled | ExecutionStatus::Aborted | ExecutionStatus::Expired
        )
    }
}

/// Progress of the step a mapping describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Step has not started
    Pending,
    /// Step is running
    InProgress,
    /// Step finished successfully
    Completed,
    /// Step failed
    Failed,
}

/// Result of normalizing an event, status, or intent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMapping {
    /// Canonical execution status
    pub execution_status: ExecutionStatus,
    /// Human-readable step label
    pub step_label: &'static str,
    /// Step progress
    pub step_status: StepStatus,
    /// Derived from `execution_status`; never set independently
    pub is_terminal: bool,
}

impl EventMapping {
    /// Builds a mapping, deriving `is_terminal` from the status.
    pub(crate) fn new(
        execution_status: ExecutionStatus,
        step_label: &'static str,
        step_status: StepStatus,
    ) -> Self {
        Self {
            execution_status,
            step_label,
            step_status,
            is_terminal: execution_status.is_terminal(),
        }
    }
}
