// Execution Record Models
// Node execution records as delivered by the record store, plus the detail payloads

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Output produced by a step, opaque to the engine
pub type Outcome = serde_json::Value;

/// Step detail blob, opaque to the engine
pub type StepDetail = serde_json::Value;

pub type OutcomeMap = HashMap<String, Outcome>;
pub type StepDetailMap = HashMap<String, StepDetail>;

/// How repeated executions at one position are laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionMode {
    #[default]
    Normal,
    /// Iterations/retries rendered as one continuous lane
    Chain,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    #[default]
    Queued,
    Running,
    Paused,
    Succeeded,
    Failed,
    Aborted,
    Skipped,
}

impl ExecutionStatus {
    /// Whether the node has finished running
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Succeeded
                | ExecutionStatus::Failed
                | ExecutionStatus::Aborted
                | ExecutionStatus::Skipped
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExecutionStatus::Queued => "queued",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Paused => "paused",
            ExecutionStatus::Succeeded => "succeeded",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Aborted => "aborted",
            ExecutionStatus::Skipped => "skipped",
        };
        write!(f, "{}", label)
    }
}

/// Display-oriented data carried by a record, consumed only by the converter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayPayload {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub step_type: Option<String>,
    #[serde(default)]
    pub status: ExecutionStatus,
    #[serde(default)]
    pub started_at: Option<i64>,
    #[serde(default)]
    pub ended_at: Option<i64>,
}

/// One recorded run of a step, step group or fork branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeExecutionRecord {
    pub id: String,
    /// Enclosing scope (step group, fork), absent for top-level nodes
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Node this one directly continues in an already materialized chain
    #[serde(default)]
    pub previous_id: Option<String>,
    #[serde(default)]
    pub next_id: Option<String>,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    /// Creation timestamp in milliseconds
    pub created_at: i64,
    pub plan_execution_id: String,
    #[serde(default)]
    pub display: DisplayPayload,
}

impl NodeExecutionRecord {
    pub fn new(
        plan_execution_id: impl Into<String>,
        id: impl Into<String>,
        created_at: i64,
    ) -> Self {
        let id = id.into();
        Self {
            display: DisplayPayload {
                name: id.clone(),
                ..Default::default()
            },
            id,
            parent_id: None,
            previous_id: None,
            next_id: None,
            execution_mode: ExecutionMode::Normal,
            created_at,
            plan_execution_id: plan_execution_id.into(),
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_previous(mut self, previous_id: impl Into<String>) -> Self {
        self.previous_id = Some(previous_id.into());
        self
    }

    pub fn with_next(mut self, next_id: impl Into<String>) -> Self {
        self.next_id = Some(next_id.into());
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.display.name = name.into();
        self
    }

    pub fn with_status(mut self, status: ExecutionStatus) -> Self {
        self.display.status = status;
        self
    }

    /// Sort key used whenever records must be ordered without explicit links
    pub fn arrival_key(&self) -> (i64, &str) {
        (self.created_at, self.id.as_str())
    }
}

/// Sort records by creation time, breaking ties by id
pub fn sort_by_arrival(records: &mut [NodeExecutionRecord]) {
    records.sort_by(|a, b| a.arrival_key().cmp(&b.arrival_key()));
}
