// Record Store Module
// Read-only access to node execution records, outcomes and step details

pub mod memory;

pub use memory::{InMemoryStore, StoreDocument};

use crate::models::{NodeExecutionRecord, OutcomeMap, StepDetailMap};

use std::io;
use thiserror::Error;

/// Errors reported by a record store
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Invalid record document: {0}")]
    ParseError(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Source of node execution records and their detail payloads
#[async_trait::async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Every record known for one plan execution, in any order
    async fn fetch_records(&self, plan_execution_id: &str) -> StoreResult<Vec<NodeExecutionRecord>>;

    /// Outcome map of one node, empty when the node produced none
    async fn fetch_outcomes(&self, plan_execution_id: &str, node_id: &str)
        -> StoreResult<OutcomeMap>;

    async fn fetch_step_details(
        &self,
        plan_execution_id: &str,
        node_id: &str,
    ) -> StoreResult<StepDetailMap>;
}
