// In-Memory Store
// Record store backed by tokio-locked maps, loadable from a JSON record document

use super::{ExecutionStore, StoreError, StoreResult};
use crate::models::{NodeExecutionRecord, OutcomeMap, StepDetailMap};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// JSON document accepted by [`InMemoryStore::from_json_str`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreDocument {
    #[serde(default)]
    pub records: Vec<NodeExecutionRecord>,
    /// Node id -> outcome map
    #[serde(default)]
    pub outcomes: HashMap<String, OutcomeMap>,
    #[serde(default)]
    pub step_details: HashMap<String, StepDetailMap>,
}

/// Store keeping every plan execution in memory
#[derive(Clone, Default)]
pub struct InMemoryStore {
    records: Arc<RwLock<HashMap<String, Vec<NodeExecutionRecord>>>>,
    outcomes: Arc<RwLock<HashMap<String, OutcomeMap>>>,
    step_details: Arc<RwLock<HashMap<String, StepDetailMap>>>,
    detail_fetches: Arc<AtomicUsize>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from an already parsed document
    pub fn from_document(document: StoreDocument) -> Self {
        let mut records: HashMap<String, Vec<NodeExecutionRecord>> = HashMap::new();
        for record in document.records {
            records
                .entry(record.plan_execution_id.clone())
                .or_default()
                .push(record);
        }

        Self {
            records: Arc::new(RwLock::new(records)),
            outcomes: Arc::new(RwLock::new(document.outcomes)),
            step_details: Arc::new(RwLock::new(document.step_details)),
            ..Default::default()
        }
    }

    pub fn from_json_str(json: &str) -> StoreResult<Self> {
        let document: StoreDocument = serde_json::from_str(json)?;
        Ok(Self::from_document(document))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> StoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub async fn insert_record(&self, record: NodeExecutionRecord) {
        let mut records = self.records.write().await;
        records
            .entry(record.plan_execution_id.clone())
            .or_default()
            .push(record);
    }

    pub async fn insert_outcomes(&self, node_id: impl Into<String>, outcomes: OutcomeMap) {
        self.outcomes.write().await.insert(node_id.into(), outcomes);
    }

    pub async fn insert_step_details(&self, node_id: impl Into<String>, details: StepDetailMap) {
        self.step_details.write().await.insert(node_id.into(), details);
    }

    /// Plan execution ids with at least one record, sorted
    pub async fn plan_execution_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.records.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of outcome and step-detail lookups served so far
    pub fn detail_fetches(&self) -> usize {
        self.detail_fetches.load(Ordering::SeqCst)
    }

    /// Simulate an outage; every fetch fails with `Unavailable` while set
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ExecutionStore for InMemoryStore {
    async fn fetch_records(&self, plan_execution_id: &str) -> StoreResult<Vec<NodeExecutionRecord>> {
        self.check_available()?;
        let records = self.records.read().await;
        Ok(records.get(plan_execution_id).cloned().unwrap_or_default())
    }

    async fn fetch_outcomes(
        &self,
        _plan_execution_id: &str,
        node_id: &str,
    ) -> StoreResult<OutcomeMap> {
        self.check_available()?;
        self.detail_fetches.fetch_add(1, Ordering::SeqCst);
        let outcomes = self.outcomes.read().await;
        Ok(outcomes.get(node_id).cloned().unwrap_or_default())
    }

    async fn fetch_step_details(
        &self,
        _plan_execution_id: &str,
        node_id: &str,
    ) -> StoreResult<StepDetailMap> {
        self.check_available()?;
        self.detail_fetches.fetch_add(1, Ordering::SeqCst);
        let details = self.step_details.read().await;
        Ok(details.get(node_id).cloned().unwrap_or_default())
    }
}
