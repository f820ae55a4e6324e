// Graph Service
// Per-execution graph cache with serialized mutation, detail resolution and snapshots

use crate::config::EngineConfig;
use crate::converter::GraphVertexConverter;
use crate::error::{GraphError, GraphResult};
use crate::events::{EventSender, GraphEvent, GraphEventSender};
use crate::graph::{
    self, check_invariants, AddOutcome, AdjacencyList, GraphVertex, Placement, TraversalOrder,
};
use crate::models::NodeExecutionRecord;
use crate::snapshot::SnapshotStore;
use crate::store::ExecutionStore;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

type GraphSlot = Arc<Mutex<AdjacencyList>>;

/// Materializes and maintains one adjacency list per plan execution
///
/// Mutations of one execution are serialized by that execution's mutex.
/// Different executions proceed in parallel.
pub struct GraphService<S: ExecutionStore> {
    store: Arc<S>,
    config: EngineConfig,
    snapshots: SnapshotStore,
    converter: GraphVertexConverter,
    graphs: Arc<RwLock<HashMap<String, GraphSlot>>>,
    events: Option<GraphEventSender>,
}

impl<S: ExecutionStore> GraphService<S> {
    pub fn new(store: S, config: EngineConfig) -> Self {
        let snapshots = SnapshotStore::new(config.snapshot_dir.clone());
        Self {
            store: Arc::new(store),
            config,
            snapshots,
            converter: GraphVertexConverter::new(),
            graphs: Arc::new(RwLock::new(HashMap::new())),
            events: None,
        }
    }

    /// Report graph changes on `sender`
    pub fn with_events(mut self, sender: GraphEventSender) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Plan executions that currently have a cached graph, sorted
    pub async fn cached_executions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.graphs.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Copy of the cached graph
    pub async fn graph(&self, plan_execution_id: &str) -> GraphResult<AdjacencyList> {
        let slot = self.existing_slot(plan_execution_id).await?;
        let graph = slot.lock().await;
        Ok(graph.clone())
    }

    /// Fetch every record of the execution, build its graph from
    /// `starting_id` and cache it, replacing any earlier graph
    #[instrument(skip(self), fields(include_details = self.config.include_details))]
    pub async fn generate(
        &self,
        plan_execution_id: &str,
        starting_id: &str,
    ) -> GraphResult<AdjacencyList> {
        let records = self.store.fetch_records(plan_execution_id).await?;
        debug!(records = records.len(), "fetched records");

        let mut built = graph::generate(starting_id, &records)
            .map_err(|e| self.report(plan_execution_id, e))?;

        if self.config.include_details {
            let ids: Vec<String> = built.ids().into_iter().map(str::to_string).collect();
            for id in ids {
                self.attach_details(plan_execution_id, &mut built, &id).await?;
            }
        }
        self.validate(plan_execution_id, &built)?;

        let slot = self.slot(plan_execution_id).await;
        let mut cached = slot.lock().await;
        *cached = built;

        info!(vertices = cached.len(), "generated graph");
        self.events.send_event(GraphEvent::generated(
            plan_execution_id,
            starting_id,
            cached.len(),
        ));
        Ok(cached.clone())
    }

    /// Apply one record to its execution's graph, creating the graph on first use
    #[instrument(
        skip(self, record),
        fields(plan_execution_id = %record.plan_execution_id, vertex_id = %record.id)
    )]
    pub async fn add_vertex(&self, record: &NodeExecutionRecord) -> GraphResult<AddOutcome> {
        let plan_execution_id = record.plan_execution_id.as_str();
        let slot = self.slot(plan_execution_id).await;
        let mut graph = slot.lock().await;

        // Mutate a copy; the cached graph only changes once the update is complete and valid
        let was_empty = graph.is_empty();
        let mut candidate = graph.clone();
        let outcome = graph::add_vertex(&mut candidate, record)
            .map_err(|e| self.report(plan_execution_id, e))?;
        self.validate(plan_execution_id, &candidate)?;
        *graph = candidate;

        match &outcome {
            AddOutcome::Inserted {
                placement,
                reconciled,
            } => {
                if *placement == Placement::Root && !was_empty && self.config.log_orphan_roots {
                    warn!(
                        created_at = record.created_at,
                        "record has no parent or previous link, starting a new component"
                    );
                }
                self.events.send_event(GraphEvent::vertex_added(
                    plan_execution_id,
                    &record.id,
                    placement.clone(),
                ));
                for waiter in reconciled {
                    self.events.send_event(GraphEvent::vertex_reconciled(
                        plan_execution_id,
                        waiter,
                        &record.id,
                    ));
                }
            }
            AddOutcome::StatusRefreshed => {
                self.events.send_event(GraphEvent::status_refreshed(
                    plan_execution_id,
                    &record.id,
                    record.display.status,
                ));
            }
            AddOutcome::Duplicate => debug!("duplicate delivery ignored"),
        }

        Ok(outcome)
    }

    #[instrument(
        skip(self, record),
        fields(plan_execution_id = %record.plan_execution_id, vertex_id = %record.id)
    )]
    pub async fn remove_vertex(&self, record: &NodeExecutionRecord) -> GraphResult<()> {
        let plan_execution_id = record.plan_execution_id.as_str();
        let slot = self
            .existing_slot(plan_execution_id)
            .await
            .map_err(|_| GraphError::not_found(&record.id))?;
        let mut graph = slot.lock().await;

        let mut candidate = graph.clone();
        graph::remove_vertex(&mut candidate, record)
            .map_err(|e| self.report(plan_execution_id, e))?;
        self.validate(plan_execution_id, &candidate)?;
        *graph = candidate;

        self.events
            .send_event(GraphEvent::vertex_removed(plan_execution_id, &record.id));
        Ok(())
    }

    /// Downstream closure of `starting_id` in the cached graph
    #[instrument(skip(self))]
    pub async fn extract_subgraph(
        &self,
        plan_execution_id: &str,
        starting_id: &str,
    ) -> GraphResult<AdjacencyList> {
        let slot = self.existing_slot(plan_execution_id).await?;
        let graph = slot.lock().await;
        graph::extract_subgraph(&graph, starting_id).map_err(|e| self.report(plan_execution_id, e))
    }

    #[instrument(skip(self))]
    pub async fn traverse(
        &self,
        plan_execution_id: &str,
        start: &str,
        order: TraversalOrder,
    ) -> GraphResult<Vec<String>> {
        let slot = self.existing_slot(plan_execution_id).await?;
        let graph = slot.lock().await;
        graph::traverse(&graph, start, order).map_err(|e| self.report(plan_execution_id, e))
    }

    /// Fetch outcomes and step details of one vertex on first request
    ///
    /// The execution's mutex is held across the fetch, so concurrent callers
    /// never fetch the same vertex twice.
    #[instrument(skip(self))]
    pub async fn resolve_details(
        &self,
        plan_execution_id: &str,
        vertex_id: &str,
    ) -> GraphResult<GraphVertex> {
        let slot = self.existing_slot(plan_execution_id).await?;
        let mut graph = slot.lock().await;
        self.attach_details(plan_execution_id, &mut graph, vertex_id)
            .await?;

        graph
            .vertex(vertex_id)
            .cloned()
            .ok_or_else(|| GraphError::not_found(vertex_id))
    }

    /// Persist the cached graph to the snapshot directory
    #[instrument(skip(self))]
    pub async fn snapshot(&self, plan_execution_id: &str) -> GraphResult<PathBuf> {
        let slot = self.existing_slot(plan_execution_id).await?;
        let graph = slot.lock().await;
        let path = self.snapshots.save(plan_execution_id, &graph)?;
        debug!(path = %path.display(), "wrote snapshot");
        Ok(path)
    }

    /// Replace the cached graph with its last snapshot
    #[instrument(skip(self))]
    pub async fn rehydrate(&self, plan_execution_id: &str) -> GraphResult<usize> {
        let loaded = self.snapshots.load(plan_execution_id)?;
        self.validate(plan_execution_id, &loaded)?;

        let starting_id = loaded
            .roots()
            .first()
            .map(|root| root.id.clone())
            .unwrap_or_default();
        let vertex_count = loaded.len();

        let slot = self.slot(plan_execution_id).await;
        *slot.lock().await = loaded;

        info!(vertices = vertex_count, "rehydrated graph from snapshot");
        self.events.send_event(GraphEvent::generated(
            plan_execution_id,
            starting_id,
            vertex_count,
        ));
        Ok(vertex_count)
    }

    /// Discard the cached graph; returns whether one existed
    #[instrument(skip(self))]
    pub async fn archive(&self, plan_execution_id: &str) -> bool {
        let removed = self.graphs.write().await.remove(plan_execution_id);
        if removed.is_some() {
            info!("archived graph");
            self.events.send_event(GraphEvent::archived(plan_execution_id));
        }
        removed.is_some()
    }

    async fn slot(&self, plan_execution_id: &str) -> GraphSlot {
        if let Some(slot) = self.graphs.read().await.get(plan_execution_id) {
            return slot.clone();
        }
        let mut graphs = self.graphs.write().await;
        graphs
            .entry(plan_execution_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(AdjacencyList::new())))
            .clone()
    }

    async fn existing_slot(&self, plan_execution_id: &str) -> GraphResult<GraphSlot> {
        self.graphs
            .read()
            .await
            .get(plan_execution_id)
            .cloned()
            .ok_or_else(|| GraphError::not_found(format!("graph for {}", plan_execution_id)))
    }

    async fn attach_details(
        &self,
        plan_execution_id: &str,
        graph: &mut AdjacencyList,
        vertex_id: &str,
    ) -> GraphResult<()> {
        match graph.vertex(vertex_id) {
            None => return Err(GraphError::not_found(vertex_id)),
            Some(vertex) if vertex.has_details() => return Ok(()),
            Some(_) => {}
        }

        let outcomes = self.store.fetch_outcomes(plan_execution_id, vertex_id).await?;
        let step_details = self
            .store
            .fetch_step_details(plan_execution_id, vertex_id)
            .await?;

        if let Some(vertex) = graph.vertex_mut(vertex_id) {
            self.converter.attach_details(vertex, outcomes, step_details);
        }
        Ok(())
    }

    fn validate(&self, plan_execution_id: &str, graph: &AdjacencyList) -> GraphResult<()> {
        if !self.config.validate_after_mutation {
            return Ok(());
        }
        check_invariants(graph).map_err(|e| self.report(plan_execution_id, e))
    }

    /// Corruption is always logged with its execution before it is returned
    fn report(&self, plan_execution_id: &str, err: GraphError) -> GraphError {
        if let GraphError::GraphCorruption { id, budget } = &err {
            error!(plan_execution_id, vertex_id = %id, budget, "graph corruption detected");
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event_channel;
    use crate::models::{ExecutionMode, ExecutionStatus};
    use crate::store::InMemoryStore;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(id: &str, created_at: i64) -> NodeExecutionRecord {
        NodeExecutionRecord::new("plan-1", id, created_at)
    }

    async fn seeded_store() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.insert_record(record("root", 0)).await;
        store.insert_record(record("build", 1).with_parent("root")).await;
        store
            .insert_record(
                record("retry0", 2)
                    .with_parent("build")
                    .with_mode(ExecutionMode::Chain),
            )
            .await;
        store
            .insert_record(
                record("retry1", 3)
                    .with_parent("build")
                    .with_mode(ExecutionMode::Chain),
            )
            .await;
        store
            .insert_outcomes("build", HashMap::from([("image".to_string(), json!("app:1"))]))
            .await;
        store
    }

    fn config(temp: &TempDir) -> EngineConfig {
        EngineConfig::default()
            .with_snapshot_dir(temp.path())
            .with_validation(true)
    }

    #[tokio::test]
    async fn test_generate_caches_graph() {
        let temp = TempDir::new().unwrap();
        let (tx, mut rx) = event_channel();
        let service = GraphService::new(seeded_store().await, config(&temp)).with_events(tx);

        let graph = service.generate("plan-1", "root").await.unwrap();
        assert_eq!(graph.len(), 4);
        assert_eq!(service.cached_executions().await, vec!["plan-1"]);
        assert!(graph.vertex("build").unwrap().outcomes.is_none());

        let event = rx.recv().await.unwrap();
        assert_eq!(event, GraphEvent::generated("plan-1", "root", 4));
    }

    #[tokio::test]
    async fn test_generate_with_details() {
        let temp = TempDir::new().unwrap();
        let service = GraphService::new(seeded_store().await, config(&temp).with_details(true));

        let graph = service.generate("plan-1", "root").await.unwrap();
        let build = graph.vertex("build").unwrap();
        assert!(build.has_details());
        assert_eq!(build.outcomes.as_ref().unwrap()["image"], "app:1");
        assert_eq!(service.store().detail_fetches(), 8);
    }

    #[tokio::test]
    async fn test_generate_missing_start() {
        let temp = TempDir::new().unwrap();
        let service = GraphService::new(seeded_store().await, config(&temp));

        let err = service.generate("plan-1", "nope").await.unwrap_err();
        assert!(matches!(err, GraphError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_upstream_failure_is_retryable() {
        let temp = TempDir::new().unwrap();
        let store = seeded_store().await;
        store.set_unavailable(true);
        let service = GraphService::new(store, config(&temp));

        let err = service.generate("plan-1", "root").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(service.cached_executions().await.is_empty());
    }

    #[tokio::test]
    async fn test_incremental_updates_emit_events() {
        let temp = TempDir::new().unwrap();
        let (tx, mut rx) = event_channel();
        let service = GraphService::new(InMemoryStore::new(), config(&temp)).with_events(tx);

        let child = record("child", 2).with_parent("root");
        service.add_vertex(&child).await.unwrap();
        service.add_vertex(&record("root", 1)).await.unwrap();
        let refreshed = service
            .add_vertex(&child.clone().with_status(ExecutionStatus::Running))
            .await
            .unwrap();
        assert_eq!(refreshed, AddOutcome::StatusRefreshed);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                GraphEvent::vertex_added(
                    "plan-1",
                    "child",
                    Placement::AwaitingParent {
                        parent: "root".to_string()
                    }
                ),
                GraphEvent::vertex_added("plan-1", "root", Placement::Root),
                GraphEvent::vertex_reconciled("plan-1", "child", "root"),
                GraphEvent::status_refreshed("plan-1", "child", ExecutionStatus::Running),
            ]
        );

        let order = service
            .traverse("plan-1", "root", TraversalOrder::Bfs)
            .await
            .unwrap();
        assert_eq!(order, vec!["root", "child"]);
    }

    #[tokio::test]
    async fn test_remove_vertex() {
        let temp = TempDir::new().unwrap();
        let service = GraphService::new(InMemoryStore::new(), config(&temp));

        let err = service.remove_vertex(&record("a", 1)).await.unwrap_err();
        assert!(matches!(err, GraphError::NotFound(ref id) if id == "a"));

        service.add_vertex(&record("a", 1)).await.unwrap();
        service.remove_vertex(&record("a", 1)).await.unwrap();
        assert!(service.graph("plan-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_executions_are_isolated() {
        let temp = TempDir::new().unwrap();
        let service = GraphService::new(InMemoryStore::new(), config(&temp));

        service.add_vertex(&record("a", 1)).await.unwrap();
        service
            .add_vertex(&NodeExecutionRecord::new("plan-2", "a", 1).with_parent("elsewhere"))
            .await
            .unwrap();

        assert!(service.graph("plan-1").await.unwrap().roots().len() == 1);
        assert!(service.graph("plan-2").await.unwrap().is_placeholder("elsewhere"));
    }

    #[tokio::test]
    async fn test_extract_subgraph() {
        let temp = TempDir::new().unwrap();
        let service = GraphService::new(seeded_store().await, config(&temp));
        service.generate("plan-1", "root").await.unwrap();

        let subgraph = service.extract_subgraph("plan-1", "build").await.unwrap();
        assert_eq!(subgraph.ids(), vec!["build", "retry0", "retry1"]);

        let err = service.extract_subgraph("plan-9", "build").await.unwrap_err();
        assert!(matches!(err, GraphError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_resolve_details_fetches_once() {
        let temp = TempDir::new().unwrap();
        let service = Arc::new(GraphService::new(seeded_store().await, config(&temp)));
        service.generate("plan-1", "root").await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service.resolve_details("plan-1", "build").await
            }));
        }
        for handle in handles {
            let vertex = handle.await.unwrap().unwrap();
            assert!(vertex.has_details());
        }

        // One outcome fetch plus one step-detail fetch
        assert_eq!(service.store().detail_fetches(), 2);
    }

    #[tokio::test]
    async fn test_snapshot_and_rehydrate() {
        let temp = TempDir::new().unwrap();
        let service = GraphService::new(seeded_store().await, config(&temp));
        let original = service.generate("plan-1", "root").await.unwrap();

        service.snapshot("plan-1").await.unwrap();
        assert!(service.archive("plan-1").await);
        assert!(!service.archive("plan-1").await);
        assert!(service.graph("plan-1").await.is_err());

        let count = service.rehydrate("plan-1").await.unwrap();
        assert_eq!(count, 4);
        assert_eq!(service.graph("plan-1").await.unwrap(), original);
    }

    #[tokio::test]
    async fn test_corruption_surfaces_from_mutation() {
        let temp = TempDir::new().unwrap();
        let service = GraphService::new(InMemoryStore::new(), config(&temp));
        service.add_vertex(&record("P", 0)).await.unwrap();
        service
            .add_vertex(&record("c0", 1).with_parent("P").with_mode(ExecutionMode::Chain))
            .await
            .unwrap();
        service
            .add_vertex(&record("c1", 2).with_parent("P").with_mode(ExecutionMode::Chain))
            .await
            .unwrap();

        {
            let slot = service.existing_slot("plan-1").await.unwrap();
            let mut graph = slot.lock().await;
            crate::graph::incremental::tests::force_next(&mut graph, "c1", "c0");
        }

        let err = service
            .add_vertex(&record("c2", 3).with_parent("P").with_mode(ExecutionMode::Chain))
            .await
            .unwrap_err();
        assert!(err.is_invariant_violation());
    }

    #[tokio::test]
    async fn test_failed_mutation_leaves_cached_graph_untouched() {
        let temp = TempDir::new().unwrap();
        let service = GraphService::new(InMemoryStore::new(), config(&temp));
        service.add_vertex(&record("a", 1)).await.unwrap();
        service.add_vertex(&record("b", 2).with_previous("a")).await.unwrap();
        service.add_vertex(&record("lone", 3)).await.unwrap();

        {
            let slot = service.existing_slot("plan-1").await.unwrap();
            let mut graph = slot.lock().await;
            crate::graph::incremental::tests::force_next(&mut graph, "b", "a");
        }
        let before = service.graph("plan-1").await.unwrap();

        let err = service.add_vertex(&record("z", 4)).await.unwrap_err();
        assert!(err.is_invariant_violation());
        let err = service.remove_vertex(&record("lone", 3)).await.unwrap_err();
        assert!(err.is_invariant_violation());

        let after = service.graph("plan-1").await.unwrap();
        assert_eq!(after, before);
        assert!(!after.contains("z"));
        assert!(after.contains("lone"));
    }

    #[tokio::test]
    async fn test_back_link_keeps_cached_graph_valid() {
        let temp = TempDir::new().unwrap();
        let service = GraphService::new(InMemoryStore::new(), config(&temp));
        service.add_vertex(&record("a", 1)).await.unwrap();
        service
            .add_vertex(&record("b", 2).with_previous("a").with_next("a"))
            .await
            .unwrap();

        service.add_vertex(&record("c", 3).with_parent("p")).await.unwrap();
        let err = service
            .add_vertex(&record("p", 4).with_previous("c"))
            .await
            .unwrap_err();
        assert!(err.is_invariant_violation());

        let graph = service.graph("plan-1").await.unwrap();
        check_invariants(&graph).unwrap();
        assert!(graph.edge_list("b").unwrap().next_ids().is_empty());
        assert!(!graph.contains("p"));
    }
}
