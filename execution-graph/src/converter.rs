// Vertex Converter
// Maps node execution records onto display-oriented graph vertices

use crate::graph::{DeclaredLinks, GraphVertex};
use crate::models::{NodeExecutionRecord, OutcomeMap, StepDetailMap};

impl From<&NodeExecutionRecord> for GraphVertex {
    fn from(record: &NodeExecutionRecord) -> Self {
        GraphVertex {
            id: record.id.clone(),
            name: record.display.name.clone(),
            identifier: record.display.identifier.clone(),
            step_type: record.display.step_type.clone(),
            mode: record.execution_mode,
            status: record.display.status,
            created_at: record.created_at,
            started_at: record.display.started_at,
            ended_at: record.display.ended_at,
            declared: DeclaredLinks {
                parent_id: record.parent_id.clone(),
                previous_id: record.previous_id.clone(),
                next_id: record.next_id.clone(),
            },
            outcomes: None,
            step_details: None,
        }
    }
}

/// Stateless record-to-vertex mapping
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphVertexConverter;

impl GraphVertexConverter {
    pub fn new() -> Self {
        Self
    }

    /// Convert without outcomes or step details
    pub fn convert(&self, record: &NodeExecutionRecord) -> GraphVertex {
        GraphVertex::from(record)
    }

    /// Convert and attach already fetched detail maps
    pub fn convert_with_details(
        &self,
        record: &NodeExecutionRecord,
        outcomes: OutcomeMap,
        step_details: StepDetailMap,
    ) -> GraphVertex {
        let mut vertex = self.convert(record);
        self.attach_details(&mut vertex, outcomes, step_details);
        vertex
    }

    pub fn attach_details(
        &self,
        vertex: &mut GraphVertex,
        outcomes: OutcomeMap,
        step_details: StepDetailMap,
    ) {
        vertex.outcomes = Some(outcomes);
        vertex.step_details = Some(step_details);
    }

    /// Whether a re-delivered record changes anything besides status
    pub fn diverges(&self, vertex: &GraphVertex, record: &NodeExecutionRecord) -> bool {
        vertex.mode != record.execution_mode
            || vertex.declared.parent_id != record.parent_id
            || vertex.declared.previous_id != record.previous_id
            || vertex.declared.next_id != record.next_id
    }
}
