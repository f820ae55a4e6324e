// Graph Events
// Progress reporting for graph materialization and mutation

use crate::graph::Placement;
use crate::models::ExecutionStatus;

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Sender for graph events
pub type GraphEventSender = mpsc::UnboundedSender<GraphEvent>;

/// Receiver for graph events
pub type GraphEventReceiver = mpsc::UnboundedReceiver<GraphEvent>;

/// Create a new event channel
pub fn event_channel() -> (GraphEventSender, GraphEventReceiver) {
    mpsc::unbounded_channel()
}

/// Wrap a receiver as a `Stream` for consumers built on `StreamExt`
pub fn event_stream(receiver: GraphEventReceiver) -> UnboundedReceiverStream<GraphEvent> {
    UnboundedReceiverStream::new(receiver)
}

/// Events emitted while a plan execution's graph changes
#[derive(Debug, Clone, PartialEq)]
pub enum GraphEvent {
    /// Full graph generated (or rehydrated) and cached
    GraphGenerated {
        plan_execution_id: String,
        starting_id: String,
        vertex_count: usize,
    },

    /// A record was materialized by an incremental update
    VertexAdded {
        plan_execution_id: String,
        vertex_id: String,
        placement: Placement,
    },

    /// A waiting vertex was linked once its missing neighbour arrived
    VertexReconciled {
        plan_execution_id: String,
        vertex_id: String,
        resolved_by: String,
    },

    VertexRemoved {
        plan_execution_id: String,
        vertex_id: String,
    },

    /// Re-delivery of a known record changed its status
    StatusRefreshed {
        plan_execution_id: String,
        vertex_id: String,
        status: ExecutionStatus,
    },

    /// Graph discarded after the execution was archived
    GraphArchived { plan_execution_id: String },
}

impl GraphEvent {
    pub fn generated(
        plan_execution_id: impl Into<String>,
        starting_id: impl Into<String>,
        vertex_count: usize,
    ) -> Self {
        Self::GraphGenerated {
            plan_execution_id: plan_execution_id.into(),
            starting_id: starting_id.into(),
            vertex_count,
        }
    }

    pub fn vertex_added(
        plan_execution_id: impl Into<String>,
        vertex_id: impl Into<String>,
        placement: Placement,
    ) -> Self {
        Self::VertexAdded {
            plan_execution_id: plan_execution_id.into(),
            vertex_id: vertex_id.into(),
            placement,
        }
    }

    pub fn vertex_reconciled(
        plan_execution_id: impl Into<String>,
        vertex_id: impl Into<String>,
        resolved_by: impl Into<String>,
    ) -> Self {
        Self::VertexReconciled {
            plan_execution_id: plan_execution_id.into(),
            vertex_id: vertex_id.into(),
            resolved_by: resolved_by.into(),
        }
    }

    pub fn vertex_removed(plan_execution_id: impl Into<String>, vertex_id: impl Into<String>) -> Self {
        Self::VertexRemoved {
            plan_execution_id: plan_execution_id.into(),
            vertex_id: vertex_id.into(),
        }
    }

    pub fn status_refreshed(
        plan_execution_id: impl Into<String>,
        vertex_id: impl Into<String>,
        status: ExecutionStatus,
    ) -> Self {
        Self::StatusRefreshed {
            plan_execution_id: plan_execution_id.into(),
            vertex_id: vertex_id.into(),
            status,
        }
    }

    pub fn archived(plan_execution_id: impl Into<String>) -> Self {
        Self::GraphArchived {
            plan_execution_id: plan_execution_id.into(),
        }
    }

    /// Plan execution the event belongs to
    pub fn plan_execution_id(&self) -> &str {
        match self {
            Self::GraphGenerated {
                plan_execution_id, ..
            }
            | Self::VertexAdded {
                plan_execution_id, ..
            }
            | Self::VertexReconciled {
                plan_execution_id, ..
            }
            | Self::VertexRemoved {
                plan_execution_id, ..
            }
            | Self::StatusRefreshed {
                plan_execution_id, ..
            }
            | Self::GraphArchived { plan_execution_id } => plan_execution_id,
        }
    }
}

/// Helper trait for sending events, ignoring errors (fire-and-forget)
pub trait EventSender {
    fn send_event(&self, event: GraphEvent);
}

impl EventSender for GraphEventSender {
    fn send_event(&self, event: GraphEvent) {
        let _ = self.send(event);
    }
}

impl EventSender for Option<GraphEventSender> {
    fn send_event(&self, event: GraphEvent) {
        if let Some(sender) = self {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn test_event_channel() {
        let (tx, mut rx) = event_channel();

        tx.send_event(GraphEvent::generated("plan-1", "root", 3));
        tx.send_event(GraphEvent::vertex_removed("plan-1", "a"));

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, GraphEvent::GraphGenerated { vertex_count: 3, .. }));

        let second = rx.recv().await.unwrap();
        assert_eq!(second.plan_execution_id(), "plan-1");
    }

    #[tokio::test]
    async fn test_event_stream() {
        let (tx, rx) = event_channel();
        tx.send_event(GraphEvent::archived("plan-9"));
        drop(tx);

        let events: Vec<GraphEvent> = event_stream(rx).collect().await;
        assert_eq!(events, vec![GraphEvent::archived("plan-9")]);
    }

    #[test]
    fn test_optional_sender() {
        let sender: Option<GraphEventSender> = None;
        // Should not panic
        sender.send_event(GraphEvent::archived("plan-1"));
    }

    #[test]
    fn test_closed_channel_is_ignored() {
        let (tx, rx) = event_channel();
        drop(rx);
        tx.send_event(GraphEvent::vertex_removed("plan-1", "a"));
    }
}
