//! Completion notifications

use crate::models::workflow::{ApprovalWorkflow, WorkflowStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Buffered events per subscriber before the slowest one starts lagging
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Published once when a workflow reaches a terminal status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowEvent {
    pub workflow_id: Uuid,
    pub module: String,
    pub entity_id: String,
    pub entity_type: String,
    pub status: WorkflowStatus,
    pub at: DateTime<Utc>,
}

impl WorkflowEvent {
    pub fn completed(workflow: &ApprovalWorkflow) -> Self {
        Self {
            workflow_id: workflow.id,
            module: workflow.module.clone(),
            entity_id: workflow.entity_id.clone(),
            entity_type: workflow.entity_type.clone(),
            status: workflow.status,
            at: workflow.last_updated_at,
        }
    }
}

/// Fan-out of workflow events to any number of subscribers
pub struct EventPublisher {
    sender: broadcast::Sender<WorkflowEvent>,
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventPublisher {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.sender.subscribe()
    }

    /// Send to current subscribers; having none is fine
    pub fn publish(&self, event: WorkflowEvent) {
        match self.sender.send(event) {
            Ok(receivers) => tracing::debug!(receivers, "Workflow event published"),
            Err(broadcast::error::SendError(event)) => tracing::trace!(
                workflow_id = %event.workflow_id,
                "No subscribers for workflow event"
            ),
        }
    }
}
