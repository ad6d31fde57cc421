//! Workflow repository contract and its implementations
//!
//! `update` is a compare-and-swap on the workflow's row version: it commits
//! only if nobody else committed since the caller loaded the workflow. Every
//! decision and cancellation goes through it, which is what guarantees at
//! most one decision per stage.

pub mod memory;
pub mod persistence;

pub use memory::InMemoryWorkflowStore;
pub use persistence::JsonFileStore;

use crate::error::{ApprovalError, Result};
use crate::models::workflow::{ApprovalWorkflow, WorkflowStatus};
use uuid::Uuid;

/// Durable persistence keyed by workflow id (schema `approvalworkflow`)
pub trait WorkflowStore: Send + Sync {
    /// Insert a new workflow with its stages; returns the stored row
    fn create(&self, workflow: ApprovalWorkflow) -> Result<ApprovalWorkflow>;

    fn get_by_id(&self, id: Uuid) -> Result<ApprovalWorkflow>;

    /// Most recently created workflow for the entity
    fn get_by_entity(&self, module: &str, entity_id: &str) -> Result<ApprovalWorkflow>;

    /// Pending workflows with a pending stage requiring exactly `role`
    fn get_pending_workflows(&self, module: &str, role: &str) -> Result<Vec<ApprovalWorkflow>>;

    fn get_by_status(&self, module: &str, status: WorkflowStatus) -> Result<Vec<ApprovalWorkflow>>;

    /// Commit `workflow` if the stored version still equals `workflow.version`
    ///
    /// Returns the stored row with its bumped version, or
    /// `ConcurrentModification` if another commit got there first.
    fn update(&self, workflow: &ApprovalWorkflow) -> Result<ApprovalWorkflow>;

    /// Remove a workflow and, with it, all of its stages
    fn delete(&self, id: Uuid) -> Result<()>;
}

/// Checks shared by all stores before an update commits
pub(crate) fn check_update(stored: &ApprovalWorkflow, incoming: &ApprovalWorkflow) -> Result<()> {
    if stored.version != incoming.version {
        return Err(ApprovalError::ConcurrentModification(format!(
            "workflow {} changed since it was read (version {} != {})",
            stored.id, stored.version, incoming.version
        )));
    }

    let same_shape = stored.stages.len() == incoming.stages.len()
        && stored.stages.iter().zip(&incoming.stages).all(|(a, b)| {
            a.id == b.id
                && a.order == b.order
                && a.required_role == b.required_role
                && a.is_required == b.is_required
        });
    if !same_shape {
        return Err(ApprovalError::Validation(format!(
            "Stage list of workflow {} is immutable",
            stored.id
        )));
    }

    Ok(())
}

pub(crate) fn is_pending_for(workflow: &ApprovalWorkflow, module: &str, role: &str) -> bool {
    workflow.module == module
        && workflow.status == WorkflowStatus::Pending
        && workflow.has_pending_stage_for(role)
}
