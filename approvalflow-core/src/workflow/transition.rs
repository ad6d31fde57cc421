//! Stage transition rules
//!
//! Pure functions over a workflow snapshot. Nothing here touches the store;
//! the engine applies a transition to a working copy and commits it.

use crate::error::{ApprovalError, Result};
use crate::models::workflow::{ApprovalStage, ApprovalWorkflow, Decision, StageStatus, WorkflowStatus};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Workflow status implied by its stages
///
/// A rejected required stage rejects the workflow. While any stage is
/// pending the workflow stays pending. Once none is, only an approved final
/// stage approves it; an optional final stage that was rejected leaves
/// nothing to act on, so the workflow closes as rejected.
pub fn derive_status(stages: &[ApprovalStage]) -> WorkflowStatus {
    if stages
        .iter()
        .any(|s| s.is_required && s.status == StageStatus::Rejected)
    {
        return WorkflowStatus::Rejected;
    }
    if stages.iter().any(|s| s.status == StageStatus::Pending) {
        return WorkflowStatus::Pending;
    }
    match stages.iter().max_by_key(|s| s.order) {
        Some(last) if last.status == StageStatus::Approved => WorkflowStatus::Approved,
        _ => WorkflowStatus::Rejected,
    }
}

/// Check that `stage_id` may be decided right now, ignoring authorization
///
/// Returns the index of the stage in `workflow.stages`.
pub fn check_actionable(workflow: &ApprovalWorkflow, stage_id: Uuid) -> Result<usize> {
    let index = workflow
        .stages
        .iter()
        .position(|s| s.id == stage_id)
        .ok_or_else(|| ApprovalError::stage_not_found(stage_id))?;
    let stage = &workflow.stages[index];

    if stage.status.is_decided() {
        return Err(ApprovalError::ConcurrentModification(format!(
            "stage {} of workflow {} was already {} by {}",
            stage.order,
            workflow.id,
            stage.status,
            stage.approved_by.as_deref().unwrap_or("another actor")
        )));
    }

    if workflow.is_terminal() {
        return Err(ApprovalError::InvalidState {
            workflow_id: workflow.id,
            status: workflow.status.to_string(),
        });
    }

    match workflow.actionable_stage() {
        Some(blocking) if blocking.order < stage.order => Err(ApprovalError::StageNotActionable {
            stage_order: stage.order,
            blocking_order: blocking.order,
        }),
        Some(_) => Ok(index),
        // Pending workflow without a pending stage; treat as closed
        None => Err(ApprovalError::InvalidState {
            workflow_id: workflow.id,
            status: workflow.status.to_string(),
        }),
    }
}

/// Record a decision on the stage at `index` and recompute the workflow status
///
/// A required rejection closes every remaining pending stage as skipped.
pub fn apply_decision(
    workflow: &mut ApprovalWorkflow,
    index: usize,
    decision: Decision,
    actor_id: &str,
    comments: Option<String>,
    now: DateTime<Utc>,
) -> WorkflowStatus {
    let stage = &mut workflow.stages[index];
    stage.status = decision.stage_status();
    stage.approved_by = Some(actor_id.to_string());
    stage.approved_at = Some(now);
    stage.comments = comments;

    if decision == Decision::Reject && stage.is_required {
        for stage in workflow
            .stages
            .iter_mut()
            .filter(|s| s.status == StageStatus::Pending)
        {
            stage.status = StageStatus::Skipped;
        }
    }

    workflow.status = derive_status(&workflow.stages);
    workflow.last_updated_at = now;
    workflow.status
}

/// Move a pending workflow to cancelled, leaving stages untouched
pub fn apply_cancel(
    workflow: &mut ApprovalWorkflow,
    reason: Option<String>,
    now: DateTime<Utc>,
) -> Result<()> {
    if workflow.is_terminal() {
        return Err(ApprovalError::InvalidState {
            workflow_id: workflow.id,
            status: workflow.status.to_string(),
        });
    }

    workflow.status = WorkflowStatus::Cancelled;
    if reason.is_some() {
        workflow.comments = reason;
    }
    workflow.last_updated_at = now;
    Ok(())
}
