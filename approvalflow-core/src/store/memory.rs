//! In-memory workflow store

use crate::error::{ApprovalError, Result};
use crate::models::workflow::{ApprovalWorkflow, WorkflowStatus};
use crate::store::{check_update, is_pending_for, WorkflowStore};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

/// Workflows held in a concurrent map; each update holds the entry's shard
/// lock for the whole compare-and-swap
#[derive(Default)]
pub struct InMemoryWorkflowStore {
    workflows: DashMap<Uuid, ApprovalWorkflow>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn collect_sorted<F>(&self, filter: F) -> Vec<ApprovalWorkflow>
    where
        F: Fn(&ApprovalWorkflow) -> bool,
    {
        let mut workflows: Vec<ApprovalWorkflow> = self
            .workflows
            .iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        workflows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        workflows
    }
}

impl WorkflowStore for InMemoryWorkflowStore {
    fn create(&self, mut workflow: ApprovalWorkflow) -> Result<ApprovalWorkflow> {
        workflow.check_stage_orders()?;
        workflow.version = 1;

        match self.workflows.entry(workflow.id) {
            Entry::Occupied(_) => Err(ApprovalError::Validation(format!(
                "Workflow {} already exists",
                workflow.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(workflow.clone());
                Ok(workflow)
            }
        }
    }

    fn get_by_id(&self, id: Uuid) -> Result<ApprovalWorkflow> {
        self.workflows
            .get(&id)
            .map(|w| w.clone())
            .ok_or_else(|| ApprovalError::workflow_not_found(id))
    }

    fn get_by_entity(&self, module: &str, entity_id: &str) -> Result<ApprovalWorkflow> {
        self.collect_sorted(|w| w.module == module && w.entity_id == entity_id)
            .pop()
            .ok_or_else(|| ApprovalError::NotFound {
                kind: "Workflow",
                id: format!("{}/{}", module, entity_id),
            })
    }

    fn get_pending_workflows(&self, module: &str, role: &str) -> Result<Vec<ApprovalWorkflow>> {
        Ok(self.collect_sorted(|w| is_pending_for(w, module, role)))
    }

    fn get_by_status(&self, module: &str, status: WorkflowStatus) -> Result<Vec<ApprovalWorkflow>> {
        Ok(self.collect_sorted(|w| w.module == module && w.status == status))
    }

    fn update(&self, workflow: &ApprovalWorkflow) -> Result<ApprovalWorkflow> {
        let mut stored = self
            .workflows
            .get_mut(&workflow.id)
            .ok_or_else(|| ApprovalError::workflow_not_found(workflow.id))?;

        check_update(&stored, workflow)?;

        let mut next = workflow.clone();
        next.version = stored.version + 1;
        *stored = next.clone();
        Ok(next)
    }

    fn delete(&self, id: Uuid) -> Result<()> {
        self.workflows
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| ApprovalError::workflow_not_found(id))
    }
}
