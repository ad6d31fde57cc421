//! Approval engine: creation, decisions, cancellation and queries

use crate::error::{ApprovalError, Result};
use crate::models::audit::{AuditAction, AuditEntry, AuditTarget};
use crate::models::workflow::{
    ApprovalWorkflow, Decision, DecisionRequest, NewWorkflow, WorkflowStatus,
};
use crate::roles::RoleResolver;
use crate::services::audit::AuditRecorder;
use crate::services::logging::log_refusal;
use crate::store::WorkflowStore;
use crate::workflow::events::{EventPublisher, WorkflowEvent};
use crate::workflow::transition::{apply_cancel, apply_decision, check_actionable};
use crate::workflow::validator::WorkflowValidator;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Drives approval workflows through their stages
///
/// Every state change is committed through the store's compare-and-swap and
/// then audited. When the audit entry cannot be written the commit is undone,
/// so a caller never observes a change without its audit record.
pub struct ApprovalEngine {
    /// Workflow persistence
    store: Arc<dyn WorkflowStore>,
    /// Role lookups and delegation checks
    resolver: Arc<RoleResolver>,
    audit: AuditRecorder,
    events: EventPublisher,
}

impl ApprovalEngine {
    /// Create an engine auditing through the resolver's recorder
    pub fn new(store: Arc<dyn WorkflowStore>, resolver: Arc<RoleResolver>) -> Self {
        let audit = resolver.audit().clone();
        Self::with_audit(store, resolver, audit)
    }

    pub fn with_audit(
        store: Arc<dyn WorkflowStore>,
        resolver: Arc<RoleResolver>,
        audit: AuditRecorder,
    ) -> Self {
        Self {
            store,
            resolver,
            audit,
            events: EventPublisher::new(),
        }
    }

    pub fn resolver(&self) -> &RoleResolver {
        &self.resolver
    }

    /// Receive an event each time a workflow reaches a terminal status
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.events.subscribe()
    }

    /// Start a workflow in `Pending` with every stage pending
    pub fn create_workflow(&self, request: NewWorkflow) -> Result<ApprovalWorkflow> {
        let warnings =
            WorkflowValidator::validate_new_workflow(&request, |role| {
                self.resolver.is_known_role(role)
            })
            .into_result()
            .map_err(|e| refused("create_workflow", &request.created_by, e))?;

        for warning in &warnings {
            tracing::warn!(module = %request.module, entity_id = %request.entity_id, "{}", warning);
        }

        let workflow = self
            .store
            .create(ApprovalWorkflow::from_request(request, Utc::now()))?;

        let entry = AuditEntry::new(
            AuditTarget::Workflow {
                workflow_id: workflow.id,
            },
            AuditAction::Create,
            workflow.created_by.as_str(),
        )
        .with_values(None, serde_json::to_value(&workflow).ok())
        .with_notes(workflow.comments.clone());

        if let Err(e) = self.audit.record(entry) {
            if let Err(undo) = self.store.delete(workflow.id) {
                tracing::error!(workflow_id = %workflow.id, error = %undo, "Failed to undo unaudited workflow creation");
            }
            return Err(e);
        }

        tracing::info!(
            workflow_id = %workflow.id,
            module = %workflow.module,
            entity_id = %workflow.entity_id,
            stages = workflow.stages.len(),
            "Workflow created"
        );
        Ok(workflow)
    }

    /// Approve or reject the current stage on behalf of `request.actor_role`
    ///
    /// Of several concurrent decisions on the same stage exactly one commits;
    /// the others get `ConcurrentModification` and change nothing.
    pub fn decide(&self, request: DecisionRequest) -> Result<WorkflowStatus> {
        let current = self.store.get_by_id(request.workflow_id)?;
        let index = check_actionable(&current, request.stage_id)
            .map_err(|e| refused("decide", &request.actor_id, e))?;

        let required_role = current.stages[index].required_role.clone();
        if !self.resolver.can_satisfy(&request.actor_role, &required_role) {
            return Err(refused(
                "decide",
                &request.actor_id,
                ApprovalError::Unauthorized {
                    actor_role: request.actor_role.clone(),
                    required_role,
                },
            ));
        }

        let mut next = current.clone();
        apply_decision(
            &mut next,
            index,
            request.decision,
            &request.actor_id,
            request.comments.clone(),
            Utc::now(),
        );

        let committed = self
            .store
            .update(&next)
            .map_err(|e| refused("decide", &request.actor_id, e))?;

        let action = match request.decision {
            Decision::Approve => AuditAction::Approve,
            Decision::Reject => AuditAction::Reject,
        };
        let mut entries = vec![AuditEntry::new(
            AuditTarget::Stage {
                workflow_id: committed.id,
                stage_id: request.stage_id,
            },
            action,
            request.actor_id.as_str(),
        )
        .with_values(
            serde_json::to_value(&current.stages[index]).ok(),
            serde_json::to_value(&committed.stages[index]).ok(),
        )
        .with_notes(request.comments.clone())];

        if committed.status != current.status {
            entries.push(status_change(&current, &committed, &request.actor_id));
        }
        self.record_or_restore(&current, &committed, entries)?;

        tracing::info!(
            workflow_id = %committed.id,
            stage = committed.stages[index].order,
            decision = ?request.decision,
            actor_id = %request.actor_id,
            actor_role = %request.actor_role,
            status = %committed.status,
            "Stage decided"
        );

        if committed.is_terminal() {
            self.events.publish(WorkflowEvent::completed(&committed));
        }
        Ok(committed.status)
    }

    /// Withdraw a pending workflow; stages keep their current status
    pub fn cancel(
        &self,
        workflow_id: Uuid,
        actor_id: &str,
        reason: Option<String>,
    ) -> Result<ApprovalWorkflow> {
        let current = self.store.get_by_id(workflow_id)?;
        let mut next = current.clone();
        apply_cancel(&mut next, reason.clone(), Utc::now())
            .map_err(|e| refused("cancel", actor_id, e))?;

        let committed = self
            .store
            .update(&next)
            .map_err(|e| refused("cancel", actor_id, e))?;

        let entry = AuditEntry::new(
            AuditTarget::Workflow { workflow_id },
            AuditAction::Cancel,
            actor_id,
        )
        .with_values(
            serde_json::to_value(current.status).ok(),
            serde_json::to_value(committed.status).ok(),
        )
        .with_notes(reason);
        self.record_or_restore(&current, &committed, vec![entry])?;

        tracing::info!(workflow_id = %workflow_id, actor_id, "Workflow cancelled");
        self.events.publish(WorkflowEvent::completed(&committed));
        Ok(committed)
    }

    /// Remove a workflow together with its stages
    pub fn delete_workflow(&self, workflow_id: Uuid, actor_id: &str) -> Result<()> {
        let current = self.store.get_by_id(workflow_id)?;
        self.store.delete(workflow_id)?;

        let entry = AuditEntry::new(
            AuditTarget::Workflow { workflow_id },
            AuditAction::Delete,
            actor_id,
        )
        .with_values(serde_json::to_value(&current).ok(), None);

        if let Err(e) = self.audit.record(entry) {
            if let Err(undo) = self.store.create(current) {
                tracing::error!(workflow_id = %workflow_id, error = %undo, "Failed to restore unaudited deletion");
            }
            return Err(e);
        }

        tracing::info!(workflow_id = %workflow_id, actor_id, "Workflow deleted");
        Ok(())
    }

    pub fn get_by_id(&self, workflow_id: Uuid) -> Result<ApprovalWorkflow> {
        self.store.get_by_id(workflow_id)
    }

    /// Most recent workflow for an entity
    pub fn get_by_entity(&self, module: &str, entity_id: &str) -> Result<ApprovalWorkflow> {
        self.store.get_by_entity(module, entity_id)
    }

    /// Pending workflows with a pending stage `role` may act on, oldest first
    pub fn get_pending(&self, module: &str, role: &str) -> Result<Vec<ApprovalWorkflow>> {
        let mut seen = HashSet::new();
        let mut pending = Vec::new();

        for satisfiable in self.resolver.satisfiable_roles(role).iter() {
            for workflow in self.store.get_pending_workflows(module, satisfiable)? {
                if seen.insert(workflow.id) {
                    pending.push(workflow);
                }
            }
        }

        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(pending)
    }

    pub fn get_by_status(
        &self,
        module: &str,
        status: WorkflowStatus,
    ) -> Result<Vec<ApprovalWorkflow>> {
        self.store.get_by_status(module, status)
    }

    /// Audit entries for the workflow and its stages, in append order
    pub fn audit_trail(&self, workflow_id: Uuid) -> Result<Vec<AuditEntry>> {
        self.audit.for_workflow(workflow_id)
    }

    /// Record `entries`; on failure put `prior` back over `committed`
    fn record_or_restore(
        &self,
        prior: &ApprovalWorkflow,
        committed: &ApprovalWorkflow,
        entries: Vec<AuditEntry>,
    ) -> Result<()> {
        let Err(e) = self.audit.record_all(entries) else {
            return Ok(());
        };

        let mut restore = prior.clone();
        restore.version = committed.version;
        if let Err(undo) = self.store.update(&restore) {
            tracing::error!(
                workflow_id = %prior.id,
                error = %undo,
                "Failed to restore workflow after audit failure"
            );
        }
        Err(e)
    }
}

fn status_change(before: &ApprovalWorkflow, after: &ApprovalWorkflow, actor_id: &str) -> AuditEntry {
    AuditEntry::new(
        AuditTarget::Workflow {
            workflow_id: after.id,
        },
        AuditAction::StatusChange,
        actor_id,
    )
    .with_values(
        serde_json::to_value(before.status).ok(),
        serde_json::to_value(after.status).ok(),
    )
}

fn refused(operation: &str, actor: &str, err: ApprovalError) -> ApprovalError {
    log_refusal(operation, actor, &err.to_string());
    err
}
