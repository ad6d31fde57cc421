//! Immutable audit records for role and workflow mutations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What the audit entry is about
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditTarget {
    Role { role_id: Uuid },
    Hierarchy { parent_role_id: Uuid, child_role_id: Uuid },
    Workflow { workflow_id: Uuid },
    Stage { workflow_id: Uuid, stage_id: Uuid },
}

impl AuditTarget {
    /// Whether the entry concerns the given workflow or one of its stages
    pub fn concerns_workflow(&self, id: Uuid) -> bool {
        match self {
            AuditTarget::Workflow { workflow_id } | AuditTarget::Stage { workflow_id, .. } => {
                *workflow_id == id
            }
            _ => false,
        }
    }

    /// Whether the entry concerns the given role or an edge touching it
    pub fn concerns_role(&self, id: Uuid) -> bool {
        match self {
            AuditTarget::Role { role_id } => *role_id == id,
            AuditTarget::Hierarchy {
                parent_role_id,
                child_role_id,
            } => *parent_role_id == id || *child_role_id == id,
            _ => false,
        }
    }
}

/// Kind of mutation recorded
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Approve,
    Reject,
    Cancel,
    /// Hierarchy edge added
    Assign,
    /// Hierarchy edge removed
    Remove,
    /// Workflow status derived to a new value
    StatusChange,
}

/// Append-only audit record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    pub id: Uuid,
    pub target: AuditTarget,
    pub action: AuditAction,
    pub performed_by: String,
    pub performed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl AuditEntry {
    pub fn new(target: AuditTarget, action: AuditAction, performed_by: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            action,
            performed_by: performed_by.into(),
            performed_at: Utc::now(),
            old_value: None,
            new_value: None,
            notes: None,
        }
    }

    pub fn with_values(
        mut self,
        old_value: Option<serde_json::Value>,
        new_value: Option<serde_json::Value>,
    ) -> Self {
        self.old_value = old_value;
        self.new_value = new_value;
        self
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_serialization() {
        let id = Uuid::nil();
        let json = serde_json::to_value(AuditTarget::Workflow { workflow_id: id }).unwrap();
        assert_eq!(json["kind"], "workflow");
    }

    #[test]
    fn test_target_matching() {
        let workflow_id = Uuid::new_v4();
        let stage = AuditTarget::Stage {
            workflow_id,
            stage_id: Uuid::new_v4(),
        };
        assert!(stage.concerns_workflow(workflow_id));
        assert!(!stage.concerns_role(workflow_id));

        let parent = Uuid::new_v4();
        let edge = AuditTarget::Hierarchy {
            parent_role_id: parent,
            child_role_id: Uuid::new_v4(),
        };
        assert!(edge.concerns_role(parent));
    }
}
