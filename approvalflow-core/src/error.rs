//! Error taxonomy for the approval engine
//!
//! Every failure leaves workflows, stages and the role graph exactly as they
//! were before the failed call.

use thiserror::Error;
use uuid::Uuid;

/// Errors returned by the engine, the role resolver and the stores
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApprovalError {
    /// Malformed input, rejected before any mutation
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Unknown workflow, stage or role
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Operation attempted on a workflow that is already terminal
    #[error("Workflow {workflow_id} is {status} and cannot change")]
    InvalidState { workflow_id: Uuid, status: String },

    /// An earlier stage is still undecided
    #[error("Stage {stage_order} is not actionable while stage {blocking_order} is pending")]
    StageNotActionable {
        stage_order: u32,
        blocking_order: u32,
    },

    /// Actor role cannot satisfy the stage's required role
    #[error("Role '{actor_role}' cannot act for required role '{required_role}'")]
    Unauthorized {
        actor_role: String,
        required_role: String,
    },

    /// Lost a race against another decision or cancellation
    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    /// Role hierarchy edge would close a cycle
    #[error("Cycle detected: '{child}' already reaches '{parent}'")]
    CycleDetected { parent: String, child: String },

    /// Underlying store or audit sink failed
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl ApprovalError {
    pub fn workflow_not_found(id: Uuid) -> Self {
        Self::NotFound {
            kind: "Workflow",
            id: id.to_string(),
        }
    }

    pub fn stage_not_found(id: Uuid) -> Self {
        Self::NotFound {
            kind: "Stage",
            id: id.to_string(),
        }
    }

    pub fn role_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Role",
            id: name.into(),
        }
    }

    /// Whether the caller may re-fetch and try again
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrentModification(_))
    }
}

pub type Result<T> = std::result::Result<T, ApprovalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ApprovalError::Unauthorized {
            actor_role: "EstatesOfficer".to_string(),
            required_role: "Admin".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Role 'EstatesOfficer' cannot act for required role 'Admin'"
        );

        let err = ApprovalError::role_not_found("Auditor");
        assert_eq!(err.to_string(), "Role not found: Auditor");
    }

    #[test]
    fn test_conflict_classification() {
        assert!(ApprovalError::ConcurrentModification("stage".to_string()).is_conflict());
        assert!(!ApprovalError::Validation("empty".to_string()).is_conflict());
    }
}
