//! Approval workflow data models

use crate::error::{ApprovalError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Workflow-level status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// At least one stage is still undecided
    Pending,
    /// Every stage resolved without a required rejection
    Approved,
    /// A required stage was rejected
    Rejected,
    /// Withdrawn explicitly before completion
    Cancelled,
}

impl WorkflowStatus {
    /// No transition leaves a terminal status
    pub fn is_terminal(self) -> bool {
        !matches!(self, WorkflowStatus::Pending)
    }

    /// Integer code used by row-oriented stores
    pub fn code(self) -> i32 {
        match self {
            WorkflowStatus::Pending => 0,
            WorkflowStatus::Approved => 1,
            WorkflowStatus::Rejected => 2,
            WorkflowStatus::Cancelled => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::Approved => "approved",
            WorkflowStatus::Rejected => "rejected",
            WorkflowStatus::Cancelled => "cancelled",
        }
    }
}

impl TryFrom<i32> for WorkflowStatus {
    type Error = ApprovalError;

    fn try_from(code: i32) -> Result<Self> {
        match code {
            0 => Ok(WorkflowStatus::Pending),
            1 => Ok(WorkflowStatus::Approved),
            2 => Ok(WorkflowStatus::Rejected),
            3 => Ok(WorkflowStatus::Cancelled),
            other => Err(ApprovalError::Validation(format!(
                "Unknown workflow status code {}",
                other
            ))),
        }
    }
}

impl std::str::FromStr for WorkflowStatus {
    type Err = ApprovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(WorkflowStatus::Pending),
            "approved" => Ok(WorkflowStatus::Approved),
            "rejected" => Ok(WorkflowStatus::Rejected),
            "cancelled" | "canceled" => Ok(WorkflowStatus::Cancelled),
            other => Err(ApprovalError::Validation(format!(
                "Unknown workflow status '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage-level status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Approved,
    Rejected,
    /// Closed without a decision after a required rejection
    Skipped,
}

impl StageStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, StageStatus::Pending)
    }

    /// Whether an actor's decision was committed on the stage
    pub fn is_decided(self) -> bool {
        matches!(self, StageStatus::Approved | StageStatus::Rejected)
    }

    pub fn code(self) -> i32 {
        match self {
            StageStatus::Pending => 0,
            StageStatus::Approved => 1,
            StageStatus::Rejected => 2,
            StageStatus::Skipped => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Approved => "approved",
            StageStatus::Rejected => "rejected",
            StageStatus::Skipped => "skipped",
        }
    }
}

impl TryFrom<i32> for StageStatus {
    type Error = ApprovalError;

    fn try_from(code: i32) -> Result<Self> {
        match code {
            0 => Ok(StageStatus::Pending),
            1 => Ok(StageStatus::Approved),
            2 => Ok(StageStatus::Rejected),
            3 => Ok(StageStatus::Skipped),
            other => Err(ApprovalError::Validation(format!(
                "Unknown stage status code {}",
                other
            ))),
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision an actor submits for a stage
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn stage_status(self) -> StageStatus {
        match self {
            Decision::Approve => StageStatus::Approved,
            Decision::Reject => StageStatus::Rejected,
        }
    }
}

/// Scalar value carried in workflow metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl MetadataValue {
    /// Infer the narrowest scalar type from raw text (`true`, `42`, `1.5`, anything else)
    ///
    /// Numbers only win when nothing is lost: `007` and `+5` stay text, and so
    /// do `NaN` and `inf`, which JSON cannot carry.
    pub fn infer(raw: &str) -> Self {
        if let Ok(b) = raw.parse::<bool>() {
            return MetadataValue::Bool(b);
        }
        if let Ok(i) = raw.parse::<i64>() {
            if i.to_string() == raw {
                return MetadataValue::Integer(i);
            }
        } else if let Ok(f) = raw.parse::<f64>() {
            if f.is_finite() {
                return MetadataValue::Float(f);
            }
        }
        MetadataValue::Text(raw.to_string())
    }

    /// Whether the value survives a JSON round trip
    pub fn is_representable(&self) -> bool {
        match self {
            MetadataValue::Float(f) => f.is_finite(),
            _ => true,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Integer(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

/// One stage of a workflow as supplied by the calling module
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageDefinition {
    /// Role whose holders (or delegates) may decide the stage
    pub role: String,
    /// Whether rejecting this stage rejects the whole workflow
    #[serde(default = "default_is_required")]
    pub is_required: bool,
    /// Explicit 1-based position; when given on every stage it decides the sequence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
}

fn default_is_required() -> bool {
    true
}

impl StageDefinition {
    pub fn required(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            is_required: true,
            order: None,
        }
    }

    pub fn optional(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            is_required: false,
            order: None,
        }
    }
}

/// Input for creating a workflow instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWorkflow {
    /// Business process key, e.g. "Lease"
    pub module: String,
    pub entity_id: String,
    pub entity_type: String,
    pub created_by: String,
    /// Ordered stage list; position N becomes order N + 1
    pub stages: Vec<StageDefinition>,
    #[serde(default)]
    pub metadata: BTreeMap<String, MetadataValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

/// One ordered step of a workflow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApprovalStage {
    pub id: Uuid,
    /// Owning workflow
    pub workflow_id: Uuid,
    /// 1-based position, fixed at creation
    pub order: u32,
    pub required_role: String,
    pub status: StageStatus,
    pub is_required: bool,
    /// Actor who decided the stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

/// Workflow instance gating one external entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApprovalWorkflow {
    pub id: Uuid,
    pub module: String,
    pub entity_id: String,
    pub entity_type: String,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub last_updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, MetadataValue>,
    /// Stages sorted by `order`
    pub stages: Vec<ApprovalStage>,
    /// Row version; bumped by the store on every committed update
    #[serde(default)]
    pub version: u64,
}

impl ApprovalWorkflow {
    /// Build a pending workflow; orders are reassigned 1..=N following the
    /// explicit orders when every stage has one, input position otherwise
    pub fn from_request(request: NewWorkflow, now: DateTime<Utc>) -> Self {
        let id = Uuid::new_v4();
        let mut definitions = request.stages;
        if definitions.iter().all(|d| d.order.is_some()) {
            definitions.sort_by_key(|d| d.order);
        }

        let stages = definitions
            .into_iter()
            .enumerate()
            .map(|(index, def)| ApprovalStage {
                id: Uuid::new_v4(),
                workflow_id: id,
                order: index as u32 + 1,
                required_role: def.role,
                status: StageStatus::Pending,
                is_required: def.is_required,
                approved_by: None,
                approved_at: None,
                comments: None,
            })
            .collect();

        Self {
            id,
            module: request.module,
            entity_id: request.entity_id,
            entity_type: request.entity_type,
            status: WorkflowStatus::Pending,
            created_at: now,
            created_by: request.created_by,
            last_updated_at: now,
            comments: request.comments,
            metadata: request.metadata,
            stages,
            version: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn stage(&self, stage_id: Uuid) -> Option<&ApprovalStage> {
        self.stages.iter().find(|s| s.id == stage_id)
    }

    pub fn stage_by_order(&self, order: u32) -> Option<&ApprovalStage> {
        self.stages.iter().find(|s| s.order == order)
    }

    /// The lowest-order pending stage, the only one that may be decided
    pub fn actionable_stage(&self) -> Option<&ApprovalStage> {
        self.stages
            .iter()
            .filter(|s| s.status == StageStatus::Pending)
            .min_by_key(|s| s.order)
    }

    pub fn has_pending_stage_for(&self, role: &str) -> bool {
        self.stages
            .iter()
            .any(|s| s.status == StageStatus::Pending && s.required_role == role)
    }

    /// Stage orders must be exactly 1..=N in sequence and owned by this workflow
    pub fn check_stage_orders(&self) -> Result<()> {
        if self.stages.is_empty() {
            return Err(ApprovalError::Validation(
                "Workflow must contain at least one stage".to_string(),
            ));
        }

        for (index, stage) in self.stages.iter().enumerate() {
            let expected = index as u32 + 1;
            if stage.order != expected {
                return Err(ApprovalError::Validation(format!(
                    "Stage orders must be contiguous from 1: expected {} at position {}, found {}",
                    expected, index, stage.order
                )));
            }
            if stage.workflow_id != self.id {
                return Err(ApprovalError::Validation(format!(
                    "Stage {} belongs to workflow {}, not {}",
                    stage.id, stage.workflow_id, self.id
                )));
            }
        }

        Ok(())
    }
}

/// A stage decision submitted by an actor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub workflow_id: Uuid,
    pub stage_id: Uuid,
    /// Role the actor is acting under
    pub actor_role: String,
    pub decision: Decision,
    pub actor_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}
