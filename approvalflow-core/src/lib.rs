//! # Approvalflow Core Library
//!
//! Multi-stage approval workflows gated by a delegating role hierarchy:
//! models, role resolution, stores, audit trail and the approval engine.

pub mod error;
pub mod models;
pub mod roles;
pub mod services;
pub mod store;
pub mod workflow;

pub use error::{ApprovalError, Result};
pub use roles::{RoleGraph, RoleResolver};
pub use services::audit::{AuditRecorder, AuditSink, InMemoryAuditLog};
pub use store::{InMemoryWorkflowStore, JsonFileStore, WorkflowStore};
pub use workflow::{ApprovalEngine, WorkflowEvent};
