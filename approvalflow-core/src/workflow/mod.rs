//! Approval workflow state machine

pub mod engine;
pub mod events;
pub mod transition;
pub mod validator;

pub use engine::ApprovalEngine;
pub use events::{EventPublisher, WorkflowEvent};
pub use transition::derive_status;
pub use validator::{ValidationError, ValidationResult, WorkflowValidator};
