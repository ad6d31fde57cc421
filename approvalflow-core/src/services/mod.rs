//! Cross-cutting services: audit trail and logging

pub mod audit;
pub mod logging;

pub use audit::{AuditRecorder, AuditSink, InMemoryAuditLog};
pub use logging::init_logging;
