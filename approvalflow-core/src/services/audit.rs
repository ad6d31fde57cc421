//! Append-only audit trail

use crate::error::{ApprovalError, Result};
use crate::models::audit::AuditEntry;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

/// Durable destination for audit entries
///
/// Implementations only append; nothing in this trait rewrites or removes an
/// entry once written.
pub trait AuditSink: Send + Sync {
    /// Append a batch so that either every entry lands or none does
    fn append_all(&self, entries: &[AuditEntry]) -> Result<()>;

    fn append(&self, entry: &AuditEntry) -> Result<()> {
        self.append_all(std::slice::from_ref(entry))
    }

    /// Entries in append order
    fn entries(&self) -> Result<Vec<AuditEntry>>;
}

/// Audit sink held in memory
#[derive(Default)]
pub struct InMemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditSink for InMemoryAuditLog {
    fn append_all(&self, entries: &[AuditEntry]) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(entries);
        Ok(())
    }

    fn entries(&self) -> Result<Vec<AuditEntry>> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

/// Records audit entries for role and workflow mutations
#[derive(Clone)]
pub struct AuditRecorder {
    sink: Arc<dyn AuditSink>,
}

impl AuditRecorder {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Recorder backed by a fresh in-memory log
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryAuditLog::new()))
    }

    /// Append one entry; sink failures surface as `StoreUnavailable`
    pub fn record(&self, entry: AuditEntry) -> Result<()> {
        self.record_all(vec![entry])
    }

    /// Append several entries as one batch: all of them are recorded or none
    pub fn record_all(&self, entries: Vec<AuditEntry>) -> Result<()> {
        match self.sink.append_all(&entries) {
            Ok(()) => {
                for entry in &entries {
                    tracing::debug!(
                        entry_id = %entry.id,
                        action = ?entry.action,
                        performed_by = %entry.performed_by,
                        "Audit entry recorded"
                    );
                }
                Ok(())
            }
            Err(e) => {
                tracing::error!(entries = entries.len(), error = %e, "Failed to record audit entries");
                Err(match e {
                    ApprovalError::StoreUnavailable(_) => e,
                    other => ApprovalError::StoreUnavailable(other.to_string()),
                })
            }
        }
    }

    pub fn all(&self) -> Result<Vec<AuditEntry>> {
        self.sink.entries()
    }

    /// Entries about a workflow or any of its stages
    pub fn for_workflow(&self, workflow_id: Uuid) -> Result<Vec<AuditEntry>> {
        Ok(self
            .sink
            .entries()?
            .into_iter()
            .filter(|e| e.target.concerns_workflow(workflow_id))
            .collect())
    }

    /// Entries about a role or a delegation edge touching it
    pub fn for_role(&self, role_id: Uuid) -> Result<Vec<AuditEntry>> {
        Ok(self
            .sink
            .entries()?
            .into_iter()
            .filter(|e| e.target.concerns_role(role_id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::audit::{AuditAction, AuditTarget};

    struct OfflineSink;

    impl AuditSink for OfflineSink {
        fn append_all(&self, _entries: &[AuditEntry]) -> Result<()> {
            Err(ApprovalError::StoreUnavailable("audit disk offline".to_string()))
        }

        fn entries(&self) -> Result<Vec<AuditEntry>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_record_and_filter() {
        let recorder = AuditRecorder::in_memory();
        let workflow_id = Uuid::new_v4();
        let role_id = Uuid::new_v4();

        recorder
            .record(AuditEntry::new(
                AuditTarget::Workflow { workflow_id },
                AuditAction::Create,
                "clerk",
            ))
            .unwrap();
        recorder
            .record(AuditEntry::new(
                AuditTarget::Role { role_id },
                AuditAction::Create,
                "admin",
            ))
            .unwrap();

        assert_eq!(recorder.all().unwrap().len(), 2);
        assert_eq!(recorder.for_workflow(workflow_id).unwrap().len(), 1);
        assert_eq!(recorder.for_role(role_id).unwrap().len(), 1);
    }

    #[test]
    fn test_sink_failure_is_surfaced() {
        let recorder = AuditRecorder::new(Arc::new(OfflineSink));
        let err = recorder
            .record(AuditEntry::new(
                AuditTarget::Workflow {
                    workflow_id: Uuid::new_v4(),
                },
                AuditAction::Cancel,
                "clerk",
            ))
            .unwrap_err();

        assert!(matches!(err, ApprovalError::StoreUnavailable(_)));
    }

    #[test]
    fn test_record_all_is_one_batch() {
        let log = Arc::new(InMemoryAuditLog::new());
        let recorder = AuditRecorder::new(log.clone());
        let workflow_id = Uuid::new_v4();

        recorder
            .record_all(vec![
                AuditEntry::new(AuditTarget::Workflow { workflow_id }, AuditAction::Approve, "pm-1"),
                AuditEntry::new(
                    AuditTarget::Workflow { workflow_id },
                    AuditAction::StatusChange,
                    "pm-1",
                ),
            ])
            .unwrap();
        assert_eq!(log.entries().unwrap().len(), 2);
    }
}
