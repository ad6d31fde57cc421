//! Workflow and audit persistence using JSON file storage

use crate::error::{ApprovalError, Result};
use crate::models::audit::AuditEntry;
use crate::models::workflow::{ApprovalWorkflow, WorkflowStatus};
use crate::services::audit::AuditSink;
use crate::store::{check_update, is_pending_for, WorkflowStore};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

/// Root JSON document holding all workflow data
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JsonStore {
    /// Workflows with their embedded stages
    pub workflows: Vec<ApprovalWorkflow>,
    /// Append-only audit trail
    pub audit: Vec<AuditEntry>,
}

/// File-backed store shared by concurrent callers and processes
///
/// Every mutation re-reads the document under an exclusive file lock, applies
/// the change and rewrites it before releasing the lock, so a compare-and-swap
/// also holds across processes sharing the file.
pub struct JsonFileStore {
    /// Path to JSON store file
    store_path: PathBuf,
    /// Serializes writers inside this process
    write_lock: Mutex<()>,
}

fn unavailable(context: &str, err: impl std::fmt::Display) -> ApprovalError {
    ApprovalError::StoreUnavailable(format!("{}: {}", context, err))
}

impl JsonFileStore {
    /// Create new persistence manager
    pub fn new<P: AsRef<Path>>(store_path: P) -> Result<Self> {
        let store_path = store_path.as_ref().to_path_buf();

        // Create parent directory if it doesn't exist
        if let Some(parent) = store_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| unavailable("Failed to create workflow store directory", e))?;
        }

        Ok(Self {
            store_path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.store_path
    }

    fn parse(contents: &str) -> Result<JsonStore> {
        if contents.trim().is_empty() {
            return Ok(JsonStore::default());
        }
        serde_json::from_str(contents).map_err(|e| unavailable("Failed to parse workflow store JSON", e))
    }

    /// Load the document under a shared lock
    fn load_store(&self) -> Result<JsonStore> {
        if !self.store_path.exists() {
            return Ok(JsonStore::default());
        }

        let file = File::open(&self.store_path)
            .map_err(|e| unavailable("Failed to open workflow store file", e))?;

        // Acquire shared lock for reading
        file.lock_shared()
            .map_err(|e| unavailable("Failed to acquire read lock on workflow store", e))?;

        let mut contents = String::new();
        let mut reader = std::io::BufReader::new(&file);
        reader
            .read_to_string(&mut contents)
            .map_err(|e| unavailable("Failed to read workflow store", e))?;

        // Lock released when file goes out of scope
        Self::parse(&contents)
    }

    /// Read-modify-write the document under an exclusive lock
    ///
    /// `mutate` works on a copy; the file is only rewritten if it succeeds.
    fn transact<T, F>(&self, mutate: F) -> Result<T>
    where
        F: FnOnce(&mut JsonStore) -> Result<T>,
    {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.store_path)
            .map_err(|e| unavailable("Failed to open workflow store file for writing", e))?;

        // Acquire exclusive lock for writing
        file.lock_exclusive()
            .map_err(|e| unavailable("Failed to acquire write lock on workflow store", e))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| unavailable("Failed to read workflow store", e))?;
        let mut store = Self::parse(&contents)?;

        let output = mutate(&mut store)?;

        let json = serde_json::to_string_pretty(&store)
            .map_err(|e| unavailable("Failed to serialize workflow store", e))?;

        file.set_len(0)
            .and_then(|_| file.seek(SeekFrom::Start(0)))
            .map_err(|e| unavailable("Failed to truncate workflow store", e))?;

        let mut writer = std::io::BufWriter::new(&file);
        writer
            .write_all(json.as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|e| unavailable("Failed to write workflow store", e))?;

        // Lock released when file goes out of scope
        Ok(output)
    }

    fn collect_sorted<F>(&self, filter: F) -> Result<Vec<ApprovalWorkflow>>
    where
        F: Fn(&ApprovalWorkflow) -> bool,
    {
        let mut workflows: Vec<ApprovalWorkflow> = self
            .load_store()?
            .workflows
            .into_iter()
            .filter(|w| filter(w))
            .collect();
        workflows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(workflows)
    }
}

impl WorkflowStore for JsonFileStore {
    fn create(&self, mut workflow: ApprovalWorkflow) -> Result<ApprovalWorkflow> {
        workflow.check_stage_orders()?;
        workflow.version = 1;

        self.transact(|store| {
            if store.workflows.iter().any(|w| w.id == workflow.id) {
                return Err(ApprovalError::Validation(format!(
                    "Workflow {} already exists",
                    workflow.id
                )));
            }
            store.workflows.push(workflow.clone());
            Ok(workflow)
        })
    }

    fn get_by_id(&self, id: Uuid) -> Result<ApprovalWorkflow> {
        self.load_store()?
            .workflows
            .into_iter()
            .find(|w| w.id == id)
            .ok_or_else(|| ApprovalError::workflow_not_found(id))
    }

    fn get_by_entity(&self, module: &str, entity_id: &str) -> Result<ApprovalWorkflow> {
        self.collect_sorted(|w| w.module == module && w.entity_id == entity_id)?
            .pop()
            .ok_or_else(|| ApprovalError::NotFound {
                kind: "Workflow",
                id: format!("{}/{}", module, entity_id),
            })
    }

    fn get_pending_workflows(&self, module: &str, role: &str) -> Result<Vec<ApprovalWorkflow>> {
        self.collect_sorted(|w| is_pending_for(w, module, role))
    }

    fn get_by_status(&self, module: &str, status: WorkflowStatus) -> Result<Vec<ApprovalWorkflow>> {
        self.collect_sorted(|w| w.module == module && w.status == status)
    }

    fn update(&self, workflow: &ApprovalWorkflow) -> Result<ApprovalWorkflow> {
        self.transact(|store| {
            let stored = store
                .workflows
                .iter_mut()
                .find(|w| w.id == workflow.id)
                .ok_or_else(|| ApprovalError::workflow_not_found(workflow.id))?;

            check_update(stored, workflow)?;

            let mut next = workflow.clone();
            next.version = stored.version + 1;
            *stored = next.clone();
            Ok(next)
        })
    }

    fn delete(&self, id: Uuid) -> Result<()> {
        self.transact(|store| {
            let before = store.workflows.len();
            store.workflows.retain(|w| w.id != id);
            if store.workflows.len() == before {
                return Err(ApprovalError::workflow_not_found(id));
            }
            Ok(())
        })
    }
}

impl AuditSink for JsonFileStore {
    fn append_all(&self, entries: &[AuditEntry]) -> Result<()> {
        self.transact(|store| {
            store.audit.extend_from_slice(entries);
            Ok(())
        })
    }

    fn entries(&self) -> Result<Vec<AuditEntry>> {
        Ok(self.load_store()?.audit)
    }
}
