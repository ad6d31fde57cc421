//! Role resolver: registry + delegation graph + audit
//!
//! Answers "may a holder of role A act on a stage requiring role R?" and owns
//! every mutation of roles and delegation edges. Mutations are serialized and
//! audited; if the audit entry cannot be written the mutation is undone.

use crate::error::{ApprovalError, Result};
use crate::models::audit::{AuditAction, AuditEntry, AuditTarget};
use crate::models::configuration::Configuration;
use crate::models::role::{Role, RoleHierarchy};
use crate::roles::graph::RoleGraph;
use crate::roles::registry::RoleRegistry;
use crate::services::audit::AuditRecorder;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

/// Performer recorded for configuration-seeded mutations
pub const SYSTEM_ACTOR: &str = "system";

pub struct RoleResolver {
    registry: RoleRegistry,
    graph: RoleGraph,
    /// Identity of each edge: `(parent, child) -> (edge id, created_at)`
    edge_records: DashMap<(String, String), (Uuid, DateTime<Utc>)>,
    audit: AuditRecorder,
    write_lock: Mutex<()>,
}

impl RoleResolver {
    pub fn new(audit: AuditRecorder) -> Self {
        Self {
            registry: RoleRegistry::new(),
            graph: RoleGraph::new(),
            edge_records: DashMap::new(),
            audit,
            write_lock: Mutex::new(()),
        }
    }

    /// Seed roles and delegations declared in configuration
    pub fn from_configuration(config: &Configuration, audit: AuditRecorder) -> Result<Self> {
        config
            .validate()
            .map_err(|errors| ApprovalError::Validation(errors.join("; ")))?;

        let resolver = Self::new(audit);
        for declared in &config.roles {
            let mut role = Role::new(&declared.name, &declared.description, declared.system);
            if let Some(id) = declared.id {
                role = role.with_id(id);
            }
            resolver.register_role(role, SYSTEM_ACTOR)?;
        }
        for edge in &config.hierarchy {
            resolver.link(&edge.parent, &edge.child, edge.id, SYSTEM_ACTOR)?;
        }

        tracing::info!(
            roles = config.roles.len(),
            edges = config.hierarchy.len(),
            "Role hierarchy loaded from configuration"
        );
        Ok(resolver)
    }

    /// Route later mutations to another recorder
    ///
    /// Lets a caller seed from configuration without writing seed entries to a
    /// durable trail.
    pub fn with_audit(mut self, audit: AuditRecorder) -> Self {
        self.audit = audit;
        self
    }

    /// Write the ids this resolver assigned back into `config`
    ///
    /// Returns whether any role or edge in `config` was missing its id.
    pub fn pin_ids(&self, config: &mut Configuration) -> bool {
        let mut changed = false;
        for declared in config.roles.iter_mut().filter(|r| r.id.is_none()) {
            if let Some(role) = self.registry.get_by_name(&declared.name) {
                declared.id = Some(role.id);
                changed = true;
            }
        }
        for edge in config.hierarchy.iter_mut().filter(|e| e.id.is_none()) {
            if let Some(record) = self
                .edge_records
                .get(&(edge.parent.clone(), edge.child.clone()))
            {
                edge.id = Some(record.value().0);
                changed = true;
            }
        }
        changed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn audit(&self) -> &AuditRecorder {
        &self.audit
    }

    pub fn create_role(
        &self,
        name: &str,
        description: &str,
        is_system_role: bool,
        performed_by: &str,
    ) -> Result<Role> {
        self.register_role(Role::new(name, description, is_system_role), performed_by)
    }

    fn register_role(&self, role: Role, performed_by: &str) -> Result<Role> {
        let _guard = self.lock();
        let role = self.registry.register(role)?;
        let name = role.name.as_str();
        let is_system_role = role.is_system_role;

        let entry = AuditEntry::new(
            AuditTarget::Role { role_id: role.id },
            AuditAction::Create,
            performed_by,
        )
        .with_values(None, serde_json::to_value(&role).ok());

        if let Err(e) = self.audit.record(entry) {
            self.registry.forget(name);
            return Err(e);
        }

        tracing::info!(role = name, system = is_system_role, "Role created");
        Ok(role)
    }

    pub fn update_role_description(
        &self,
        name: &str,
        description: &str,
        performed_by: &str,
    ) -> Result<Role> {
        let _guard = self.lock();
        let (before, after) = self.registry.update_description(name, description)?;

        let entry = AuditEntry::new(
            AuditTarget::Role { role_id: after.id },
            AuditAction::Update,
            performed_by,
        )
        .with_values(
            serde_json::to_value(&before).ok(),
            serde_json::to_value(&after).ok(),
        );

        if let Err(e) = self.audit.record(entry) {
            self.registry.restore(before);
            return Err(e);
        }

        Ok(after)
    }

    /// Delete a non-system role together with every delegation touching it
    pub fn delete_role(&self, name: &str, performed_by: &str) -> Result<Role> {
        let _guard = self.lock();
        let incident: Vec<RoleHierarchy> = self
            .graph
            .edges()
            .into_iter()
            .filter(|(parent, child)| parent == name || child == name)
            .filter_map(|(parent, child)| self.edge_record(&parent, &child))
            .collect();

        let role = self.registry.delete_role(name)?;
        let removed_edges = self.graph.remove_role(name);

        let mut entries = vec![AuditEntry::new(
            AuditTarget::Role { role_id: role.id },
            AuditAction::Delete,
            performed_by,
        )
        .with_values(serde_json::to_value(&role).ok(), None)];

        for edge in &incident {
            entries.push(
                AuditEntry::new(
                    AuditTarget::Hierarchy {
                        parent_role_id: edge.parent_role_id,
                        child_role_id: edge.child_role_id,
                    },
                    AuditAction::Remove,
                    performed_by,
                )
                .with_values(serde_json::to_value(edge).ok(), None)
                .with_notes(Some(format!("Removed with role '{}'", name))),
            );
        }

        if let Err(e) = self.audit.record_all(entries) {
            self.registry.restore(role);
            for (parent, child) in &removed_edges {
                // Re-adding edges that previously coexisted cannot close a cycle
                let _ = self.graph.add_edge(parent, child);
            }
            return Err(e);
        }

        for (parent, child) in removed_edges {
            self.edge_records.remove(&(parent, child));
        }

        tracing::info!(role = name, "Role deleted");
        Ok(role)
    }

    /// Allow `parent` to act on behalf of `child`
    ///
    /// Idempotent for an existing edge; fails with `CycleDetected` if `child`
    /// already reaches `parent`. The edge becomes visible to authorization
    /// only after its audit entry is written.
    pub fn add_edge(&self, parent: &str, child: &str, performed_by: &str) -> Result<RoleHierarchy> {
        self.link(parent, child, None, performed_by)
    }

    fn link(
        &self,
        parent: &str,
        child: &str,
        id: Option<Uuid>,
        performed_by: &str,
    ) -> Result<RoleHierarchy> {
        let _guard = self.lock();
        let parent_role = self
            .registry
            .get_by_name(parent)
            .ok_or_else(|| ApprovalError::role_not_found(parent))?;
        let child_role = self
            .registry
            .get_by_name(child)
            .ok_or_else(|| ApprovalError::role_not_found(child))?;

        let key = (parent.to_string(), child.to_string());
        if !self.graph.check_edge(parent, child)? {
            return Ok(self.build_edge(&parent_role, &child_role, &key));
        }

        let edge = RoleHierarchy {
            id: id.unwrap_or_else(Uuid::new_v4),
            parent_role_id: parent_role.id,
            child_role_id: child_role.id,
            hierarchy_level: self
                .graph
                .depth(child)
                .max(self.graph.depth(parent) + 1),
            created_at: Utc::now(),
        };
        let entry = AuditEntry::new(
            AuditTarget::Hierarchy {
                parent_role_id: parent_role.id,
                child_role_id: child_role.id,
            },
            AuditAction::Assign,
            performed_by,
        )
        .with_values(None, serde_json::to_value(&edge).ok());
        self.audit.record(entry)?;

        // Mutations are serialized by the write lock, so the check above still holds
        self.edge_records
            .insert(key, (edge.id, edge.created_at));
        self.graph.add_edge(parent, child)?;

        tracing::info!(parent, child, "Role delegation assigned");
        Ok(edge)
    }

    /// Withdraw a delegation; returns whether it existed
    pub fn remove_edge(&self, parent: &str, child: &str, performed_by: &str) -> Result<bool> {
        let _guard = self.lock();
        let Some(edge) = self.edge_record(parent, child) else {
            return Ok(false);
        };

        self.graph.remove_edge(parent, child);
        let entry = AuditEntry::new(
            AuditTarget::Hierarchy {
                parent_role_id: edge.parent_role_id,
                child_role_id: edge.child_role_id,
            },
            AuditAction::Remove,
            performed_by,
        )
        .with_values(serde_json::to_value(&edge).ok(), None);

        if let Err(e) = self.audit.record(entry) {
            let _ = self.graph.add_edge(parent, child);
            return Err(e);
        }

        self.edge_records
            .remove(&(parent.to_string(), child.to_string()));
        tracing::info!(parent, child, "Role delegation removed");
        Ok(true)
    }

    /// True iff `actor_role` is `required_role` or reaches it through delegations
    pub fn can_satisfy(&self, actor_role: &str, required_role: &str) -> bool {
        self.graph.can_satisfy(actor_role, required_role)
    }

    /// Every role the actor may act for, itself included
    pub fn satisfiable_roles(&self, actor_role: &str) -> Arc<HashSet<String>> {
        self.graph.satisfiable_roles(actor_role)
    }

    pub fn is_known_role(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    pub fn role(&self, name: &str) -> Option<Role> {
        self.registry.get_by_name(name)
    }

    pub fn roles(&self) -> Vec<Role> {
        self.registry.list()
    }

    /// Delegation edges with levels recomputed from the current graph
    pub fn hierarchy(&self) -> Vec<RoleHierarchy> {
        self.graph
            .edges()
            .into_iter()
            .filter_map(|(parent, child)| self.edge_record(&parent, &child))
            .collect()
    }

    fn edge_record(&self, parent: &str, child: &str) -> Option<RoleHierarchy> {
        let key = (parent.to_string(), child.to_string());
        let parent_role = self.registry.get_by_name(parent)?;
        let child_role = self.registry.get_by_name(child)?;
        if !self.edge_records.contains_key(&key) {
            return None;
        }
        Some(self.build_edge(&parent_role, &child_role, &key))
    }

    fn build_edge(&self, parent: &Role, child: &Role, key: &(String, String)) -> RoleHierarchy {
        let (id, created_at) = self
            .edge_records
            .get(key)
            .map(|record| *record.value())
            .unwrap_or_else(|| (Uuid::new_v4(), Utc::now()));

        RoleHierarchy {
            id,
            parent_role_id: parent.id,
            child_role_id: child.id,
            hierarchy_level: self.graph.depth(&child.name),
            created_at,
        }
    }
}
