//! Registry of known roles

use crate::error::{ApprovalError, Result};
use crate::models::configuration::is_valid_role_name;
use crate::models::role::Role;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

/// Roles keyed by their unique name
#[derive(Default)]
pub struct RoleRegistry {
    roles: DashMap<String, Role>,
}

impl RoleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_role(&self, name: &str, description: &str, is_system_role: bool) -> Result<Role> {
        self.register(Role::new(name, description, is_system_role))
    }

    /// Insert a fully built role, keeping its id
    pub fn register(&self, role: Role) -> Result<Role> {
        if !is_valid_role_name(&role.name) {
            return Err(ApprovalError::Validation(format!(
                "Role name '{}' is not a valid identifier",
                role.name
            )));
        }
        if self.get_by_id(role.id).is_some() {
            return Err(ApprovalError::Validation(format!(
                "Role id {} is already taken",
                role.id
            )));
        }

        match self.roles.entry(role.name.clone()) {
            Entry::Occupied(_) => Err(ApprovalError::Validation(format!(
                "Role '{}' already exists",
                role.name
            ))),
            Entry::Vacant(slot) => {
                slot.insert(role.clone());
                Ok(role)
            }
        }
    }

    /// Replace a role's description; returns `(before, after)`
    pub fn update_description(&self, name: &str, description: &str) -> Result<(Role, Role)> {
        let mut entry = self
            .roles
            .get_mut(name)
            .ok_or_else(|| ApprovalError::role_not_found(name))?;

        let before = entry.clone();
        entry.description = description.to_string();
        Ok((before, entry.clone()))
    }

    /// Remove a non-system role
    pub fn delete_role(&self, name: &str) -> Result<Role> {
        let removed = self.roles.remove_if(name, |_, role| !role.is_system_role);

        match removed {
            Some((_, role)) => Ok(role),
            None if self.roles.contains_key(name) => Err(ApprovalError::Validation(format!(
                "System role '{}' cannot be deleted",
                name
            ))),
            None => Err(ApprovalError::role_not_found(name)),
        }
    }

    /// Put back a role removed or changed by a mutation that was undone
    pub(crate) fn restore(&self, role: Role) {
        self.roles.insert(role.name.clone(), role);
    }

    /// Drop a role regardless of its system flag, undoing a creation
    pub(crate) fn forget(&self, name: &str) {
        self.roles.remove(name);
    }

    pub fn get_by_name(&self, name: &str) -> Option<Role> {
        self.roles.get(name).map(|r| r.clone())
    }

    pub fn get_by_id(&self, id: Uuid) -> Option<Role> {
        self.roles
            .iter()
            .find(|entry| entry.value().id == id)
            .map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.roles.contains_key(name)
    }

    /// All roles sorted by name
    pub fn list(&self) -> Vec<Role> {
        let mut roles: Vec<Role> = self.roles.iter().map(|e| e.value().clone()).collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        roles
    }
}
