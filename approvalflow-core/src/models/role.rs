//! Role and role-hierarchy records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named role that stages can require
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Role {
    pub id: Uuid,
    /// Unique role name, e.g. "PropertyManager"
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// System roles cannot be deleted
    #[serde(default)]
    pub is_system_role: bool,
    pub created_at: DateTime<Utc>,
}

impl Role {
    pub fn new(name: impl Into<String>, description: impl Into<String>, is_system_role: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            is_system_role,
            created_at: Utc::now(),
        }
    }

    /// Keep an identity assigned on an earlier run
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }
}

/// Delegation edge: the parent role may act on behalf of the child role
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleHierarchy {
    pub id: Uuid,
    pub parent_role_id: Uuid,
    pub child_role_id: Uuid,
    /// Distance of the child from the top-most ancestor; recomputed by traversal
    pub hierarchy_level: u32,
    pub created_at: DateTime<Utc>,
}
