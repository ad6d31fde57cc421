//! Configuration data structures

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use uuid::Uuid;

/// Logging level configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum LogLevel {
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "info")]
    #[default]
    Info,
    #[serde(rename = "debug")]
    Debug,
    #[serde(rename = "trace")]
    Trace,
}

/// Role declared in configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleConfig {
    /// Stable identity across runs; assigned on first load when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub system: bool,
}

/// Delegation edge declared in configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HierarchyConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub parent: String,
    pub child: String,
}

impl HierarchyConfig {
    pub fn connects(&self, parent: &str, child: &str) -> bool {
        self.parent == parent && self.child == child
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    /// Logging verbosity level
    pub log_level: LogLevel,
    /// JSON workflow store location (defaults under the data directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,
    /// Roles registered at startup
    #[serde(default)]
    pub roles: Vec<RoleConfig>,
    /// Delegation edges registered at startup
    #[serde(default)]
    pub hierarchy: Vec<HierarchyConfig>,
}

impl Default for Configuration {
    fn default() -> Self {
        let role = |name: &str, description: &str, system: bool| RoleConfig {
            id: None,
            name: name.to_string(),
            description: description.to_string(),
            system,
        };
        let edge = |parent: &str, child: &str| HierarchyConfig {
            id: None,
            parent: parent.to_string(),
            child: child.to_string(),
        };

        Self {
            log_level: LogLevel::Info,
            store_path: None,
            roles: vec![
                role("Admin", "System administrator", true),
                role("PropertyManager", "Manages leases and properties", false),
                role("EstatesOfficer", "Handles estate operations", false),
            ],
            hierarchy: vec![
                edge("Admin", "PropertyManager"),
                edge("PropertyManager", "EstatesOfficer"),
            ],
        }
    }
}

impl Configuration {
    /// Load configuration from file
    pub fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Configuration = toml::from_str(&content)?;
            Ok(config)
        } else {
            // Return default configuration if file doesn't exist
            Ok(Configuration::default())
        }
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the XDG config directory path
    pub fn default_config_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_dir = dirs::config_dir().ok_or("Could not determine config directory")?;
        Ok(config_dir.join("approvalflow").join("config.toml"))
    }

    /// Workflow store path, falling back to the user data directory
    pub fn resolved_store_path(&self) -> PathBuf {
        self.store_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("approvalflow")
                .join("approvalworkflow.json")
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();
        let mut ids = HashSet::new();

        for role in &self.roles {
            if !is_valid_role_name(&role.name) {
                errors.push(format!("role name '{}' is not a valid identifier", role.name));
            }
            if !seen.insert(role.name.as_str()) {
                errors.push(format!("role '{}' is declared more than once", role.name));
            }
            if let Some(id) = role.id {
                if !ids.insert(id) {
                    errors.push(format!("id {} is used more than once", id));
                }
            }
        }

        for edge in &self.hierarchy {
            if let Some(id) = edge.id {
                if !ids.insert(id) {
                    errors.push(format!("id {} is used more than once", id));
                }
            }
            if edge.parent == edge.child {
                errors.push(format!("role '{}' cannot delegate to itself", edge.parent));
            }
            for name in [&edge.parent, &edge.child] {
                if !seen.contains(name.as_str()) {
                    errors.push(format!("hierarchy references undeclared role '{}'", name));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Role names: 1-64 chars, starting with a letter, then letters, digits, '-', '_' or '.'
pub fn is_valid_role_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 64 {
        return false;
    }

    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }

    chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}
