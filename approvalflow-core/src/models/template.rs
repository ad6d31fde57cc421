//! Stage templates: a module's stage list kept in YAML

use crate::error::{ApprovalError, Result};
use crate::models::workflow::StageDefinition;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Reusable stage list for one business module
///
/// ```yaml
/// module: Lease
/// entity_type: LeaseTermination
/// stages:
///   - role: PropertyManager
///   - role: EstatesOfficer
///     is_required: false
///   - role: Admin
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageTemplate {
    pub module: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    pub stages: Vec<StageDefinition>,
}

impl StageTemplate {
    pub fn from_yaml(content: &str) -> Result<Self> {
        let template: StageTemplate = serde_yaml::from_str(content)
            .map_err(|e| ApprovalError::Validation(format!("Invalid stage template: {}", e)))?;

        if template.stages.is_empty() {
            return Err(ApprovalError::Validation(format!(
                "Stage template for module '{}' has no stages",
                template.module
            )));
        }

        Ok(template)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ApprovalError::Validation(format!(
                "Failed to read stage template {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }
}
