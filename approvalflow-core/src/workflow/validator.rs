//! Workflow creation validation logic

use crate::error::ApprovalError;
use crate::models::workflow::NewWorkflow;
use std::collections::HashMap;

/// Validation error type
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

/// Validation result
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: String, message: String) {
        self.errors.push(ValidationError { field, message });
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    /// Collapse the errors into one `ApprovalError::Validation`
    pub fn into_result(self) -> Result<Vec<String>, ApprovalError> {
        if self.is_valid() {
            return Ok(self.warnings);
        }

        let message = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        Err(ApprovalError::Validation(message))
    }
}

/// Workflow validator
pub struct WorkflowValidator;

impl WorkflowValidator {
    /// Validate a creation request against the set of known roles
    pub fn validate_new_workflow<F>(request: &NewWorkflow, is_known_role: F) -> ValidationResult
    where
        F: Fn(&str) -> bool,
    {
        let mut result = ValidationResult::new();

        if request.module.trim().is_empty() {
            result.add_error("module".to_string(), "Module cannot be empty".to_string());
        }
        if request.entity_id.trim().is_empty() {
            result.add_error(
                "entity_id".to_string(),
                "Entity id cannot be empty".to_string(),
            );
        }
        if request.created_by.trim().is_empty() {
            result.add_error(
                "created_by".to_string(),
                "Creator cannot be empty".to_string(),
            );
        }

        if request.stages.is_empty() {
            result.add_error(
                "stages".to_string(),
                "Workflow must contain at least one stage".to_string(),
            );
        }

        for (index, stage) in request.stages.iter().enumerate() {
            if !is_known_role(&stage.role) {
                result.add_error(
                    format!("stages[{}].role", index),
                    format!("Unknown role '{}'", stage.role),
                );
            }
        }

        for (key, value) in &request.metadata {
            if key.trim().is_empty() {
                result.add_error("metadata".to_string(), "Metadata key cannot be empty".to_string());
            }
            if !value.is_representable() {
                result.add_error(
                    format!("metadata.{}", key),
                    "Number must be finite".to_string(),
                );
            }
        }

        let explicit: Vec<u32> = request.stages.iter().filter_map(|s| s.order).collect();
        if !explicit.is_empty() {
            if explicit.len() != request.stages.len() {
                result.add_error(
                    "stages".to_string(),
                    "Either every stage carries an order or none does".to_string(),
                );
            } else {
                result.errors.extend(Self::validate_stage_numbers(&explicit).errors);
            }
        }

        // Same role on consecutive stages is legal but usually a template mistake
        for pair in request.stages.windows(2) {
            if pair[0].role == pair[1].role {
                result.add_warning(format!(
                    "Role '{}' is required on consecutive stages",
                    pair[0].role
                ));
            }
        }

        if !request.stages.is_empty() && request.stages.iter().all(|s| !s.is_required) {
            result.add_warning(
                "No stage is required; the workflow can never be rejected".to_string(),
            );
        }

        result
    }

    /// Check explicit stage numbers supplied by an external source
    ///
    /// Numbers must be exactly `1..=N` once each; returned in ascending order.
    pub fn validate_stage_numbers(numbers: &[u32]) -> ValidationResult {
        let mut result = ValidationResult::new();
        let mut seen: HashMap<u32, usize> = HashMap::new();

        for (index, number) in numbers.iter().enumerate() {
            if let Some(first) = seen.insert(*number, index) {
                result.add_error(
                    format!("stages[{}].order", index),
                    format!("Order {} duplicates stages[{}]", number, first),
                );
            }
        }

        let n = numbers.len() as u32;
        for expected in 1..=n {
            if !seen.contains_key(&expected) {
                result.add_error(
                    "stages".to_string(),
                    format!("Order {} is missing; orders must run 1..={}", expected, n),
                );
            }
        }

        result
    }
}
