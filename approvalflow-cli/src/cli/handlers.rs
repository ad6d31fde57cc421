//! Command handlers

use anyhow::{anyhow, bail, Context, Result};
use approvalflow_core::models::{
    ApprovalWorkflow, Configuration, Decision, DecisionRequest, HierarchyConfig, MetadataValue,
    NewWorkflow, RoleConfig, StageDefinition, StageTemplate, WorkflowStatus,
};
use approvalflow_core::services::init_logging;
use approvalflow_core::{ApprovalEngine, AuditRecorder, JsonFileStore, RoleResolver};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Everything a command needs: the configuration it came from and an engine
/// over the configured JSON store
pub struct AppContext {
    pub config_path: PathBuf,
    pub config: Configuration,
    pub engine: ApprovalEngine,
}

impl AppContext {
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let config_path = resolve_config_path(config_path)?;
        let mut config = Configuration::load_from_file(&config_path).map_err(|e| {
            anyhow!(
                "Failed to load configuration from {}: {}",
                config_path.display(),
                e
            )
        })?;

        if let Err(e) = init_logging(config.log_level) {
            eprintln!("Warning: failed to initialize logging: {}", e);
        }

        let store_path = config.resolved_store_path();
        let store = Arc::new(
            JsonFileStore::new(&store_path)
                .with_context(|| format!("Failed to open workflow store {}", store_path.display()))?,
        );
        let audit = AuditRecorder::new(store.clone());

        // Seeding replays configuration and is not itself audited
        let resolver = RoleResolver::from_configuration(&config, AuditRecorder::in_memory())
            .context("Invalid role hierarchy in configuration")?
            .with_audit(audit.clone());

        tracing::debug!(store = %store_path.display(), "Workflow store opened");

        // Audit entries name roles by id, so ids must survive to the next run
        let pinned = resolver.pin_ids(&mut config);
        let engine = ApprovalEngine::with_audit(store, Arc::new(resolver), audit);
        let app = Self {
            config_path,
            config,
            engine,
        };
        if pinned {
            if let Err(e) = app.save_config() {
                tracing::warn!(error = %e, "Role ids could not be written back; they will change on the next run");
            }
        }
        Ok(app)
    }

    fn save_config(&self) -> Result<()> {
        self.config.save_to_file(&self.config_path).map_err(|e| {
            anyhow!(
                "Failed to save configuration to {}: {}",
                self.config_path.display(),
                e
            )
        })
    }
}

fn resolve_config_path(config_path: Option<PathBuf>) -> Result<PathBuf> {
    match config_path {
        Some(path) => Ok(path),
        None => Configuration::default_config_path()
            .map_err(|e| anyhow!("Failed to get default config path: {}", e)),
    }
}

fn parse_uuid(raw: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("Invalid {} '{}' (expected UUID)", what, raw))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Parse `ROLE`, `ROLE:required` or `ROLE:optional`
pub fn parse_stage_spec(spec: &str) -> Result<StageDefinition> {
    let (role, flag) = match spec.split_once(':') {
        Some((role, flag)) => (role.trim(), Some(flag.trim())),
        None => (spec.trim(), None),
    };
    if role.is_empty() {
        bail!("Stage '{}' has no role", spec);
    }

    match flag {
        None | Some("required") => Ok(StageDefinition::required(role)),
        Some("optional") => Ok(StageDefinition::optional(role)),
        Some(other) => bail!(
            "Unknown stage flag '{}' in '{}' (expected 'required' or 'optional')",
            other,
            spec
        ),
    }
}

/// Parse `key=value` pairs, inferring bool, integer and float values
pub fn parse_metadata(entries: &[String]) -> Result<BTreeMap<String, MetadataValue>> {
    let mut metadata = BTreeMap::new();
    for entry in entries {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("Metadata '{}' must be key=value", entry))?;
        let key = key.trim();
        if key.is_empty() {
            bail!("Metadata '{}' has an empty key", entry);
        }
        metadata.insert(key.to_string(), MetadataValue::infer(value.trim()));
    }
    Ok(metadata)
}

fn print_workflow(workflow: &ApprovalWorkflow) {
    println!("Workflow {}", workflow.id);
    println!("========================================");
    println!("Module:       {}", workflow.module);
    println!("Entity:       {} ({})", workflow.entity_id, workflow.entity_type);
    println!("Status:       {}", workflow.status);
    println!("Created By:   {}", workflow.created_by);
    println!(
        "Created At:   {}",
        workflow.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!(
        "Updated At:   {}",
        workflow.last_updated_at.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(comments) = &workflow.comments {
        println!("Comments:     {}", comments);
    }
    for (key, value) in &workflow.metadata {
        println!("  {} = {}", key, serde_json::to_string(value).unwrap_or_default());
    }

    println!();
    println!("Stages:");
    for stage in &workflow.stages {
        let marker = if workflow.actionable_stage().map(|s| s.id) == Some(stage.id) {
            "▶"
        } else {
            " "
        };
        print!(
            " {} {}. {:<20} {:<9}{}",
            marker,
            stage.order,
            stage.required_role,
            stage.status,
            if stage.is_required { "" } else { " (optional)" }
        );
        if let Some(by) = &stage.approved_by {
            print!("  by {}", by);
        }
        if let Some(at) = stage.approved_at {
            print!(" at {}", at.format("%Y-%m-%d %H:%M:%S"));
        }
        println!();
        println!("      id: {}", stage.id);
    }
}

fn print_workflow_rows(workflows: &[ApprovalWorkflow]) {
    if workflows.is_empty() {
        println!("No workflows found.");
        return;
    }

    for workflow in workflows {
        let current = workflow
            .actionable_stage()
            .map(|s| format!("stage {} ({})", s.order, s.required_role))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {:<10} {:<20} {:<24} {}",
            workflow.id, workflow.status, workflow.entity_id, workflow.entity_type, current
        );
    }
    println!("\nTotal: {} workflow(s)", workflows.len());
}

/// Handle config init command
pub fn handle_config_init(config_path: Option<PathBuf>, force: bool) -> Result<()> {
    let config_path = resolve_config_path(config_path)?;

    if config_path.exists() && !force {
        bail!(
            "Configuration file {} already exists (use --force to overwrite)",
            config_path.display()
        );
    }

    let config = Configuration::default();
    config.save_to_file(&config_path).map_err(|e| {
        anyhow!(
            "Failed to save configuration to {}: {}",
            config_path.display(),
            e
        )
    })?;

    println!("✅ Configuration written to {}", config_path.display());
    println!("   Workflow store: {}", config.resolved_store_path().display());
    Ok(())
}

/// Handle config show command
pub fn handle_config_show(config_path: Option<PathBuf>, json: bool) -> Result<()> {
    let config_path = resolve_config_path(config_path)?;
    let config = Configuration::load_from_file(&config_path)
        .map_err(|e| anyhow!("Failed to load configuration: {}", e))?;

    if json {
        return print_json(&config);
    }

    println!("Configuration ({})", config_path.display());
    println!("Log level:      {:?}", config.log_level);
    println!("Store:          {}", config.resolved_store_path().display());
    println!("Roles:          {}", config.roles.len());
    println!("Delegations:    {}", config.hierarchy.len());
    if let Err(errors) = config.validate() {
        println!("\n⚠️  Configuration problems:");
        for error in errors {
            println!("  - {}", error);
        }
    }
    Ok(())
}

/// Handle roles list command
pub fn handle_roles_list(app: &AppContext, json: bool) -> Result<()> {
    let resolver = app.engine.resolver();
    let roles = resolver.roles();
    let hierarchy = resolver.hierarchy();

    if json {
        return print_json(&serde_json::json!({
            "roles": roles,
            "hierarchy": hierarchy,
        }));
    }

    let names: BTreeMap<Uuid, &str> = roles.iter().map(|r| (r.id, r.name.as_str())).collect();

    println!("Roles:");
    for role in &roles {
        println!(
            "  {:<20} {}{}",
            role.name,
            role.description,
            if role.is_system_role { " [system]" } else { "" }
        );
    }

    println!("\nDelegations:");
    if hierarchy.is_empty() {
        println!("  (none)");
    }
    for edge in &hierarchy {
        println!(
            "  {} -> {} (level {})",
            names.get(&edge.parent_role_id).copied().unwrap_or("?"),
            names.get(&edge.child_role_id).copied().unwrap_or("?"),
            edge.hierarchy_level
        );
    }
    Ok(())
}

/// Handle roles add command
pub fn handle_roles_add(
    app: &mut AppContext,
    name: String,
    description: String,
    actor: String,
    json: bool,
) -> Result<()> {
    let role = app
        .engine
        .resolver()
        .create_role(&name, &description, false, &actor)
        .with_context(|| format!("Failed to create role '{}'", name))?;

    app.config.roles.push(RoleConfig {
        id: Some(role.id),
        name: role.name.clone(),
        description: role.description.clone(),
        system: false,
    });
    app.save_config()?;

    if json {
        print_json(&role)
    } else {
        println!("✅ Role '{}' created", role.name);
        Ok(())
    }
}

/// Handle roles add-edge command
pub fn handle_roles_add_edge(
    app: &mut AppContext,
    parent: String,
    child: String,
    actor: String,
    json: bool,
) -> Result<()> {
    let edge = app
        .engine
        .resolver()
        .add_edge(&parent, &child, &actor)
        .with_context(|| format!("Failed to add delegation {} -> {}", parent, child))?;

    if !app.config.hierarchy.iter().any(|e| e.connects(&parent, &child)) {
        app.config.hierarchy.push(HierarchyConfig {
            id: Some(edge.id),
            parent: parent.clone(),
            child: child.clone(),
        });
        app.save_config()?;
    }

    if json {
        print_json(&edge)
    } else {
        println!(
            "✅ '{}' may now act for '{}' (level {})",
            parent, child, edge.hierarchy_level
        );
        Ok(())
    }
}

/// Handle roles remove-edge command
pub fn handle_roles_remove_edge(
    app: &mut AppContext,
    parent: String,
    child: String,
    actor: String,
    json: bool,
) -> Result<()> {
    let removed = app
        .engine
        .resolver()
        .remove_edge(&parent, &child, &actor)
        .with_context(|| format!("Failed to remove delegation {} -> {}", parent, child))?;

    if removed {
        app.config
            .hierarchy
            .retain(|edge| !edge.connects(&parent, &child));
        app.save_config()?;
    }

    if json {
        print_json(&serde_json::json!({
            "parent": parent,
            "child": child,
            "removed": removed,
        }))
    } else {
        if removed {
            println!("✅ Delegation {} -> {} removed", parent, child);
        } else {
            println!("No delegation {} -> {}", parent, child);
        }
        Ok(())
    }
}

/// Handle roles history command
pub fn handle_roles_history(app: &AppContext, name: String, json: bool) -> Result<()> {
    let resolver = app.engine.resolver();
    let role = resolver
        .role(&name)
        .ok_or_else(|| anyhow!("Role '{}' not found", name))?;
    let entries = resolver
        .audit()
        .for_role(role.id)
        .with_context(|| format!("Failed to read audit history of role '{}'", name))?;

    if json {
        return print_json(&entries);
    }

    if entries.is_empty() {
        println!("No recorded changes for role '{}'", name);
    }
    for entry in &entries {
        print!(
            "{}  {:<8} by {}",
            entry.performed_at.format("%Y-%m-%d %H:%M:%S"),
            format!("{:?}", entry.action),
            entry.performed_by
        );
        if let Some(notes) = &entry.notes {
            print!("  \"{}\"", notes);
        }
        println!();
    }
    Ok(())
}

/// Handle roles can-satisfy command
pub fn handle_roles_can_satisfy(
    app: &AppContext,
    actor: String,
    required: String,
    json: bool,
) -> Result<()> {
    let allowed = app.engine.resolver().can_satisfy(&actor, &required);

    if json {
        print_json(&serde_json::json!({
            "actor_role": actor,
            "required_role": required,
            "can_satisfy": allowed,
        }))
    } else {
        println!("{}", allowed);
        Ok(())
    }
}

/// Arguments of the create command
pub struct CreateArgs {
    pub module: Option<String>,
    pub entity_id: String,
    pub entity_type: Option<String>,
    pub created_by: String,
    pub stages: Vec<String>,
    pub template: Option<PathBuf>,
    pub metadata: Vec<String>,
    pub comments: Option<String>,
}

impl CreateArgs {
    /// Merge flags and template into a creation request
    pub fn into_request(self) -> Result<NewWorkflow> {
        let (module, entity_type, stages) = match &self.template {
            Some(path) => {
                let template = StageTemplate::load_from_file(path)
                    .with_context(|| format!("Failed to load template {}", path.display()))?;
                if let Some(module) = &self.module {
                    if module != &template.module {
                        bail!(
                            "Template {} is for module '{}', not '{}'",
                            path.display(),
                            template.module,
                            module
                        );
                    }
                }
                (
                    template.module,
                    self.entity_type.clone().or(template.entity_type),
                    template.stages,
                )
            }
            None => {
                let stages = self
                    .stages
                    .iter()
                    .map(|spec| parse_stage_spec(spec))
                    .collect::<Result<Vec<_>>>()?;
                let module = self
                    .module
                    .clone()
                    .ok_or_else(|| anyhow!("--module is required without --template"))?;
                (module, self.entity_type.clone(), stages)
            }
        };

        let entity_type =
            entity_type.ok_or_else(|| anyhow!("--entity-type is required for this module"))?;

        Ok(NewWorkflow {
            module,
            entity_id: self.entity_id,
            entity_type,
            created_by: self.created_by,
            stages,
            metadata: parse_metadata(&self.metadata)?,
            comments: self.comments,
        })
    }
}

/// Handle create command
pub fn handle_create(app: &AppContext, args: CreateArgs, json: bool) -> Result<()> {
    let request = args.into_request()?;
    let workflow = app
        .engine
        .create_workflow(request)
        .context("Failed to create workflow")?;

    if json {
        print_json(&workflow)
    } else {
        println!("✅ Created workflow {}", workflow.id);
        println!(
            "   {} / {} ({}), {} stage(s)",
            workflow.module,
            workflow.entity_id,
            workflow.entity_type,
            workflow.stages.len()
        );
        println!();
        println!("Use 'approvalflow show {}' to follow it", workflow.id);
        Ok(())
    }
}

/// Handle decide command
#[allow(clippy::too_many_arguments)]
pub fn handle_decide(
    app: &AppContext,
    workflow_id: String,
    stage: String,
    role: String,
    actor: String,
    decision: Decision,
    comments: Option<String>,
    json: bool,
) -> Result<()> {
    let workflow_id = parse_uuid(&workflow_id, "workflow ID")?;

    // Accept either a stage UUID or its order number
    let stage_id = match Uuid::parse_str(&stage) {
        Ok(id) => id,
        Err(_) => {
            let order: u32 = stage
                .parse()
                .with_context(|| format!("Invalid stage '{}' (expected UUID or order)", stage))?;
            let workflow = app
                .engine
                .get_by_id(workflow_id)
                .context("Failed to load workflow")?;
            workflow
                .stage_by_order(order)
                .map(|s| s.id)
                .ok_or_else(|| anyhow!("Workflow {} has no stage {}", workflow_id, order))?
        }
    };

    let status = app
        .engine
        .decide(DecisionRequest {
            workflow_id,
            stage_id,
            actor_role: role,
            decision,
            actor_id: actor,
            comments,
        })
        .context("Decision was not recorded")?;

    if json {
        print_json(&serde_json::json!({
            "workflow_id": workflow_id,
            "stage_id": stage_id,
            "decision": decision,
            "status": status,
        }))
    } else {
        let verb = match decision {
            Decision::Approve => "approved",
            Decision::Reject => "rejected",
        };
        println!("✅ Stage {}; workflow is now {}", verb, status);
        Ok(())
    }
}

/// Handle cancel command
pub fn handle_cancel(
    app: &AppContext,
    workflow_id: String,
    actor: String,
    reason: Option<String>,
    json: bool,
) -> Result<()> {
    let workflow_id = parse_uuid(&workflow_id, "workflow ID")?;
    let workflow = app
        .engine
        .cancel(workflow_id, &actor, reason)
        .context("Failed to cancel workflow")?;

    if json {
        print_json(&workflow)
    } else {
        println!("✅ Workflow {} cancelled", workflow.id);
        Ok(())
    }
}

/// Handle show command
pub fn handle_show(app: &AppContext, workflow_id: String, json: bool) -> Result<()> {
    let workflow_id = parse_uuid(&workflow_id, "workflow ID")?;
    let workflow = app
        .engine
        .get_by_id(workflow_id)
        .context("Failed to load workflow")?;

    if json {
        print_json(&workflow)
    } else {
        print_workflow(&workflow);
        Ok(())
    }
}

/// Handle pending command
pub fn handle_pending(app: &AppContext, module: String, role: String, json: bool) -> Result<()> {
    let workflows = app
        .engine
        .get_pending(&module, &role)
        .context("Failed to query pending workflows")?;

    if json {
        print_json(&workflows)
    } else {
        println!("Pending for '{}' in {}", role, module);
        println!("========================================");
        print_workflow_rows(&workflows);
        Ok(())
    }
}

/// Handle list command
pub fn handle_list(app: &AppContext, module: String, status: String, json: bool) -> Result<()> {
    let status: WorkflowStatus = status.parse()?;
    let workflows = app
        .engine
        .get_by_status(&module, status)
        .context("Failed to list workflows")?;

    if json {
        print_json(&workflows)
    } else {
        println!("{} workflows in {}", status, module);
        println!("========================================");
        print_workflow_rows(&workflows);
        Ok(())
    }
}

/// Handle audit command
pub fn handle_audit(app: &AppContext, workflow_id: String, json: bool) -> Result<()> {
    let workflow_id = parse_uuid(&workflow_id, "workflow ID")?;
    let entries = app
        .engine
        .audit_trail(workflow_id)
        .context("Failed to read audit trail")?;

    if json {
        return print_json(&entries);
    }

    if entries.is_empty() {
        println!("No audit entries for workflow {}", workflow_id);
        return Ok(());
    }

    for entry in &entries {
        print!(
            "{}  {:<14} by {}",
            entry.performed_at.format("%Y-%m-%d %H:%M:%S"),
            format!("{:?}", entry.action),
            entry.performed_by
        );
        if let Some(notes) = &entry.notes {
            print!("  \"{}\"", notes);
        }
        println!();
    }
    println!("\nTotal: {} entr{}", entries.len(), if entries.len() == 1 { "y" } else { "ies" });
    Ok(())
}

/// Handle delete command
pub fn handle_delete(app: &AppContext, workflow_id: String, actor: String, json: bool) -> Result<()> {
    let workflow_id = parse_uuid(&workflow_id, "workflow ID")?;
    app.engine
        .delete_workflow(workflow_id, &actor)
        .context("Failed to delete workflow")?;

    if json {
        print_json(&serde_json::json!({
            "workflow_id": workflow_id,
            "deleted": true,
        }))
    } else {
        println!("✅ Workflow {} deleted", workflow_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stage_spec() {
        let stage = parse_stage_spec("PropertyManager").unwrap();
        assert!(stage.is_required);
        assert_eq!(stage.role, "PropertyManager");

        let stage = parse_stage_spec("EstatesOfficer:optional").unwrap();
        assert!(!stage.is_required);

        assert!(parse_stage_spec("Admin:required").unwrap().is_required);
        assert!(parse_stage_spec("Admin:maybe").is_err());
        assert!(parse_stage_spec(":optional").is_err());
    }

    #[test]
    fn test_parse_metadata() {
        let metadata = parse_metadata(&[
            "amount=1200".to_string(),
            "urgent=true".to_string(),
            "unit=Flat 4B".to_string(),
        ])
        .unwrap();

        assert_eq!(metadata["amount"], MetadataValue::Integer(1200));
        assert_eq!(metadata["urgent"], MetadataValue::Bool(true));
        assert_eq!(metadata["unit"], MetadataValue::Text("Flat 4B".to_string()));
        assert!(parse_metadata(&["no-separator".to_string()]).is_err());
    }

    #[test]
    fn test_create_args_require_module_without_template() {
        let args = CreateArgs {
            module: None,
            entity_id: "L-1".to_string(),
            entity_type: Some("LeaseTermination".to_string()),
            created_by: "clerk".to_string(),
            stages: vec!["Admin".to_string()],
            template: None,
            metadata: Vec::new(),
            comments: None,
        };
        assert!(args.into_request().is_err());
    }
}
