mod cli;

use anyhow::Result;
use approvalflow_core::models::Decision;
use clap::{Parser, Subcommand};
use cli::commands::{ConfigCommands, RolesCommands};
use cli::handlers;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "approvalflow")]
#[command(version)]
#[command(about = "Multi-stage approval workflows gated by a role hierarchy")]
#[command(
    help_template = "{name} - {version}\n{about}\n\n{usage-heading}\n  {usage}\n\n{all-args}{options}\n"
)]
struct Cli {
    /// Path to configuration file (default: ~/.config/approvalflow/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and change the role hierarchy
    Roles {
        #[command(subcommand)]
        command: RolesCommands,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Start an approval workflow for an entity
    ///
    /// Stages come either from repeated --stage flags or from a YAML template.
    ///
    /// Examples:
    ///   approvalflow create --module Lease --entity-id L-42 --entity-type LeaseTermination \
    ///       --created-by clerk --stage PropertyManager --stage EstatesOfficer:optional --stage Admin
    ///   approvalflow create --entity-id L-43 --created-by clerk --template lease.yaml --meta amount=1200
    Create {
        /// Business module (taken from the template when omitted)
        #[arg(long)]
        module: Option<String>,

        /// Identifier of the entity being approved
        #[arg(long)]
        entity_id: String,

        /// Kind of action being approved (taken from the template when omitted)
        #[arg(long)]
        entity_type: Option<String>,

        /// Identity of the requester
        #[arg(long)]
        created_by: String,

        /// Stage as ROLE or ROLE:optional, in order
        #[arg(long = "stage", value_name = "ROLE[:optional]", conflicts_with = "template")]
        stages: Vec<String>,

        /// YAML stage template
        #[arg(long)]
        template: Option<PathBuf>,

        /// Metadata entry as key=value
        #[arg(long = "meta", value_name = "KEY=VALUE")]
        metadata: Vec<String>,

        /// Free-form comments
        #[arg(long)]
        comments: Option<String>,
    },

    /// Approve or reject the current stage of a workflow
    Decide {
        /// Workflow ID (UUID)
        workflow_id: String,

        /// Stage ID (UUID) or stage order number
        stage: String,

        /// Role the actor is acting under
        #[arg(long)]
        role: String,

        /// Actor identity
        #[arg(long)]
        actor: String,

        /// Approve the stage
        #[arg(long, conflicts_with = "reject", required_unless_present = "reject")]
        approve: bool,

        /// Reject the stage
        #[arg(long)]
        reject: bool,

        /// Decision comments
        #[arg(long)]
        comments: Option<String>,
    },

    /// Cancel a pending workflow
    Cancel {
        /// Workflow ID (UUID)
        workflow_id: String,

        /// Actor identity
        #[arg(long)]
        actor: String,

        /// Reason recorded on the workflow
        #[arg(long)]
        reason: Option<String>,
    },

    /// Show a workflow and its stages
    Show {
        /// Workflow ID (UUID)
        workflow_id: String,
    },

    /// List workflows awaiting a role (delegations included)
    Pending {
        #[arg(long)]
        module: String,

        #[arg(long)]
        role: String,
    },

    /// List workflows of a module by status
    List {
        #[arg(long)]
        module: String,

        /// pending, approved, rejected or cancelled
        #[arg(long, default_value = "pending")]
        status: String,
    },

    /// Show the audit trail of a workflow
    Audit {
        /// Workflow ID (UUID)
        workflow_id: String,
    },

    /// Delete a workflow and its stages
    Delete {
        /// Workflow ID (UUID)
        workflow_id: String,

        /// Actor identity
        #[arg(long)]
        actor: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let json = cli.json;
    let config_path = cli.config;
    let load = || handlers::AppContext::load(config_path.clone());

    match cli.command {
        Commands::Config { command } => match command {
            ConfigCommands::Init { force } => handlers::handle_config_init(config_path.clone(), force)?,
            ConfigCommands::Show => handlers::handle_config_show(config_path.clone(), json)?,
        },
        Commands::Roles { command } => match command {
            RolesCommands::List => handlers::handle_roles_list(&load()?, json)?,
            RolesCommands::Add {
                name,
                description,
                actor,
            } => handlers::handle_roles_add(&mut load()?, name, description, actor, json)?,
            RolesCommands::AddEdge {
                parent,
                child,
                actor,
            } => handlers::handle_roles_add_edge(&mut load()?, parent, child, actor, json)?,
            RolesCommands::RemoveEdge {
                parent,
                child,
                actor,
            } => handlers::handle_roles_remove_edge(&mut load()?, parent, child, actor, json)?,
            RolesCommands::History { name } => {
                handlers::handle_roles_history(&load()?, name, json)?
            }
            RolesCommands::CanSatisfy { actor, required } => {
                handlers::handle_roles_can_satisfy(&load()?, actor, required, json)?
            }
        },
        Commands::Create {
            module,
            entity_id,
            entity_type,
            created_by,
            stages,
            template,
            metadata,
            comments,
        } => {
            let args = handlers::CreateArgs {
                module,
                entity_id,
                entity_type,
                created_by,
                stages,
                template,
                metadata,
                comments,
            };
            handlers::handle_create(&load()?, args, json)?;
        }
        Commands::Decide {
            workflow_id,
            stage,
            role,
            actor,
            approve,
            reject: _,
            comments,
        } => {
            let decision = if approve {
                Decision::Approve
            } else {
                Decision::Reject
            };
            handlers::handle_decide(
                &load()?,
                workflow_id,
                stage,
                role,
                actor,
                decision,
                comments,
                json,
            )?;
        }
        Commands::Cancel {
            workflow_id,
            actor,
            reason,
        } => handlers::handle_cancel(&load()?, workflow_id, actor, reason, json)?,
        Commands::Show { workflow_id } => handlers::handle_show(&load()?, workflow_id, json)?,
        Commands::Pending { module, role } => {
            handlers::handle_pending(&load()?, module, role, json)?
        }
        Commands::List { module, status } => {
            handlers::handle_list(&load()?, module, status, json)?
        }
        Commands::Audit { workflow_id } => handlers::handle_audit(&load()?, workflow_id, json)?,
        Commands::Delete { workflow_id, actor } => {
            handlers::handle_delete(&load()?, workflow_id, actor, json)?
        }
    }

    Ok(())
}
