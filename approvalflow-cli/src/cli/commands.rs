//! Nested subcommands

use clap::Subcommand;

#[derive(Subcommand)]
pub enum RolesCommands {
    /// List roles and delegation edges
    List,

    /// Register a new role
    Add {
        /// Role name (letters, digits, '_' or '-')
        name: String,

        #[arg(short, long, default_value = "")]
        description: String,

        /// Actor identity
        #[arg(long, default_value = "cli-operator")]
        actor: String,
    },

    /// Let PARENT act on behalf of CHILD
    AddEdge {
        parent: String,
        child: String,

        /// Actor identity
        #[arg(long, default_value = "cli-operator")]
        actor: String,
    },

    /// Withdraw a delegation
    RemoveEdge {
        parent: String,
        child: String,

        /// Actor identity
        #[arg(long, default_value = "cli-operator")]
        actor: String,
    },

    /// Show the recorded changes to a role and its delegations
    History { name: String },

    /// Check whether ACTOR may decide a stage requiring REQUIRED
    CanSatisfy { actor: String, required: String },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write a configuration file with the default role hierarchy
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}
