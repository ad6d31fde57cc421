//! CLI command handling

pub mod commands;
pub mod handlers;
