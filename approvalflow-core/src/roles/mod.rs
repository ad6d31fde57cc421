//! Role registry, delegation graph and authorization resolver

pub mod graph;
pub mod registry;
pub mod resolver;

pub use graph::RoleGraph;
pub use registry::RoleRegistry;
pub use resolver::{RoleResolver, SYSTEM_ACTOR};
