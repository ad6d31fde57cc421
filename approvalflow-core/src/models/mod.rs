//! Data models for approvalflow

pub mod audit;
pub mod configuration;
pub mod role;
pub mod template;
pub mod workflow;

pub use audit::*;
pub use configuration::*;
pub use role::*;
pub use template::*;
pub use workflow::*;
