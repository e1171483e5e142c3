pub mod core;
pub mod orchestration;
pub mod registry;
pub mod security;
pub mod validation;

pub use crate::core::*;
pub use orchestration::{OutputFormat, PublishOptions, Reporter, Workflow};
pub use registry::{NpmRegistryClient, NpmrcWriter};
pub use security::{CommandError, SafeCommandExecutor, SecureTokenManager};
