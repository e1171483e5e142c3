//! Orchestration layer for registry workflows
//!
//! This module ties credentials, registry config, the package client and
//! reporting together into the operations exposed by the CLI.

pub mod artifact_push;
pub mod installer;
pub mod reporter;
pub mod workflow;

// Re-export main types for convenience
pub use artifact_push::{ArtifactPusher, ArtifactRepository, GenericArtifact};
pub use installer::NpmInstaller;
pub use reporter::{OutputFormat, Report, Reporter};
pub use workflow::{PublishOptions, Workflow, credential_provider_for};
