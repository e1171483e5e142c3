//! Core traits and result types for the registry workflow
//!
//! This module defines the credential provider seam that is injected into the
//! workflow, and the results each package operation hands to the reporter.

use crate::core::error::WorkflowError;
use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Credentials
// ============================================================================

/// Source of short-lived bearer tokens
///
/// Implementations are asked once per workflow run; the token is never cached
/// across invocations.
///
/// # Examples
///
/// ```
/// use artifact_publisher::core::{CredentialProvider, WorkflowError};
/// use async_trait::async_trait;
/// use secrecy::SecretString;
///
/// struct FixedToken;
///
/// #[async_trait]
/// impl CredentialProvider for FixedToken {
///     fn name(&self) -> &str {
///         "fixed"
///     }
///
///     async fn token(&self) -> Result<SecretString, WorkflowError> {
///         Ok(SecretString::new("ya29.example".into()))
///     }
/// }
/// ```
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Provider name used in messages (e.g. "gcloud")
    fn name(&self) -> &str;

    /// Obtain a bearer token
    ///
    /// Fails with [`WorkflowError::NotAuthenticated`] when there is no session.
    async fn token(&self) -> Result<SecretString, WorkflowError>;
}

// ============================================================================
// Operation results
// ============================================================================

/// Versions of a package, ascending by semantic version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionList {
    pub package_name: String,
    pub versions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_tag: Option<String>,
}

/// Result of a publish operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishResult {
    pub package_name: String,
    pub version: String,
    pub registry_url: String,
    pub tag: String,
    pub integrity: String,
    pub tarball_size: usize,
    pub files: Vec<String>,
    pub dry_run: bool,
}

/// Result of fetching and extracting a package archive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResult {
    pub package_name: String,
    pub version: String,
    pub output_dir: PathBuf,
    pub files: Vec<String>,
}

/// Result of installing a package into a project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallResult {
    pub package_name: String,
    pub version: String,
    pub project_dir: PathBuf,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub output: String,
}

/// Result of writing the project's registry config
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigureResult {
    pub npmrc_path: PathBuf,
    pub registry_url: String,
    pub scope: String,
    /// Whether an existing file was replaced with different content
    pub replaced_existing: bool,
    pub changed: bool,
}

/// Result of pushing a generic artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactPushResult {
    pub artifact_name: String,
    pub artifact_path: PathBuf,
    pub repository: String,
    pub package: String,
    pub version: String,
}
