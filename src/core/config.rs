//! Configuration structures and types for artifact-publisher
//!
//! This module provides type-safe configuration management with serde support.
//! Every field is optional so that configuration layers (defaults, global file,
//! project file, environment, CLI) can be merged; accessors apply the defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default timeout for registry requests and child commands, in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Environment variable referenced by the `.npmrc` token placeholder
pub const DEFAULT_TOKEN_ENV: &str = "NPM_TOKEN";

/// Default npm dist-tag for publishing
pub const DEFAULT_DIST_TAG: &str = "latest";

/// Default directory for fetched package contents
pub const DEFAULT_FETCH_DIR: &str = "fetched-package";

/// Default directory for generic artifacts
pub const DEFAULT_ARTIFACT_DIR: &str = "artifacts";

/// Root configuration object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowConfig {
    /// Target npm registry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry: Option<RegistryConfig>,

    /// Where the bearer token comes from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<CredentialConfig>,

    /// npm interop settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub npm: Option<NpmConfig>,

    /// Fetch settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch: Option<FetchConfig>,

    /// Generic artifact settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<ArtifactConfig>,

    /// Request/command timeout in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

/// Registry location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RegistryConfig {
    /// Registry URL, e.g. `https://us-central1-npm.pkg.dev/my-project/my-repo/`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Package scope, e.g. `@observability`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Credential provider selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CredentialSource {
    /// `gcloud auth print-access-token`
    #[default]
    Gcloud,
    /// Token read from an environment variable
    Env,
}

/// Credential configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CredentialConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<CredentialSource>,

    /// Variable holding the token when `provider: env`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_var: Option<String>,
}

/// npm interop configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NpmConfig {
    /// Placeholder variable written into `.npmrc` (default: NPM_TOKEN)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,

    /// dist-tag used when publishing (default: "latest")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// Fetch configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FetchConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

/// Generic artifact configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,

    /// `<location>-docker.pkg.dev/<project>/<repository>`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
}

impl WorkflowConfig {
    /// Configured registry URL, if any
    pub fn registry_url(&self) -> Option<&str> {
        self.registry.as_ref().and_then(|r| r.url.as_deref())
    }

    /// Configured scope, if any
    pub fn scope(&self) -> Option<&str> {
        self.registry.as_ref().and_then(|r| r.scope.as_deref())
    }

    pub fn credential_source(&self) -> CredentialSource {
        self.credentials
            .as_ref()
            .and_then(|c| c.provider)
            .unwrap_or_default()
    }

    /// Variable holding the token for the env provider (falls back to the npm placeholder)
    pub fn credential_env_var(&self) -> &str {
        self.credentials
            .as_ref()
            .and_then(|c| c.env_var.as_deref())
            .unwrap_or_else(|| self.token_env())
    }

    pub fn token_env(&self) -> &str {
        self.npm
            .as_ref()
            .and_then(|n| n.token_env.as_deref())
            .unwrap_or(DEFAULT_TOKEN_ENV)
    }

    pub fn dist_tag(&self) -> &str {
        self.npm
            .as_ref()
            .and_then(|n| n.tag.as_deref())
            .unwrap_or(DEFAULT_DIST_TAG)
    }

    pub fn fetch_output_dir(&self) -> &Path {
        self.fetch
            .as_ref()
            .and_then(|f| f.output_dir.as_deref())
            .unwrap_or(Path::new(DEFAULT_FETCH_DIR))
    }

    pub fn artifact_output_dir(&self) -> &Path {
        self.artifacts
            .as_ref()
            .and_then(|a| a.output_dir.as_deref())
            .unwrap_or(Path::new(DEFAULT_ARTIFACT_DIR))
    }

    pub fn artifact_repository(&self) -> Option<&str> {
        self.artifacts
            .as_ref()
            .and_then(|a| a.repository.as_deref())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }
}
