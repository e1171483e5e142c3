//! Error handling for the registry workflow
//!
//! Every stage of the workflow returns a [`WorkflowError`]. Each variant belongs to
//! one [`ErrorCategory`], carries a stable error code and a list of suggested
//! actions that the reporter prints before exiting.

use std::path::PathBuf;
use thiserror::Error;

/// Broad failure classes surfaced to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Identity provider did not hand out a token
    Auth,
    /// Registry answered with a non-success response
    Registry,
    /// Filesystem read/write failure
    Io,
    /// Archive missing, corrupt or not matching its integrity
    Extraction,
    /// Local dependency installation failed
    Dependency,
    /// Invalid configuration, arguments or package manifest
    Config,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "AuthError",
            Self::Registry => "RegistryError",
            Self::Io => "IOError",
            Self::Extraction => "ExtractionError",
            Self::Dependency => "DependencyError",
            Self::Config => "ConfigError",
        }
    }
}

/// Main error type for workflow operations
#[derive(Error, Debug)]
pub enum WorkflowError {
    // Credential errors
    #[error("[{provider}] not authenticated: {message}")]
    NotAuthenticated { provider: String, message: String },

    // Registry errors
    #[error("[{registry}] authentication rejected (HTTP {status})")]
    Unauthorized { registry: String, status: u16 },

    #[error("[{registry}] package {package} not found")]
    PackageNotFound { registry: String, package: String },

    #[error("[{registry}] version {version} of {package} not found")]
    VersionNotFound {
        registry: String,
        package: String,
        version: String,
    },

    #[error("[{registry}] version {version} of {package} already exists")]
    VersionConflict {
        registry: String,
        package: String,
        version: String,
    },

    #[error("[{registry}] request failed: {message}")]
    RegistryRequest {
        registry: String,
        status: Option<u16>,
        message: String,
    },

    // Filesystem errors
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Archive errors
    #[error("archive extraction failed: {message}")]
    Extraction { message: String },

    #[error("archive integrity mismatch for {package}: expected {expected}")]
    IntegrityMismatch { package: String, expected: String },

    // Install errors
    #[error("dependency installation failed: {message}")]
    Dependency { message: String },

    // Configuration errors
    #[error("invalid configuration: {message}")]
    Config { message: String },

    #[error("invalid package manifest: {message}")]
    InvalidManifest { message: String },

    // Command execution errors
    #[error("[{command}] command failed: {message}")]
    Command { command: String, message: String },
}

impl WorkflowError {
    /// Shorthand for an I/O error bound to a path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Shorthand for an extraction error
    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction {
            message: message.into(),
        }
    }

    /// Shorthand for a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Failure class of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotAuthenticated { .. } => ErrorCategory::Auth,
            Self::Unauthorized { .. }
            | Self::PackageNotFound { .. }
            | Self::VersionNotFound { .. }
            | Self::VersionConflict { .. }
            | Self::RegistryRequest { .. } => ErrorCategory::Registry,
            Self::Io { .. } | Self::Command { .. } => ErrorCategory::Io,
            Self::Extraction { .. } | Self::IntegrityMismatch { .. } => ErrorCategory::Extraction,
            Self::Dependency { .. } => ErrorCategory::Dependency,
            Self::Config { .. } | Self::InvalidManifest { .. } => ErrorCategory::Config,
        }
    }

    /// Process exit code for this error. Every checked failure exits with 1.
    pub fn exit_code(&self) -> i32 {
        1
    }

    /// Get suggested actions for this error
    pub fn suggested_actions(&self) -> Vec<&'static str> {
        match self {
            Self::NotAuthenticated { .. } => vec![
                "Run `gcloud auth login` and retry",
                "Check that the token environment variable is set when using --token-env",
            ],
            Self::Unauthorized { .. } => vec![
                "Check that your account can read/write the Artifact Registry repository",
                "Access tokens are short-lived; run the command again to refresh",
            ],
            Self::PackageNotFound { .. } => vec![
                "Check the package name and scope",
                "Check the registry URL",
            ],
            Self::VersionNotFound { .. } => {
                vec!["Run `artifact-publisher versions <package>` to see available versions"]
            }
            Self::VersionConflict { .. } => vec![
                "Bump the version in package.json",
                "Use --auto-version to publish a timestamped version",
            ],
            Self::RegistryRequest { .. } => vec![
                "Check your network connection",
                "Check the registry status",
            ],
            Self::Io { .. } => vec!["Check file permissions and free disk space"],
            Self::Extraction { .. } | Self::IntegrityMismatch { .. } => vec![
                "The archive may be corrupt; fetch it again",
                "Check that the package was published with `npm publish` or this tool",
            ],
            Self::Dependency { .. } => vec![
                "Check the npm output above",
                "Run `npm install` manually to inspect dependency conflicts",
            ],
            Self::Config { .. } => vec![
                "Check .artifact-publisher.yaml and command-line arguments",
                "Registry URL format: https://<location>-npm.pkg.dev/<project>/<repository>/",
            ],
            Self::InvalidManifest { .. } => vec!["Fix package.json and retry"],
            Self::Command { .. } => vec![
                "Check that the command is installed and on PATH",
                "Re-run with --verbose to see the command output",
            ],
        }
    }

    /// Get error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotAuthenticated { .. } => "NOT_AUTHENTICATED",
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::PackageNotFound { .. } => "PACKAGE_NOT_FOUND",
            Self::VersionNotFound { .. } => "VERSION_NOT_FOUND",
            Self::VersionConflict { .. } => "VERSION_CONFLICT",
            Self::RegistryRequest { .. } => "REGISTRY_REQUEST_FAILED",
            Self::Io { .. } => "IO_ERROR",
            Self::Extraction { .. } => "EXTRACTION_FAILED",
            Self::IntegrityMismatch { .. } => "INTEGRITY_MISMATCH",
            Self::Dependency { .. } => "DEPENDENCY_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::InvalidManifest { .. } => "INVALID_MANIFEST",
            Self::Command { .. } => "COMMAND_ERROR",
        }
    }
}
