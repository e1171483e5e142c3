//! Configuration file loader for artifact-publisher
//!
//! This module provides configuration loading, validation, and merging capabilities.

use super::config::*;
use crate::core::error::WorkflowError;
use crate::core::session::RegistryLocation;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Configuration file name
pub const CONFIG_FILENAME: &str = ".artifact-publisher.yaml";

/// Environment variable pattern (${VAR_NAME})
const ENV_VAR_PATTERN: &str = r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}";

/// Configuration load options
#[derive(Debug, Clone, Default)]
pub struct ConfigLoadOptions {
    /// Project path to load config from
    pub project_path: PathBuf,

    /// CLI arguments (highest priority)
    pub cli_args: Option<WorkflowConfig>,

    /// Environment variables
    pub env: HashMap<String, String>,
}

impl ConfigLoadOptions {
    /// Options capturing the current process environment
    pub fn from_process<P: AsRef<Path>>(project_path: P, cli_args: Option<WorkflowConfig>) -> Self {
        Self {
            project_path: project_path.as_ref().to_path_buf(),
            cli_args,
            env: std::env::vars().collect(),
        }
    }
}

/// Configuration validation result
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationResult {
    /// Is configuration valid?
    pub valid: bool,

    /// Validation errors
    pub errors: Vec<ConfigValidationError>,

    /// Validation warnings
    pub warnings: Vec<ConfigValidationWarning>,
}

/// Configuration validation error
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationError {
    /// Field path (e.g., "registry.url")
    pub field: String,

    /// Error message
    pub message: String,
}

/// Configuration validation warning
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationWarning {
    /// Field path
    pub field: String,

    /// Warning message
    pub message: String,

    /// Suggestion
    pub suggestion: Option<String>,
}

/// Configuration file loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from multiple sources with priority
    ///
    /// Priority (high to low):
    /// 1. CLI arguments
    /// 2. Environment variables
    /// 3. Project config (./.artifact-publisher.yaml)
    /// 4. Global config (~/.artifact-publisher.yaml)
    /// 5. Default values
    pub async fn load(options: ConfigLoadOptions) -> Result<WorkflowConfig, WorkflowError> {
        let mut configs: Vec<WorkflowConfig> = vec![WorkflowConfig::default()];

        if let Some(home) = options.env.get("HOME") {
            let global_path = PathBuf::from(home).join(CONFIG_FILENAME);
            if let Some(global_config) = Self::load_config_file(&global_path).await? {
                configs.push(global_config);
            }
        }

        let project_path = options.project_path.join(CONFIG_FILENAME);
        if let Some(project_config) = Self::load_config_file(&project_path).await? {
            configs.push(project_config);
        }

        if let Some(env_config) = Self::load_env_config(&options.env)? {
            configs.push(env_config);
        }

        if let Some(cli_config) = options.cli_args {
            configs.push(cli_config);
        }

        let merged = Self::merge_configs(configs);
        Self::expand_env_vars(merged, &options.env)
    }

    /// Load configuration from a YAML file; `None` when the file does not exist
    async fn load_config_file(file_path: &Path) -> Result<Option<WorkflowConfig>, WorkflowError> {
        if !file_path.exists() {
            return Ok(None);
        }

        debug!(path = %file_path.display(), "loading config file");

        let content = fs::read_to_string(file_path)
            .await
            .map_err(|e| WorkflowError::io(file_path, e))?;

        let config: WorkflowConfig = serde_yaml::from_str(&content).map_err(|e| {
            WorkflowError::config(format!(
                "failed to parse {}: {}",
                file_path.display(),
                e
            ))
        })?;

        Ok(Some(config))
    }

    /// Load configuration from environment variables
    fn load_env_config(
        env: &HashMap<String, String>,
    ) -> Result<Option<WorkflowConfig>, WorkflowError> {
        let mut config = WorkflowConfig::default();
        let mut has_changes = false;

        // ARTIFACT_REGISTRY_URL -> registry.url
        if let Some(url) = env.get("ARTIFACT_REGISTRY_URL") {
            config.registry.get_or_insert_with(Default::default).url = Some(url.clone());
            has_changes = true;
        }

        // ARTIFACT_REGISTRY_SCOPE -> registry.scope
        if let Some(scope) = env.get("ARTIFACT_REGISTRY_SCOPE") {
            config.registry.get_or_insert_with(Default::default).scope = Some(scope.clone());
            has_changes = true;
        }

        // ARTIFACT_PUBLISHER_TIMEOUT -> timeout
        if let Some(timeout) = env.get("ARTIFACT_PUBLISHER_TIMEOUT") {
            let secs = timeout.parse::<u64>().map_err(|_| {
                WorkflowError::config(format!(
                    "ARTIFACT_PUBLISHER_TIMEOUT must be a number of seconds, got {:?}",
                    timeout
                ))
            })?;
            config.timeout = Some(secs);
            has_changes = true;
        }

        // ARTIFACT_PUBLISHER_TOKEN_ENV -> credentials (env provider)
        if let Some(var) = env.get("ARTIFACT_PUBLISHER_TOKEN_ENV") {
            config.credentials = Some(CredentialConfig {
                provider: Some(CredentialSource::Env),
                env_var: Some(var.clone()),
            });
            has_changes = true;
        }

        Ok(if has_changes { Some(config) } else { None })
    }

    /// Merge multiple configurations; later entries win
    fn merge_configs(configs: Vec<WorkflowConfig>) -> WorkflowConfig {
        let mut result = WorkflowConfig::default();

        for config in configs {
            Self::merge_into(&mut result, config);
        }

        result
    }

    /// Merge source config into target, field by field
    fn merge_into(target: &mut WorkflowConfig, source: WorkflowConfig) {
        if let Some(registry) = source.registry {
            let target_registry = target.registry.get_or_insert_with(Default::default);
            if registry.url.is_some() {
                target_registry.url = registry.url;
            }
            if registry.scope.is_some() {
                target_registry.scope = registry.scope;
            }
        }

        if let Some(credentials) = source.credentials {
            let target_credentials = target.credentials.get_or_insert_with(Default::default);
            if credentials.provider.is_some() {
                target_credentials.provider = credentials.provider;
            }
            if credentials.env_var.is_some() {
                target_credentials.env_var = credentials.env_var;
            }
        }

        if let Some(npm) = source.npm {
            let target_npm = target.npm.get_or_insert_with(Default::default);
            if npm.token_env.is_some() {
                target_npm.token_env = npm.token_env;
            }
            if npm.tag.is_some() {
                target_npm.tag = npm.tag;
            }
        }

        if let Some(fetch) = source.fetch
            && fetch.output_dir.is_some()
        {
            target.fetch = Some(fetch);
        }

        if let Some(artifacts) = source.artifacts {
            let target_artifacts = target.artifacts.get_or_insert_with(Default::default);
            if artifacts.output_dir.is_some() {
                target_artifacts.output_dir = artifacts.output_dir;
            }
            if artifacts.repository.is_some() {
                target_artifacts.repository = artifacts.repository;
            }
        }

        if source.timeout.is_some() {
            target.timeout = source.timeout;
        }
    }

    /// Expand `${VAR}` references in string values
    fn expand_env_vars(
        mut config: WorkflowConfig,
        env: &HashMap<String, String>,
    ) -> Result<WorkflowConfig, WorkflowError> {
        if let Some(registry) = &mut config.registry {
            if let Some(url) = &registry.url {
                registry.url = Some(Self::expand_string(url, env)?);
            }
            if let Some(scope) = &registry.scope {
                registry.scope = Some(Self::expand_string(scope, env)?);
            }
        }

        if let Some(artifacts) = &mut config.artifacts
            && let Some(repository) = &artifacts.repository
        {
            artifacts.repository = Some(Self::expand_string(repository, env)?);
        }

        Ok(config)
    }

    /// Expand environment variables in a single string
    fn expand_string(input: &str, env: &HashMap<String, String>) -> Result<String, WorkflowError> {
        let env_var_regex = Regex::new(ENV_VAR_PATTERN)
            .map_err(|e| WorkflowError::config(format!("invalid pattern: {}", e)))?;

        let mut result = input.to_string();
        for cap in env_var_regex.captures_iter(input) {
            let var_name = &cap[1];
            let value = env.get(var_name).ok_or_else(|| {
                WorkflowError::config(format!(
                    "environment variable {} referenced in configuration is not set",
                    var_name
                ))
            })?;
            result = result.replace(&format!("${{{}}}", var_name), value);
        }

        Ok(result)
    }

    /// Validate configuration
    pub fn validate(config: &WorkflowConfig) -> ConfigValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        match config.registry_url() {
            None => errors.push(ConfigValidationError {
                field: "registry.url".to_string(),
                message: "registry URL is required (--registry or ARTIFACT_REGISTRY_URL)"
                    .to_string(),
            }),
            Some(url) => {
                if let Err(e) = RegistryLocation::parse(url) {
                    errors.push(ConfigValidationError {
                        field: "registry.url".to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        match config.scope() {
            Some(scope) if !scope.starts_with('@') || scope.len() < 2 || scope.contains('/') => {
                errors.push(ConfigValidationError {
                    field: "registry.scope".to_string(),
                    message: format!("scope must look like @name, got {:?}", scope),
                });
            }
            Some(_) => {}
            None => warnings.push(ConfigValidationWarning {
                field: "registry.scope".to_string(),
                message: "no scope configured".to_string(),
                suggestion: Some("the scope is derived from the package name".to_string()),
            }),
        }

        if config.timeout == Some(0) {
            errors.push(ConfigValidationError {
                field: "timeout".to_string(),
                message: "timeout must be greater than zero".to_string(),
            });
        }

        if config.token_env().is_empty() {
            errors.push(ConfigValidationError {
                field: "npm.tokenEnv".to_string(),
                message: "token placeholder variable must not be empty".to_string(),
            });
        }

        ConfigValidationResult {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// Validate and convert the first error into a [`WorkflowError`]
    pub fn require_valid(config: &WorkflowConfig) -> Result<(), WorkflowError> {
        let result = Self::validate(config);
        match result.errors.first() {
            Some(error) => Err(WorkflowError::config(format!(
                "[{}] {}",
                error.field, error.message
            ))),
            None => Ok(()),
        }
    }

}
