//! Credential providers
//!
//! The workflow asks an injected [`CredentialProvider`] for a bearer token before
//! touching the registry. Three providers exist:
//!
//! - [`GcloudCredentialProvider`]: `gcloud auth print-access-token`
//! - [`EnvCredentialProvider`]: a token already exported in the environment (CI)
//! - [`StaticCredentialProvider`]: an explicit token value

use crate::core::error::WorkflowError;
use crate::core::traits::CredentialProvider;
use crate::security::command_executor::{CommandError, CommandOutput, SafeCommandExecutor};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

const GCLOUD: &str = "gcloud";

/// Token from the gcloud CLI's active account
#[derive(Debug, Clone)]
pub struct GcloudCredentialProvider {
    working_dir: PathBuf,
    timeout: Duration,
}

impl GcloudCredentialProvider {
    pub fn new(timeout: Duration) -> Self {
        Self {
            working_dir: env::temp_dir(),
            timeout,
        }
    }

    /// Turn `gcloud auth print-access-token` output into a token
    fn parse_token_output(output: &CommandOutput) -> Result<SecretString, WorkflowError> {
        if !output.success() {
            let reason = output.stderr.trim();
            return Err(WorkflowError::NotAuthenticated {
                provider: GCLOUD.to_string(),
                message: if reason.is_empty() {
                    format!("gcloud exited with {:?}", output.code)
                } else {
                    reason.to_string()
                },
            });
        }

        let token = output.stdout.trim();
        if token.is_empty() {
            return Err(WorkflowError::NotAuthenticated {
                provider: GCLOUD.to_string(),
                message: "gcloud returned an empty access token".to_string(),
            });
        }

        Ok(SecretString::new(token.into()))
    }
}

#[async_trait]
impl CredentialProvider for GcloudCredentialProvider {
    fn name(&self) -> &str {
        GCLOUD
    }

    async fn token(&self) -> Result<SecretString, WorkflowError> {
        let not_authenticated = |e: CommandError| WorkflowError::NotAuthenticated {
            provider: GCLOUD.to_string(),
            message: e.to_string(),
        };

        let mut executor = SafeCommandExecutor::new(&self.working_dir).map_err(not_authenticated)?;
        executor.set_timeout(self.timeout);

        debug!("requesting access token from gcloud");
        let output = executor
            .execute(GCLOUD, &["auth", "print-access-token"])
            .await
            .map_err(not_authenticated)?;

        let token = Self::parse_token_output(&output)?;
        info!("obtained access token from gcloud");
        Ok(token)
    }
}

/// Token exported in an environment variable
#[derive(Debug, Clone)]
pub struct EnvCredentialProvider {
    var: String,
}

impl EnvCredentialProvider {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    fn name(&self) -> &str {
        "env"
    }

    async fn token(&self) -> Result<SecretString, WorkflowError> {
        match env::var(&self.var) {
            Ok(value) if !value.trim().is_empty() => {
                debug!(var = %self.var, "using access token from environment");
                Ok(SecretString::new(value.trim().into()))
            }
            _ => Err(WorkflowError::NotAuthenticated {
                provider: "env".to_string(),
                message: format!("environment variable {} is not set", self.var),
            }),
        }
    }
}

/// Explicit token value
pub struct StaticCredentialProvider {
    token: SecretString,
}

impl StaticCredentialProvider {
    pub fn new(token: SecretString) -> Self {
        Self { token }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    fn name(&self) -> &str {
        "static"
    }

    async fn token(&self) -> Result<SecretString, WorkflowError> {
        let value = self.token.expose_secret();
        if value.is_empty() {
            return Err(WorkflowError::NotAuthenticated {
                provider: "static".to_string(),
                message: "empty token".to_string(),
            });
        }
        Ok(SecretString::new(value.into()))
    }
}
