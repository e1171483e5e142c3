//! npm install interop
//!
//! Installing into a project is delegated to `npm install`, which reads the
//! `.npmrc` written earlier and substitutes the token placeholder from its own
//! environment. The token is exported to the child process only.

use crate::core::error::WorkflowError;
use crate::core::session::{PublishSession, package_scope};
use crate::security::{CommandOutput, SafeCommandExecutor, SecureTokenManager};
use crate::validation::manifest_validator::MANIFEST_FILE;
use secrecy::ExposeSecret;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const NPM: &str = "npm";

/// Lines of npm output kept in error messages
const ERROR_TAIL_LINES: usize = 12;

/// Runs `npm install` in a project directory
#[derive(Debug, Clone)]
pub struct NpmInstaller {
    project_dir: PathBuf,
    timeout: Duration,
}

impl NpmInstaller {
    /// The project must exist and contain a `package.json`.
    pub fn new<P: AsRef<Path>>(project_dir: P, timeout: Duration) -> Result<Self, WorkflowError> {
        let project_dir = project_dir.as_ref().to_path_buf();

        if !project_dir.join(MANIFEST_FILE).is_file() {
            return Err(WorkflowError::Dependency {
                message: format!(
                    "{} has no {}; run `npm init` first",
                    project_dir.display(),
                    MANIFEST_FILE
                ),
            });
        }

        Ok(Self {
            project_dir,
            timeout,
        })
    }

    /// Arguments passed to npm for `name@version`
    pub fn install_args(session: &PublishSession, version: &str) -> Vec<String> {
        let mut args = vec![
            "install".to_string(),
            format!("{}@{}", session.package_name, version),
            "--no-audit".to_string(),
            "--no-fund".to_string(),
        ];

        // Only packages under the .npmrc scope line are routed by it
        if package_scope(&session.package_name) != Some(session.scope.as_str()) {
            args.push(format!("--registry={}", session.registry));
        }

        args
    }

    /// Install `version` of the session's package
    pub async fn install(
        &self,
        session: &PublishSession,
        version: &str,
        token_env: &str,
        masker: &SecureTokenManager,
    ) -> Result<CommandOutput, WorkflowError> {
        let mut executor = SafeCommandExecutor::new(&self.project_dir)
            .map_err(|e| e.into_workflow_error(NPM))?;
        executor.set_timeout(self.timeout);

        let args = Self::install_args(session, version);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        debug!(args = ?arg_refs, "running npm install");

        let output = executor
            .execute_with_env(
                NPM,
                &arg_refs,
                &[(token_env, session.token().expose_secret())],
            )
            .await
            .map_err(|e| e.into_workflow_error(NPM))?;

        if !output.success() {
            return Err(classify_failure(&output, session, masker));
        }

        info!(package = %session.package_name, version, "npm install finished");
        Ok(CommandOutput {
            code: output.code,
            stdout: masker.mask_tokens_in_string(&output.stdout),
            stderr: masker.mask_tokens_in_string(&output.stderr),
        })
    }
}

/// Map a failed `npm install` to a workflow error.
///
/// Authentication and lookup failures are registry errors; anything else is
/// treated as a dependency resolution problem.
pub fn classify_failure(
    output: &CommandOutput,
    session: &PublishSession,
    masker: &SecureTokenManager,
) -> WorkflowError {
    let text = masker.mask_tokens_in_string(&output.combined());
    let registry = session.registry.to_string();

    if text.contains("E401") || text.contains("401 Unauthorized") {
        return WorkflowError::Unauthorized {
            registry,
            status: 401,
        };
    }
    if text.contains("E403") || text.contains("403 Forbidden") {
        return WorkflowError::Unauthorized {
            registry,
            status: 403,
        };
    }
    if text.contains("E404") || text.contains("404 Not Found") {
        return WorkflowError::PackageNotFound {
            registry,
            package: session.package_name.clone(),
        };
    }

    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let tail = lines[lines.len().saturating_sub(ERROR_TAIL_LINES)..].join("\n");
    WorkflowError::Dependency {
        message: if tail.is_empty() {
            format!("npm install exited with {:?}", output.code)
        } else {
            tail
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorCategory;
    use crate::core::session::{RegistryLocation, VersionRequest};
    use secrecy::SecretString;
    use tempfile::TempDir;

    const TOKEN: &str = "ya29.secret-token-value";

    fn session(package: &str) -> PublishSession {
        PublishSession::new(
            RegistryLocation::parse("https://us-central1-npm.pkg.dev/acme/npm-repo").unwrap(),
            Some("@observability"),
            package,
            VersionRequest::Latest,
            SecretString::new(TOKEN.into()),
        )
        .unwrap()
    }

    fn failed(stderr: &str) -> CommandOutput {
        CommandOutput {
            code: Some(1),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    fn masker() -> SecureTokenManager {
        let mut manager = SecureTokenManager::new();
        manager.register(&SecretString::new(TOKEN.into()));
        manager
    }

    #[test]
    fn test_new_requires_package_json() {
        let temp_dir = TempDir::new().unwrap();
        let error = NpmInstaller::new(temp_dir.path(), Duration::from_secs(5)).unwrap_err();
        assert_eq!(error.category(), ErrorCategory::Dependency);

        std::fs::write(temp_dir.path().join("package.json"), "{}").unwrap();
        assert!(NpmInstaller::new(temp_dir.path(), Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_install_args_scoped() {
        let args = NpmInstaller::install_args(&session("@observability/react-app"), "1.2.0");
        assert_eq!(
            args,
            vec!["install", "@observability/react-app@1.2.0", "--no-audit", "--no-fund"]
        );
    }

    #[test]
    fn test_install_args_unscoped_pins_registry() {
        let args = NpmInstaller::install_args(&session("react-app"), "1.2.0");
        assert_eq!(
            args.last().map(String::as_str),
            Some("--registry=https://us-central1-npm.pkg.dev/acme/npm-repo/")
        );
    }

    #[test]
    fn test_foreign_scope_never_reaches_npm() {
        let result = PublishSession::new(
            RegistryLocation::parse("https://us-central1-npm.pkg.dev/acme/npm-repo").unwrap(),
            Some("@observability"),
            "@acme/lib",
            VersionRequest::Latest,
            SecretString::new(TOKEN.into()),
        );
        assert!(matches!(result, Err(WorkflowError::Config { .. })));
    }

    #[test]
    fn test_classify_auth_failures() {
        let s = session("@observability/react-app");
        let error = classify_failure(
            &failed("npm ERR! code E401\nnpm ERR! Unable to authenticate"),
            &s,
            &masker(),
        );
        assert!(matches!(error, WorkflowError::Unauthorized { status: 401, .. }));

        let error = classify_failure(&failed("npm ERR! code E403"), &s, &masker());
        assert!(matches!(error, WorkflowError::Unauthorized { status: 403, .. }));
    }

    #[test]
    fn test_classify_not_found() {
        let error = classify_failure(
            &failed("npm ERR! code E404\nnpm ERR! 404 Not Found - GET https://..."),
            &session("@observability/react-app"),
            &masker(),
        );
        assert_eq!(error.category(), ErrorCategory::Registry);
    }

    #[test]
    fn test_classify_dependency_failure_masks_token() {
        let error = classify_failure(
            &failed(&format!(
                "npm ERR! code ERESOLVE\nnpm ERR! could not resolve peer react@18\nnpm ERR! token {}",
                TOKEN
            )),
            &session("@observability/react-app"),
            &masker(),
        );

        assert_eq!(error.category(), ErrorCategory::Dependency);
        let message = error.to_string();
        assert!(message.contains("ERESOLVE"));
        assert!(!message.contains(TOKEN));
    }
}
