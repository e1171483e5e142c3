//! Result reporter
//!
//! Turns the outcome of a workflow operation into an exit code and the status
//! text shown to the user. Registered tokens are masked in everything printed.

use crate::core::error::WorkflowError;
use crate::core::traits::{
    ArtifactPushResult, ConfigureResult, FetchResult, InstallResult, PublishResult, VersionList,
};
use crate::security::SecureTokenManager;
use serde::Serialize;
use serde_json::json;

/// Exit code for a successful run
pub const EXIT_SUCCESS: i32 = 0;

/// How results are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Human-readable summary of an operation result
pub trait Report: Serialize {
    /// Headline printed after the ✅ marker
    fn headline(&self) -> String;

    /// Detail lines printed below the headline
    fn details(&self) -> Vec<String> {
        Vec::new()
    }
}

impl Report for VersionList {
    fn headline(&self) -> String {
        format!("{} version(s) of {}", self.versions.len(), self.package_name)
    }

    fn details(&self) -> Vec<String> {
        let mut lines: Vec<String> = self.versions.iter().map(|v| format!("  - {}", v)).collect();
        if let Some(latest) = &self.latest_tag {
            lines.push(format!("  latest tag: {}", latest));
        }
        lines
    }
}

impl Report for InstallResult {
    fn headline(&self) -> String {
        format!("Installed {}@{}", self.package_name, self.version)
    }

    fn details(&self) -> Vec<String> {
        vec![format!("  Project: {}", self.project_dir.display())]
    }
}

impl Report for PublishResult {
    fn headline(&self) -> String {
        if self.dry_run {
            format!(
                "Dry run: {}@{} packed, not uploaded",
                self.package_name, self.version
            )
        } else {
            format!("Published {}@{}", self.package_name, self.version)
        }
    }

    fn details(&self) -> Vec<String> {
        let mut lines = vec![
            format!("  Registry: {}", self.registry_url),
            format!("  Tag: {}", self.tag),
            format!("  Size: {} bytes, {} file(s)", self.tarball_size, self.files.len()),
            format!("  Integrity: {}", self.integrity),
        ];
        if self.dry_run {
            lines.extend(self.files.iter().map(|f| format!("    {}", f)));
        }
        lines
    }
}

impl Report for FetchResult {
    fn headline(&self) -> String {
        format!(
            "Fetched {}@{} into {}",
            self.package_name,
            self.version,
            self.output_dir.display()
        )
    }

    fn details(&self) -> Vec<String> {
        self.files.iter().map(|f| format!("  - {}", f)).collect()
    }
}

impl Report for ConfigureResult {
    fn headline(&self) -> String {
        format!("Wrote {}", self.npmrc_path.display())
    }

    fn details(&self) -> Vec<String> {
        let mut lines = vec![
            format!("  Registry: {}", self.registry_url),
            format!("  Scope: {}", self.scope),
        ];
        if !self.changed {
            lines.push("  (already up to date)".to_string());
        } else if self.replaced_existing {
            lines.push("  (replaced existing content)".to_string());
        }
        lines
    }
}

impl Report for ArtifactPushResult {
    fn headline(&self) -> String {
        format!("Pushed {} version {}", self.package, self.version)
    }

    fn details(&self) -> Vec<String> {
        vec![
            format!("  Repository: {}", self.repository),
            format!("  Artifact: {}", self.artifact_path.display()),
        ]
    }
}

/// Prints outcomes and maps them to exit codes
pub struct Reporter<'a> {
    format: OutputFormat,
    masker: &'a SecureTokenManager,
}

impl<'a> Reporter<'a> {
    pub fn new(format: OutputFormat, masker: &'a SecureTokenManager) -> Self {
        Self { format, masker }
    }

    /// Print the outcome and return the process exit code
    pub fn report<T: Report>(&self, outcome: &Result<T, WorkflowError>) -> i32 {
        match outcome {
            Ok(value) => {
                println!("{}", self.render_success(value));
                EXIT_SUCCESS
            }
            Err(error) => {
                eprintln!("{}", self.render_failure(error));
                error.exit_code()
            }
        }
    }

    pub fn render_success<T: Report>(&self, value: &T) -> String {
        let text = match self.format {
            OutputFormat::Text => {
                let mut lines = vec![format!("\n✅ {}", value.headline())];
                lines.extend(value.details());
                lines.join("\n")
            }
            OutputFormat::Json => {
                let body = json!({ "success": true, "result": value });
                serde_json::to_string_pretty(&body).unwrap_or_else(|e| {
                    format!(r#"{{"success": true, "serializationError": "{}"}}"#, e)
                })
            }
        };
        self.masker.mask_tokens_in_string(&text)
    }

    pub fn render_failure(&self, error: &WorkflowError) -> String {
        let text = match self.format {
            OutputFormat::Text => {
                let mut lines = vec![
                    format!("\n❌ {}", error),
                    format!("   {} ({})", error.category().as_str(), error.code()),
                ];
                let actions = error.suggested_actions();
                if !actions.is_empty() {
                    lines.push("\n💡 Suggested actions:".to_string());
                    lines.extend(actions.iter().map(|a| format!("  - {}", a)));
                }
                lines.join("\n")
            }
            OutputFormat::Json => {
                let body = json!({
                    "success": false,
                    "error": {
                        "category": error.category().as_str(),
                        "code": error.code(),
                        "message": error.to_string(),
                        "suggestedActions": error.suggested_actions(),
                    }
                });
                serde_json::to_string_pretty(&body).unwrap_or_else(|_| error.to_string())
            }
        };
        self.masker.mask_tokens_in_string(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use std::path::PathBuf;

    fn versions() -> VersionList {
        VersionList {
            package_name: "@observability/react-app".to_string(),
            versions: vec!["0.1.0".to_string(), "0.2.0".to_string()],
            latest_tag: Some("0.2.0".to_string()),
        }
    }

    #[test]
    fn test_success_exit_code_and_text() {
        let masker = SecureTokenManager::new();
        let reporter = Reporter::new(OutputFormat::Text, &masker);

        let outcome: Result<VersionList, WorkflowError> = Ok(versions());
        assert_eq!(reporter.report(&outcome), 0);

        let text = reporter.render_success(&versions());
        assert!(text.contains("✅ 2 version(s) of @observability/react-app"));
        assert!(text.contains("  - 0.2.0"));
    }

    #[test]
    fn test_failure_exit_code_and_text() {
        let masker = SecureTokenManager::new();
        let reporter = Reporter::new(OutputFormat::Text, &masker);
        let error = WorkflowError::VersionConflict {
            registry: "https://r.example/npm/".to_string(),
            package: "@observability/react-app".to_string(),
            version: "0.1.0".to_string(),
        };

        let text = reporter.render_failure(&error);
        assert!(text.contains("❌"));
        assert!(text.contains("RegistryError (VERSION_CONFLICT)"));
        assert!(text.contains("--auto-version"));

        let outcome: Result<VersionList, WorkflowError> = Err(error);
        assert_eq!(reporter.report(&outcome), 1);
    }

    #[test]
    fn test_json_output() {
        let masker = SecureTokenManager::new();
        let reporter = Reporter::new(OutputFormat::Json, &masker);

        let success: serde_json::Value =
            serde_json::from_str(&reporter.render_success(&versions())).unwrap();
        assert_eq!(success["success"], true);
        assert_eq!(success["result"]["versions"][1], "0.2.0");

        let failure: serde_json::Value = serde_json::from_str(&reporter.render_failure(
            &WorkflowError::NotAuthenticated {
                provider: "gcloud".to_string(),
                message: "no active account".to_string(),
            },
        ))
        .unwrap();
        assert_eq!(failure["success"], false);
        assert_eq!(failure["error"]["category"], "AuthError");
        assert_eq!(failure["error"]["code"], "NOT_AUTHENTICATED");
    }

    #[test]
    fn test_tokens_are_masked() {
        let mut masker = SecureTokenManager::new();
        masker.register(&SecretString::new("ya29.very-secret-token".into()));
        let reporter = Reporter::new(OutputFormat::Text, &masker);

        let error = WorkflowError::Dependency {
            message: "npm ERR! bad token ya29.very-secret-token".to_string(),
        };
        let text = reporter.render_failure(&error);

        assert!(!text.contains("ya29.very-secret-token"));
        assert!(text.contains("ya2...ken"));
    }

    #[test]
    fn test_dry_run_publish_lists_files() {
        let result = PublishResult {
            package_name: "@observability/react-app".to_string(),
            version: "0.1.0".to_string(),
            registry_url: "https://r.example/npm/".to_string(),
            tag: "latest".to_string(),
            integrity: "sha512-abc".to_string(),
            tarball_size: 512,
            files: vec!["package.json".to_string(), "dist/index.js".to_string()],
            dry_run: true,
        };

        assert!(result.headline().starts_with("Dry run"));
        assert!(result.details().iter().any(|l| l.contains("dist/index.js")));
    }

    #[test]
    fn test_fetch_details() {
        let result = FetchResult {
            package_name: "@observability/react-app".to_string(),
            version: "1.0.0".to_string(),
            output_dir: PathBuf::from("fetched-package"),
            files: vec!["index.js".to_string()],
        };

        assert_eq!(result.headline(), "Fetched @observability/react-app@1.0.0 into fetched-package");
        assert_eq!(result.details(), vec!["  - index.js"]);
    }
}
