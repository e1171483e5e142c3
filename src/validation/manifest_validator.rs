//! Manifest Validator - loads and validates `package.json`
//!
//! Before a package is packed and uploaded its manifest is checked against the
//! npm naming rules and for a valid semantic version.
//!
//! # Example
//!
//! ```no_run
//! use artifact_publisher::validation::ManifestValidator;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), artifact_publisher::WorkflowError> {
//! let validator = ManifestValidator::new();
//! let manifest = validator.load(Path::new(".")).await?;
//! let result = validator.validate(&manifest);
//!
//! if result.is_valid {
//!     println!("{}@{} is ready", manifest.name, manifest.version);
//! }
//! # Ok(())
//! # }
//! ```

use crate::core::error::WorkflowError;
use crate::validation::version_validator::VersionValidator;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// Manifest file name
pub const MANIFEST_FILE: &str = "package.json";

/// Parsed `package.json`; unknown fields are preserved for publishing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageManifest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    /// Files/directories included in the published tarball
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PackageManifest {
    /// Manifest as a JSON value (all fields, including unknown ones)
    pub fn to_value(&self) -> Result<serde_json::Value, WorkflowError> {
        serde_json::to_value(self).map_err(|e| WorkflowError::InvalidManifest {
            message: e.to_string(),
        })
    }

    /// Pretty-printed manifest with a trailing newline
    pub fn to_pretty_json(&self) -> Result<String, WorkflowError> {
        serde_json::to_string_pretty(self)
            .map(|json| json + "\n")
            .map_err(|e| WorkflowError::InvalidManifest {
                message: e.to_string(),
            })
    }
}

/// Result of manifest validation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    /// Whether the manifest is valid
    pub is_valid: bool,
    /// List of validation errors
    pub errors: Vec<String>,
    /// List of validation warnings
    pub warnings: Vec<String>,
}

/// Validator for `package.json`
#[derive(Debug, Default, Clone, Copy)]
pub struct ManifestValidator;

impl ManifestValidator {
    pub fn new() -> Self {
        Self
    }

    /// Read and parse `package.json` from a package directory
    pub async fn load(&self, package_dir: &Path) -> Result<PackageManifest, WorkflowError> {
        let path = package_dir.join(MANIFEST_FILE);
        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| WorkflowError::io(&path, e))?;

        serde_json::from_str(&content).map_err(|e| WorkflowError::InvalidManifest {
            message: format!("{}: {}", path.display(), e),
        })
    }

    /// Validate name and version of a manifest
    pub fn validate(&self, manifest: &PackageManifest) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if manifest.name.is_empty() {
            errors.push("name is required".to_string());
        } else {
            errors.extend(self.validate_package_name(&manifest.name));
        }

        if manifest.version.is_empty() {
            errors.push("version is required".to_string());
        } else if !VersionValidator::new().is_valid(&manifest.version) {
            errors.push(format!("invalid semantic version: {}", manifest.version));
        }

        if manifest.license.is_none() {
            warnings.push("license field is recommended".to_string());
        }

        if manifest.files.as_ref().is_some_and(|files| files.is_empty()) {
            warnings.push("files is empty; only package.json will be published".to_string());
        }

        ValidationResult {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// Validate and convert the errors into a [`WorkflowError`]
    pub fn require_valid(&self, manifest: &PackageManifest) -> Result<ValidationResult, WorkflowError> {
        let result = self.validate(manifest);
        if !result.is_valid {
            return Err(WorkflowError::InvalidManifest {
                message: result.errors.join("; "),
            });
        }
        Ok(result)
    }

    /// Validate package name according to npm rules
    /// https://docs.npmjs.com/cli/v10/configuring-npm/package-json#name
    pub fn validate_package_name(&self, name: &str) -> Vec<String> {
        let mut errors = Vec::new();

        if name.len() > 214 {
            errors.push("package name must be at most 214 characters".to_string());
        }

        let name_without_scope = match name.strip_prefix('@') {
            Some(scoped) => match scoped.split_once('/') {
                Some((scope, rest)) if !scope.is_empty() && !rest.is_empty() => rest,
                _ => {
                    errors.push("scoped package name must look like @scope/name".to_string());
                    return errors;
                }
            },
            None => name,
        };

        if name_without_scope.starts_with('.') || name_without_scope.starts_with('_') {
            errors.push("package name cannot start with a dot or an underscore".to_string());
        }

        if name.chars().any(|c| c.is_uppercase()) {
            errors.push("package name cannot contain uppercase letters".to_string());
        }

        let url_safe = Regex::new(r"^(@[a-z0-9._~-]+/)?[a-z0-9._~-]+$").ok();
        if !url_safe.is_some_and(|re| re.is_match(name)) {
            errors.push("package name may only contain URL-safe characters".to_string());
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manifest(name: &str, version: &str) -> PackageManifest {
        PackageManifest {
            name: name.to_string(),
            version: version.to_string(),
            description: None,
            license: Some("MIT".to_string()),
            files: None,
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_validate_package_name_valid() {
        let validator = ManifestValidator::new();
        assert!(validator.validate_package_name("my-package").is_empty());
        assert!(validator.validate_package_name("@observability/react-app").is_empty());
    }

    #[test]
    fn test_validate_package_name_uppercase() {
        let validator = ManifestValidator::new();
        assert!(!validator.validate_package_name("MyPackage").is_empty());
    }

    #[test]
    fn test_validate_package_name_too_long() {
        let validator = ManifestValidator::new();
        assert!(!validator.validate_package_name(&"a".repeat(215)).is_empty());
    }

    #[test]
    fn test_validate_package_name_starts_with_dot() {
        let validator = ManifestValidator::new();
        assert!(!validator.validate_package_name(".hidden").is_empty());
        assert!(!validator.validate_package_name("@scope/_private").is_empty());
    }

    #[test]
    fn test_validate_package_name_bad_scope() {
        let validator = ManifestValidator::new();
        assert!(!validator.validate_package_name("@scope").is_empty());
        assert!(!validator.validate_package_name("@/name").is_empty());
    }

    #[test]
    fn test_validate_invalid_semver() {
        let validator = ManifestValidator::new();
        let result = validator.validate(&manifest("@observability/react-app", "1.0"));

        assert!(!result.is_valid);
        assert!(result.errors[0].contains("1.0"));
    }

    #[test]
    fn test_validate_missing_fields() {
        let validator = ManifestValidator::new();
        let result = validator.validate(&manifest("", ""));

        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 2);
        assert!(validator.require_valid(&manifest("", "")).is_err());
    }

    #[test]
    fn test_validate_license_warning() {
        let validator = ManifestValidator::new();
        let mut pkg = manifest("@observability/react-app", "0.1.0");
        pkg.license = None;

        let result = validator.validate(&pkg);
        assert!(result.is_valid);
        assert_eq!(result.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_load_preserves_unknown_fields() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(MANIFEST_FILE),
            r#"{"name": "@observability/react-app", "version": "0.1.0", "files": ["dist"], "scripts": {"build": "vite build"}}"#,
        )
        .unwrap();

        let validator = ManifestValidator::new();
        let pkg = validator.load(temp_dir.path()).await.unwrap();

        assert_eq!(pkg.name, "@observability/react-app");
        assert_eq!(pkg.files, Some(vec!["dist".to_string()]));
        assert!(pkg.extra.contains_key("scripts"));

        let value = pkg.to_value().unwrap();
        assert_eq!(value["scripts"]["build"], "vite build");
    }

    #[tokio::test]
    async fn test_load_missing_manifest_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = ManifestValidator::new().load(temp_dir.path()).await;
        assert!(matches!(result, Err(WorkflowError::Io { .. })));
    }
}
