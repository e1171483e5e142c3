//! Version Validator - semantic version checks and version resolution
//!
//! Registry version lists come back unordered; this module sorts them by
//! Semantic Versioning 2.0.0 precedence and resolves a [`VersionRequest`]
//! against them.
//!
//! # Example
//!
//! ```
//! use artifact_publisher::core::VersionRequest;
//! use artifact_publisher::validation::VersionValidator;
//! use std::collections::HashMap;
//!
//! let validator = VersionValidator::new();
//! let versions = validator.sort_versions(["0.10.0", "0.2.0", "0.9.1"]);
//! assert_eq!(versions, vec!["0.2.0", "0.9.1", "0.10.0"]);
//!
//! let resolved = validator.resolve(&VersionRequest::Latest, &versions, &HashMap::new());
//! assert_eq!(resolved.as_deref(), Some("0.10.0"));
//! ```

use crate::core::session::VersionRequest;
use semver::Version;
use std::collections::HashMap;
use tracing::warn;

/// Validator for semantic versioning
#[derive(Debug, Default, Clone, Copy)]
pub struct VersionValidator;

impl VersionValidator {
    pub fn new() -> Self {
        Self
    }

    /// Check that a string is a valid semantic version
    ///
    /// # Examples
    ///
    /// ```
    /// use artifact_publisher::validation::VersionValidator;
    ///
    /// let validator = VersionValidator::new();
    /// assert!(validator.is_valid("1.2.3-alpha.1"));
    /// assert!(!validator.is_valid("1.0"));
    /// ```
    pub fn is_valid(&self, version_str: &str) -> bool {
        Version::parse(version_str).is_ok()
    }

    /// Check if version is a prerelease
    pub fn is_prerelease(&self, version_str: &str) -> bool {
        Version::parse(version_str)
            .map(|v| !v.pre.is_empty())
            .unwrap_or(false)
    }

    /// Sort versions ascending by semver precedence.
    ///
    /// Strings that are not valid semantic versions are dropped with a warning.
    pub fn sort_versions<I, S>(&self, versions: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parsed: Vec<Version> = versions
            .into_iter()
            .filter_map(|v| match Version::parse(v.as_ref()) {
                Ok(version) => Some(version),
                Err(e) => {
                    warn!(version = v.as_ref(), error = %e, "ignoring non-semver version");
                    None
                }
            })
            .collect();

        parsed.sort();
        parsed.dedup();
        parsed.into_iter().map(|v| v.to_string()).collect()
    }

    /// Resolve a request against an ascending version list.
    ///
    /// - `Latest` → the highest release, or the highest prerelease when
    ///   nothing else is published
    /// - `Exact` → that version if published
    /// - `Range` → the highest matching version
    /// - `Tag` → the version the dist-tag points to, if published
    pub fn resolve(
        &self,
        request: &VersionRequest,
        sorted_versions: &[String],
        dist_tags: &HashMap<String, String>,
    ) -> Option<String> {
        match request {
            VersionRequest::Latest => sorted_versions
                .iter()
                .rev()
                .find(|v| !self.is_prerelease(v))
                .or_else(|| sorted_versions.last())
                .cloned(),
            VersionRequest::Exact(version) => {
                let wanted = version.to_string();
                sorted_versions.iter().find(|v| **v == wanted).cloned()
            }
            VersionRequest::Range(req) => sorted_versions
                .iter()
                .rev()
                .find(|v| Version::parse(v).map(|v| req.matches(&v)).unwrap_or(false))
                .cloned(),
            VersionRequest::Tag(tag) => dist_tags
                .get(tag)
                .filter(|v| sorted_versions.contains(v))
                .cloned(),
        }
    }
}
