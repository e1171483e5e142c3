//! Registry location, version requests and the per-invocation session
//!
//! A [`PublishSession`] bundles everything one workflow run needs: where the
//! registry is, which scope and package are targeted, which version was requested
//! and the short-lived token. It lives for a single invocation and is never
//! persisted.

use crate::core::error::WorkflowError;
use reqwest::Url;
use secrecy::SecretString;
use semver::{Version, VersionReq};
use std::fmt;

/// Normalised npm registry URL (always ends with `/`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryLocation {
    url: Url,
}

impl RegistryLocation {
    /// Parse a registry URL.
    ///
    /// A scheme-less `host/path` (the form used by Artifact Registry repository
    /// paths, e.g. `us-central1-npm.pkg.dev/project/repo`) is treated as https.
    ///
    /// # Examples
    ///
    /// ```
    /// use artifact_publisher::core::RegistryLocation;
    ///
    /// let location = RegistryLocation::parse("us-central1-npm.pkg.dev/acme/repo").unwrap();
    /// assert_eq!(location.as_str(), "https://us-central1-npm.pkg.dev/acme/repo/");
    /// assert_eq!(location.auth_key(), "//us-central1-npm.pkg.dev/acme/repo/");
    /// ```
    pub fn parse(raw: &str) -> Result<Self, WorkflowError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(WorkflowError::config("registry URL is empty"));
        }

        let with_scheme = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("https://{}", trimmed)
        };

        let mut url = Url::parse(&with_scheme)
            .map_err(|e| WorkflowError::config(format!("invalid registry URL {:?}: {}", raw, e)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(WorkflowError::config(format!(
                "registry URL must use http or https, got {}",
                url.scheme()
            )));
        }
        if url.host_str().is_none() {
            return Err(WorkflowError::config(format!(
                "registry URL has no host: {}",
                raw
            )));
        }

        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        url.set_query(None);
        url.set_fragment(None);

        Ok(Self { url })
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// `//host[:port]/path/` key used by `.npmrc` auth entries
    pub fn auth_key(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port() {
            Some(port) => format!("//{}:{}{}", host, port, self.url.path()),
            None => format!("//{}{}", host, self.url.path()),
        }
    }

    /// Metadata document URL for a package
    pub fn package_url(&self, package_name: &str) -> String {
        format!("{}{}", self.url, encode_package_name(package_name))
    }

    /// Download URL for a tarball following the npm layout
    pub fn tarball_url(&self, package_name: &str, version: &str) -> String {
        format!(
            "{}{}/-/{}",
            self.url,
            package_name,
            tarball_file_name(package_name, version)
        )
    }
}

impl fmt::Display for RegistryLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// Escape the `/` of a scoped name the way npm does (`@scope%2fname`)
pub fn encode_package_name(package_name: &str) -> String {
    package_name.replace('/', "%2f")
}

/// `<basename>-<version>.tgz`, basename being the name without scope
pub fn tarball_file_name(package_name: &str, version: &str) -> String {
    let base = package_name
        .rsplit_once('/')
        .map(|(_, name)| name)
        .unwrap_or(package_name);
    format!("{}-{}.tgz", base, version)
}

/// Scope of a package name (`@scope/name` → `@scope`)
pub fn package_scope(package_name: &str) -> Option<&str> {
    if !package_name.starts_with('@') {
        return None;
    }
    package_name.split_once('/').map(|(scope, _)| scope)
}

/// Which version of a package the caller asked for
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum VersionRequest {
    /// No version given (or "latest")
    #[default]
    Latest,
    /// An exact semantic version
    Exact(Version),
    /// A semver range such as `^1.2`
    Range(VersionReq),
    /// Any other dist-tag, e.g. `beta`
    Tag(String),
}

impl VersionRequest {
    /// Interpret an optional user-supplied version string.
    ///
    /// # Examples
    ///
    /// ```
    /// use artifact_publisher::core::VersionRequest;
    ///
    /// assert_eq!(VersionRequest::parse(None), VersionRequest::Latest);
    /// assert_eq!(VersionRequest::parse(Some("  ")), VersionRequest::Latest);
    /// assert!(matches!(VersionRequest::parse(Some("1.2.3")), VersionRequest::Exact(_)));
    /// assert!(matches!(VersionRequest::parse(Some("^1.2")), VersionRequest::Range(_)));
    /// assert!(matches!(VersionRequest::parse(Some("beta")), VersionRequest::Tag(_)));
    /// ```
    pub fn parse(input: Option<&str>) -> Self {
        let value = match input.map(str::trim) {
            None | Some("") | Some("latest") => return Self::Latest,
            Some(value) => value,
        };

        if let Ok(version) = Version::parse(value) {
            return Self::Exact(version);
        }
        if let Ok(req) = VersionReq::parse(value) {
            return Self::Range(req);
        }
        Self::Tag(value.to_string())
    }
}

impl fmt::Display for VersionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::Exact(version) => write!(f, "{}", version),
            Self::Range(req) => write!(f, "{}", req),
            Self::Tag(tag) => f.write_str(tag),
        }
    }
}

/// State of one workflow invocation
#[derive(Debug)]
pub struct PublishSession {
    pub registry: RegistryLocation,
    pub scope: String,
    pub package_name: String,
    pub version: VersionRequest,
    token: SecretString,
}

impl PublishSession {
    /// Build a session.
    ///
    /// A scoped package must match the configured scope; an unscoped package
    /// takes the configured one.
    pub fn new(
        registry: RegistryLocation,
        scope: Option<&str>,
        package_name: impl Into<String>,
        version: VersionRequest,
        token: SecretString,
    ) -> Result<Self, WorkflowError> {
        let package_name = package_name.into();
        if package_name.trim().is_empty() {
            return Err(WorkflowError::config("package name is required"));
        }

        let own_scope = package_scope(&package_name);
        if let (Some(configured), Some(own)) = (scope, own_scope) {
            if configured != own {
                return Err(WorkflowError::config(format!(
                    "{} belongs to scope {}, but the registry is configured for {}",
                    package_name, own, configured
                )));
            }
        }

        let scope = match own_scope.or(scope) {
            Some(scope) => scope.to_string(),
            None => {
                return Err(WorkflowError::config(format!(
                    "no scope configured and {} is not a scoped package",
                    package_name
                )));
            }
        };

        Ok(Self {
            registry,
            scope,
            package_name,
            version,
            token,
        })
    }

    pub fn token(&self) -> &SecretString {
        &self.token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_parse_keeps_scheme_and_adds_slash() {
        let location = RegistryLocation::parse("http://127.0.0.1:4873/npm").unwrap();
        assert_eq!(location.as_str(), "http://127.0.0.1:4873/npm/");
        assert_eq!(location.auth_key(), "//127.0.0.1:4873/npm/");
    }

    #[test]
    fn test_parse_rejects_other_schemes() {
        assert!(RegistryLocation::parse("ftp://example.com/repo").is_err());
        assert!(RegistryLocation::parse("").is_err());
    }

    #[test]
    fn test_package_and_tarball_urls() {
        let location =
            RegistryLocation::parse("https://us-central1-npm.pkg.dev/acme/repo/").unwrap();

        assert_eq!(
            location.package_url("@observability/react-app"),
            "https://us-central1-npm.pkg.dev/acme/repo/@observability%2freact-app"
        );
        assert_eq!(
            location.tarball_url("@observability/react-app", "0.1.0"),
            "https://us-central1-npm.pkg.dev/acme/repo/@observability/react-app/-/react-app-0.1.0.tgz"
        );
    }

    #[test]
    fn test_package_scope() {
        assert_eq!(package_scope("@observability/react-app"), Some("@observability"));
        assert_eq!(package_scope("react"), None);
    }

    #[test]
    fn test_version_request_display() {
        assert_eq!(VersionRequest::Latest.to_string(), "latest");
        assert_eq!(VersionRequest::parse(Some("0.1.0")).to_string(), "0.1.0");
        assert_eq!(VersionRequest::parse(Some("next")).to_string(), "next");
    }

    #[test]
    fn test_session_derives_scope() {
        let session = PublishSession::new(
            RegistryLocation::parse("https://r.example/npm/").unwrap(),
            None,
            "@observability/react-app",
            VersionRequest::Latest,
            SecretString::new("token-value".into()),
        )
        .unwrap();

        assert_eq!(session.scope, "@observability");
        assert_eq!(session.token().expose_secret(), "token-value");
        assert!(!format!("{:?}", session).contains("token-value"));
    }

    #[test]
    fn test_session_requires_scope_for_unscoped_package() {
        let result = PublishSession::new(
            RegistryLocation::parse("https://r.example/npm/").unwrap(),
            None,
            "react-app",
            VersionRequest::Latest,
            SecretString::new("t".into()),
        );

        assert!(matches!(result, Err(WorkflowError::Config { .. })));
    }

    #[test]
    fn test_session_rejects_foreign_scope() {
        let result = PublishSession::new(
            RegistryLocation::parse("https://r.example/npm/").unwrap(),
            Some("@observability"),
            "@acme/lib",
            VersionRequest::Latest,
            SecretString::new("t".into()),
        );

        let error = result.unwrap_err();
        assert!(matches!(error, WorkflowError::Config { .. }));
        assert!(error.to_string().contains("@acme"));
    }
}
