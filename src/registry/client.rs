//! Package client for npm-compatible registries
//!
//! Talks the npm registry protocol directly over HTTP. The bearer token is
//! taken from the [`PublishSession`] on every call and only sent to the
//! registry's own origin.

use crate::core::error::WorkflowError;
use crate::core::session::PublishSession;
use crate::core::traits::{FetchResult, VersionList};
use crate::registry::archive::{PackedArchive, extract_archive, verify_integrity};
use crate::registry::packument::{Dist, Packument, publish_document};
use crate::validation::{PackageManifest, VersionValidator};
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use secrecy::ExposeSecret;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

const USER_AGENT: &str = concat!("artifact-publisher/", env!("CARGO_PKG_VERSION"));

/// A version picked by [`NpmRegistryClient::resolve`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersion {
    pub version: String,
    pub dist: Dist,
}

/// HTTP client for one registry workflow
#[derive(Debug, Clone)]
pub struct NpmRegistryClient {
    http: reqwest::Client,
    versions: VersionValidator,
}

impl NpmRegistryClient {
    pub fn new(timeout: Duration) -> Result<Self, WorkflowError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| WorkflowError::config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            versions: VersionValidator::new(),
        })
    }

    /// Fetch the package document; `None` when the registry does not know it
    pub async fn packument(
        &self,
        session: &PublishSession,
    ) -> Result<Option<Packument>, WorkflowError> {
        let url = session.registry.package_url(&session.package_name);
        debug!(%url, "fetching package metadata");

        let request = self
            .authorize(self.http.get(&url), &url, session)
            .header("Accept", "application/json");
        let response = self.send(request, session).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response, session).await?;

        response
            .json::<Packument>()
            .await
            .map(Some)
            .map_err(|e| WorkflowError::RegistryRequest {
                registry: session.registry.to_string(),
                status: None,
                message: format!("invalid package metadata: {}", e),
            })
    }

    /// All published versions, ascending by semantic version
    pub async fn list_versions(&self, session: &PublishSession) -> Result<VersionList, WorkflowError> {
        let packument = self.require_packument(session).await?;
        let versions = self.versions.sort_versions(packument.versions.keys());

        if versions.is_empty() {
            return Err(WorkflowError::PackageNotFound {
                registry: session.registry.to_string(),
                package: session.package_name.clone(),
            });
        }

        Ok(VersionList {
            package_name: session.package_name.clone(),
            versions,
            latest_tag: packument.dist_tags.get("latest").cloned(),
        })
    }

    /// Resolve the session's version request to a concrete version
    pub async fn resolve(&self, session: &PublishSession) -> Result<ResolvedVersion, WorkflowError> {
        let packument = self.require_packument(session).await?;
        let sorted = self.versions.sort_versions(packument.versions.keys());

        let not_found = || WorkflowError::VersionNotFound {
            registry: session.registry.to_string(),
            package: session.package_name.clone(),
            version: session.version.to_string(),
        };

        let version = self
            .versions
            .resolve(&session.version, &sorted, &packument.dist_tags)
            .ok_or_else(not_found)?;

        let dist = packument
            .versions
            .get(&version)
            .and_then(|doc| doc.dist.clone())
            .unwrap_or_else(|| Dist {
                tarball: session
                    .registry
                    .tarball_url(&session.package_name, &version),
                integrity: None,
                shasum: None,
            });

        debug!(request = %session.version, %version, "resolved version");
        Ok(ResolvedVersion { version, dist })
    }

    /// Download a tarball
    pub async fn download(
        &self,
        session: &PublishSession,
        dist: &Dist,
    ) -> Result<Vec<u8>, WorkflowError> {
        debug!(url = %dist.tarball, "downloading tarball");
        let request = self.authorize(self.http.get(&dist.tarball), &dist.tarball, session);
        let response = self.send(request, session).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(WorkflowError::extraction(format!(
                "archive {} does not exist",
                dist.tarball
            )));
        }
        let response = check_status(response, session).await?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| request_error(session, e))?;
        Ok(bytes.to_vec())
    }

    /// Resolve, download, verify and extract a package into `output_dir`
    pub async fn fetch_archive(
        &self,
        session: &PublishSession,
        output_dir: &Path,
    ) -> Result<FetchResult, WorkflowError> {
        let resolved = self.resolve(session).await?;
        let bytes = self.download(session, &resolved.dist).await?;

        match resolved.dist.integrity.as_deref() {
            Some(expected) => match verify_integrity(&bytes, expected) {
                Some(true) => debug!("integrity verified"),
                Some(false) => {
                    return Err(WorkflowError::IntegrityMismatch {
                        package: format!("{}@{}", session.package_name, resolved.version),
                        expected: expected.to_string(),
                    });
                }
                None => warn!(integrity = expected, "no sha512 integrity to verify against"),
            },
            None => warn!("registry did not provide an integrity value"),
        }

        let files = extract_archive(&bytes, output_dir)?;
        info!(
            package = %session.package_name,
            version = %resolved.version,
            files = files.len(),
            "extracted package"
        );

        Ok(FetchResult {
            package_name: session.package_name.clone(),
            version: resolved.version,
            output_dir: output_dir.to_path_buf(),
            files,
        })
    }

    /// Upload a packed package.
    ///
    /// Fails with [`WorkflowError::VersionConflict`] when the version already
    /// exists, without sending the upload.
    pub async fn publish(
        &self,
        session: &PublishSession,
        manifest: &PackageManifest,
        archive: &PackedArchive,
        tag: &str,
    ) -> Result<(), WorkflowError> {
        let conflict = || WorkflowError::VersionConflict {
            registry: session.registry.to_string(),
            package: manifest.name.clone(),
            version: manifest.version.clone(),
        };

        let existing = self.packument(session).await?;
        if existing.is_some_and(|packument| packument.has_version(&manifest.version)) {
            return Err(conflict());
        }

        let document = publish_document(&session.registry, manifest, archive, tag)?;
        let url = session.registry.package_url(&manifest.name);
        info!(%url, version = %manifest.version, tag, "publishing package");

        let request = self
            .authorize(self.http.put(&url), &url, session)
            .json(&document);
        let response = self.send(request, session).await?;

        let status = response.status();
        if status == StatusCode::CONFLICT {
            return Err(conflict());
        }
        if status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            if body.contains("previously published") || body.contains("cannot publish over") {
                return Err(conflict());
            }
            return Err(WorkflowError::Unauthorized {
                registry: session.registry.to_string(),
                status: status.as_u16(),
            });
        }

        check_status(response, session).await.map(|_| ())
    }

    async fn require_packument(&self, session: &PublishSession) -> Result<Packument, WorkflowError> {
        self.packument(session)
            .await?
            .ok_or_else(|| WorkflowError::PackageNotFound {
                registry: session.registry.to_string(),
                package: session.package_name.clone(),
            })
    }

    /// Attach the bearer token when `url` is on the registry's origin
    fn authorize(
        &self,
        request: RequestBuilder,
        url: &str,
        session: &PublishSession,
    ) -> RequestBuilder {
        let same_origin = Url::parse(url)
            .map(|target| target.origin() == session.registry.url().origin())
            .unwrap_or(false);

        if same_origin {
            request.bearer_auth(session.token().expose_secret())
        } else {
            debug!(url, "not sending credentials to foreign host");
            request
        }
    }

    async fn send(
        &self,
        request: RequestBuilder,
        session: &PublishSession,
    ) -> Result<Response, WorkflowError> {
        request.send().await.map_err(|e| request_error(session, e))
    }
}

fn request_error(session: &PublishSession, error: reqwest::Error) -> WorkflowError {
    let message = if error.is_timeout() {
        "request timed out".to_string()
    } else if error.is_connect() {
        format!("cannot connect: {}", error)
    } else {
        error.to_string()
    };

    WorkflowError::RegistryRequest {
        registry: session.registry.to_string(),
        status: error.status().map(|s| s.as_u16()),
        message,
    }
}

/// Map non-success responses to registry errors
async fn check_status(
    response: Response,
    session: &PublishSession,
) -> Result<Response, WorkflowError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let registry = session.registry.to_string();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(WorkflowError::Unauthorized {
            registry,
            status: status.as_u16(),
        }),
        StatusCode::NOT_FOUND => Err(WorkflowError::PackageNotFound {
            registry,
            package: session.package_name.clone(),
        }),
        _ => {
            let body = response.text().await.unwrap_or_default();
            Err(WorkflowError::RegistryRequest {
                registry,
                status: Some(status.as_u16()),
                message: error_summary(status, &body),
            })
        }
    }
}

/// `{"error": "..."}` bodies are common; fall back to the start of the body
fn error_summary(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().chars().take(200).collect());

    if detail.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, detail)
    }
}
