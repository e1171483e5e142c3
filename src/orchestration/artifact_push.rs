//! Generic artifact push
//!
//! Compresses a directory into a timestamped `.tar.gz` and uploads it to an
//! Artifact Registry generic repository with `gcloud artifacts generic upload`.

use crate::core::error::WorkflowError;
use crate::core::traits::ArtifactPushResult;
use crate::registry::archive::compress_directory;
use crate::security::{SafeCommandExecutor, SecureTokenManager};
use chrono::{DateTime, Local};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

const GCLOUD: &str = "gcloud";

/// `<location>-<format>.pkg.dev/<project>/<repository>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRepository {
    pub host: String,
    pub location: String,
    pub project: String,
    pub repository: String,
}

impl ArtifactRepository {
    /// Parse a repository path.
    ///
    /// # Examples
    ///
    /// ```
    /// use artifact_publisher::orchestration::ArtifactRepository;
    ///
    /// let repo = ArtifactRepository::parse("us-central1-docker.pkg.dev/acme/builds").unwrap();
    /// assert_eq!(repo.location, "us-central1");
    /// assert_eq!(repo.project, "acme");
    /// assert_eq!(repo.repository, "builds");
    /// ```
    pub fn parse(path: &str) -> Result<Self, WorkflowError> {
        let trimmed = path
            .trim()
            .trim_start_matches("https://")
            .trim_end_matches('/');
        let parts: Vec<&str> = trimmed.split('/').collect();

        if parts.len() < 3 || parts.iter().take(3).any(|p| p.is_empty()) {
            return Err(WorkflowError::config(format!(
                "invalid repository path {:?}; expected <location>-docker.pkg.dev/<project>/<repository>",
                path
            )));
        }

        let host = parts[0];
        let location = host
            .strip_suffix(".pkg.dev")
            .and_then(|prefix| prefix.rsplit_once('-'))
            .map(|(location, _format)| location)
            .filter(|location| !location.is_empty())
            .ok_or_else(|| {
                WorkflowError::config(format!(
                    "cannot derive a location from repository host {:?}",
                    host
                ))
            })?;

        Ok(Self {
            host: host.to_string(),
            location: location.to_string(),
            project: parts[1].to_string(),
            repository: parts[2].to_string(),
        })
    }
}

impl fmt::Display for ArtifactRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.host, self.project, self.repository)
    }
}

/// A compressed artifact ready for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericArtifact {
    /// Package name in the repository
    pub package: String,
    /// `<package>_<YYYYMMDD_HHMMSS>.tar.gz`
    pub file_name: String,
    pub path: PathBuf,
    /// `<YYYYMMDD.HHMMSS>`
    pub version: String,
}

/// File name and version for an artifact created at `now`
pub fn artifact_naming(package: &str, now: &DateTime<Local>) -> (String, String) {
    (
        format!("{}_{}.tar.gz", package, now.format("%Y%m%d_%H%M%S")),
        now.format("%Y%m%d.%H%M%S").to_string(),
    )
}

/// Compresses and uploads generic artifacts
#[derive(Debug, Clone)]
pub struct ArtifactPusher {
    repository: ArtifactRepository,
    timeout: Duration,
}

impl ArtifactPusher {
    pub fn new(repository: ArtifactRepository, timeout: Duration) -> Self {
        Self {
            repository,
            timeout,
        }
    }

    pub fn repository(&self) -> &ArtifactRepository {
        &self.repository
    }

    /// Compress `source_dir` into `output_dir`
    pub fn package(
        &self,
        source_dir: &Path,
        output_dir: &Path,
        package: &str,
        now: &DateTime<Local>,
    ) -> Result<GenericArtifact, WorkflowError> {
        if package.trim().is_empty() || package.contains(['/', '\\']) {
            return Err(WorkflowError::config(format!(
                "invalid artifact name {:?}",
                package
            )));
        }
        if !source_dir.is_dir() {
            return Err(WorkflowError::io(
                source_dir,
                std::io::Error::new(std::io::ErrorKind::NotFound, "source directory not found"),
            ));
        }

        let (file_name, version) = artifact_naming(package, now);
        let path = output_dir.join(&file_name);
        let size = compress_directory(source_dir, &path)?;
        info!(path = %path.display(), size, "created artifact");

        Ok(GenericArtifact {
            package: package.to_string(),
            file_name,
            path,
            version,
        })
    }

    /// `gcloud` arguments for uploading `artifact`
    pub fn upload_args(&self, artifact: &GenericArtifact) -> Vec<String> {
        vec![
            "artifacts".to_string(),
            "generic".to_string(),
            "upload".to_string(),
            format!("--location={}", self.repository.location),
            format!("--repository={}", self.repository.repository),
            format!("--project={}", self.repository.project),
            format!("--package={}", artifact.package),
            format!("--version={}", artifact.version),
            format!("--source={}", artifact.path.display()),
        ]
    }

    /// Upload a packaged artifact
    pub async fn upload(
        &self,
        artifact: &GenericArtifact,
        working_dir: &Path,
        masker: &SecureTokenManager,
    ) -> Result<ArtifactPushResult, WorkflowError> {
        let mut executor =
            SafeCommandExecutor::new(working_dir).map_err(|e| e.into_workflow_error(GCLOUD))?;
        executor.set_timeout(self.timeout);

        let args = self.upload_args(artifact);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = executor
            .execute(GCLOUD, &arg_refs)
            .await
            .map_err(|e| e.into_workflow_error(GCLOUD))?;

        if !output.success() {
            return Err(WorkflowError::RegistryRequest {
                registry: self.repository.to_string(),
                status: None,
                message: masker.mask_tokens_in_string(output.stderr.trim()),
            });
        }

        info!(repository = %self.repository, version = %artifact.version, "uploaded artifact");
        Ok(ArtifactPushResult {
            artifact_name: artifact.file_name.clone(),
            artifact_path: artifact.path.clone(),
            repository: self.repository.to_string(),
            package: artifact.package.clone(),
            version: artifact.version.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn fixed_now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn test_parse_repository() {
        let repo = ArtifactRepository::parse("https://europe-west1-docker.pkg.dev/acme/builds/").unwrap();
        assert_eq!(repo.location, "europe-west1");
        assert_eq!(repo.to_string(), "europe-west1-docker.pkg.dev/acme/builds");
    }

    #[test]
    fn test_parse_repository_too_short() {
        let error = ArtifactRepository::parse("us-central1-docker.pkg.dev/acme").unwrap_err();
        assert!(matches!(error, WorkflowError::Config { .. }));
    }

    #[test]
    fn test_parse_repository_foreign_host() {
        assert!(ArtifactRepository::parse("example.com/acme/builds").is_err());
    }

    #[test]
    fn test_artifact_naming() {
        let (file_name, version) = artifact_naming("dashboard", &fixed_now());
        assert_eq!(file_name, "dashboard_20240309_140507.tar.gz");
        assert_eq!(version, "20240309.140507");
    }

    #[test]
    fn test_package_and_upload_args() {
        let source = TempDir::new().unwrap();
        std::fs::create_dir_all(source.path().join("build")).unwrap();
        std::fs::write(source.path().join("build/index.html"), "<html></html>").unwrap();
        let output = TempDir::new().unwrap();

        let pusher = ArtifactPusher::new(
            ArtifactRepository::parse("us-central1-docker.pkg.dev/acme/builds").unwrap(),
            Duration::from_secs(30),
        );
        let artifact = pusher
            .package(
                &source.path().join("build"),
                &output.path().join("artifacts"),
                "dashboard",
                &fixed_now(),
            )
            .unwrap();

        assert!(artifact.path.exists());
        assert_eq!(artifact.file_name, "dashboard_20240309_140507.tar.gz");

        let args = pusher.upload_args(&artifact);
        assert_eq!(&args[..3], &["artifacts", "generic", "upload"]);
        assert!(args.contains(&"--location=us-central1".to_string()));
        assert!(args.contains(&"--repository=builds".to_string()));
        assert!(args.contains(&"--project=acme".to_string()));
        assert!(args.contains(&"--version=20240309.140507".to_string()));
    }

    #[test]
    fn test_package_rejects_bad_input() {
        let output = TempDir::new().unwrap();
        let pusher = ArtifactPusher::new(
            ArtifactRepository::parse("us-central1-docker.pkg.dev/acme/builds").unwrap(),
            Duration::from_secs(30),
        );

        assert!(
            pusher
                .package(output.path(), output.path(), "a/b", &fixed_now())
                .is_err()
        );
        assert!(matches!(
            pusher.package(&output.path().join("missing"), output.path(), "dashboard", &fixed_now()),
            Err(WorkflowError::Io { .. })
        ));
    }
}
