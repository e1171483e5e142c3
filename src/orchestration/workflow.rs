//! Registry workflow - orchestrates one authenticated registry operation
//!
//! Every operation runs the same linear pipeline and stops at the first error:
//!
//! 1. obtain a short-lived token from the injected [`CredentialProvider`]
//! 2. write the project's `.npmrc` (where npm or the project needs it)
//! 3. run the package operation against the registry
//!
//! The caller hands the returned `Result` to the
//! [`Reporter`](crate::orchestration::Reporter) to get an exit code.

use crate::core::config::{CredentialSource, WorkflowConfig};
use crate::core::error::WorkflowError;
use crate::core::session::{PublishSession, RegistryLocation, VersionRequest};
use crate::core::traits::{
    ArtifactPushResult, ConfigureResult, CredentialProvider, FetchResult, InstallResult,
    PublishResult, VersionList,
};
use crate::orchestration::artifact_push::{ArtifactPusher, ArtifactRepository};
use crate::orchestration::installer::NpmInstaller;
use crate::registry::archive::pack_directory;
use crate::registry::client::NpmRegistryClient;
use crate::registry::npmrc::NpmrcWriter;
use crate::security::{EnvCredentialProvider, GcloudCredentialProvider, SecureTokenManager};
use crate::validation::{ManifestValidator, PackageManifest};
use semver::Version;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Publishing options passed from the CLI
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    /// Pack and report without uploading
    pub dry_run: bool,

    /// Replace the manifest version with `0.1.<unix timestamp>`
    pub auto_version: bool,

    /// Publish under a different package name
    pub name_override: Option<String>,

    /// dist-tag to point at the new version (config default otherwise)
    pub tag: Option<String>,
}

/// Version used by `auto_version`
pub fn timestamp_version(unix_seconds: i64) -> String {
    format!("0.1.{}", unix_seconds)
}

/// Credential provider selected by the configuration
pub fn credential_provider_for(config: &WorkflowConfig) -> Box<dyn CredentialProvider> {
    match config.credential_source() {
        CredentialSource::Gcloud => Box::new(GcloudCredentialProvider::new(config.timeout())),
        CredentialSource::Env => Box::new(EnvCredentialProvider::new(config.credential_env_var())),
    }
}

/// Orchestrator for registry operations
pub struct Workflow {
    project_path: PathBuf,
    config: WorkflowConfig,
    credentials: Box<dyn CredentialProvider>,
    token_manager: SecureTokenManager,
    show_progress: bool,
}

impl Workflow {
    /// Create a workflow for the project at `project_path`
    pub fn new<P: AsRef<Path>>(
        project_path: P,
        config: WorkflowConfig,
        credentials: Box<dyn CredentialProvider>,
    ) -> Self {
        Self {
            project_path: project_path.as_ref().to_path_buf(),
            config,
            credentials,
            token_manager: SecureTokenManager::new(),
            show_progress: false,
        }
    }

    /// Workflow whose credential provider comes from the configuration
    pub fn from_config<P: AsRef<Path>>(project_path: P, config: WorkflowConfig) -> Self {
        let credentials = credential_provider_for(&config);
        Self::new(project_path, config, credentials)
    }

    /// Print progress lines while running
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    /// Tokens obtained so far, for masking output
    pub fn token_manager(&self) -> &SecureTokenManager {
        &self.token_manager
    }

    /// List published versions, ascending by semantic version
    pub async fn list_versions(&mut self, package_name: &str) -> Result<VersionList, WorkflowError> {
        let session = self.start_session(package_name, VersionRequest::Latest).await?;

        self.step(&format!("🔍 Listing versions of {}...", package_name));
        self.client()?.list_versions(&session).await
    }

    /// Install a package into the project.
    ///
    /// Without a version the highest published semantic version is installed.
    pub async fn install(
        &mut self,
        package_name: &str,
        version: VersionRequest,
    ) -> Result<InstallResult, WorkflowError> {
        let installer = NpmInstaller::new(&self.project_path, self.config.timeout())?;
        let session = self.start_session(package_name, version).await?;
        self.write_npmrc(&session, &self.project_path).await?;

        let client = self.client()?;
        let resolved = client.resolve(&session).await?;
        self.step(&format!(
            "📥 Installing {}@{} (requested: {})...",
            package_name, resolved.version, session.version
        ));

        let output = installer
            .install(
                &session,
                &resolved.version,
                self.config.token_env(),
                &self.token_manager,
            )
            .await?;

        Ok(InstallResult {
            package_name: session.package_name.clone(),
            version: resolved.version,
            project_dir: self.project_path.clone(),
            output: output.combined(),
        })
    }

    /// Download a package archive and extract it.
    ///
    /// `output_dir` defaults to the configured fetch directory, relative to the
    /// project.
    pub async fn fetch_archive(
        &mut self,
        package_name: &str,
        version: VersionRequest,
        output_dir: Option<&Path>,
    ) -> Result<FetchResult, WorkflowError> {
        let output_dir = match output_dir {
            Some(dir) => dir.to_path_buf(),
            None => self.project_path.join(self.config.fetch_output_dir()),
        };

        let session = self.start_session(package_name, version).await?;
        self.step(&format!(
            "📦 Fetching {}@{} into {}...",
            package_name,
            session.version,
            output_dir.display()
        ));

        self.client()?.fetch_archive(&session, &output_dir).await
    }

    /// Pack a package directory and publish it
    pub async fn publish(
        &mut self,
        package_dir: Option<&Path>,
        options: PublishOptions,
    ) -> Result<PublishResult, WorkflowError> {
        let package_dir = package_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.project_path.clone());

        self.step("🔍 Validating package...");
        let manifest = self.prepare_manifest(&package_dir, &options).await?;

        let version = Version::parse(&manifest.version).map_err(|e| WorkflowError::InvalidManifest {
            message: format!("invalid version {}: {}", manifest.version, e),
        })?;
        let session = self
            .start_session(&manifest.name, VersionRequest::Exact(version))
            .await?;
        self.write_npmrc(&session, &package_dir).await?;

        self.step("📦 Packing...");
        let archive = pack_directory(&package_dir, &manifest)?;
        let tag = options
            .tag
            .clone()
            .unwrap_or_else(|| self.config.dist_tag().to_string());

        let result = PublishResult {
            package_name: manifest.name.clone(),
            version: manifest.version.clone(),
            registry_url: session.registry.to_string(),
            tag: tag.clone(),
            integrity: archive.integrity.clone(),
            tarball_size: archive.bytes.len(),
            files: archive.files.clone(),
            dry_run: options.dry_run,
        };

        if options.dry_run {
            info!(package = %manifest.name, version = %manifest.version, "dry run, skipping upload");
            return Ok(result);
        }

        self.step(&format!("📤 Publishing {}@{}...", manifest.name, manifest.version));
        self.client()?
            .publish(&session, &manifest, &archive, &tag)
            .await?;

        Ok(result)
    }

    /// Only write `.npmrc`
    pub async fn configure(&mut self) -> Result<ConfigureResult, WorkflowError> {
        let registry = self.registry()?;
        let scope = self
            .config
            .scope()
            .ok_or_else(|| WorkflowError::config("a scope is required to write .npmrc"))?
            .to_string();

        let outcome = NpmrcWriter::new(&self.project_path)
            .write(&registry, &scope, self.config.token_env())
            .await?;

        Ok(ConfigureResult {
            npmrc_path: outcome.path,
            registry_url: registry.to_string(),
            scope,
            replaced_existing: outcome.previous.is_some() && outcome.changed,
            changed: outcome.changed,
        })
    }

    /// Compress a directory and upload it to a generic repository
    pub async fn push_artifact(
        &mut self,
        source_dir: &Path,
        artifact_name: &str,
        repository: Option<&str>,
    ) -> Result<ArtifactPushResult, WorkflowError> {
        let repository = repository
            .or(self.config.artifact_repository())
            .ok_or_else(|| WorkflowError::config("an artifact repository path is required"))?;
        let pusher = ArtifactPusher::new(ArtifactRepository::parse(repository)?, self.config.timeout());

        self.obtain_token().await?;

        self.step(&format!("🗜️  Compressing {}...", source_dir.display()));
        let output_dir = self.project_path.join(self.config.artifact_output_dir());
        let artifact = pusher.package(source_dir, &output_dir, artifact_name, &chrono::Local::now())?;

        self.step(&format!("📤 Pushing {} to {}...", artifact.file_name, pusher.repository()));
        pusher
            .upload(&artifact, &self.project_path, &self.token_manager)
            .await
    }

    fn registry(&self) -> Result<RegistryLocation, WorkflowError> {
        let url = self
            .config
            .registry_url()
            .ok_or_else(|| WorkflowError::config("registry URL is not configured"))?;
        RegistryLocation::parse(url)
    }

    fn client(&self) -> Result<NpmRegistryClient, WorkflowError> {
        NpmRegistryClient::new(self.config.timeout())
    }

    async fn obtain_token(&mut self) -> Result<secrecy::SecretString, WorkflowError> {
        self.step(&format!(
            "🔑 Obtaining access token ({})...",
            self.credentials.name()
        ));
        let token = self.credentials.token().await?;
        self.token_manager.register(&token);
        Ok(token)
    }

    /// Credential Provisioner stage; nothing reaches the registry before it succeeds
    async fn start_session(
        &mut self,
        package_name: &str,
        version: VersionRequest,
    ) -> Result<PublishSession, WorkflowError> {
        let registry = self.registry()?;
        let token = self.obtain_token().await?;

        let session = PublishSession::new(
            registry,
            self.config.scope(),
            package_name,
            version,
            token,
        )?;
        debug!(registry = %session.registry, scope = %session.scope, "session started");
        Ok(session)
    }

    async fn write_npmrc(&self, session: &PublishSession, dir: &Path) -> Result<(), WorkflowError> {
        let outcome = NpmrcWriter::new(dir)
            .write(&session.registry, &session.scope, self.config.token_env())
            .await?;
        if outcome.previous.is_some() && outcome.changed {
            self.step(&format!("⚠️  Replaced existing {}", outcome.path.display()));
        }
        Ok(())
    }

    async fn prepare_manifest(
        &self,
        package_dir: &Path,
        options: &PublishOptions,
    ) -> Result<PackageManifest, WorkflowError> {
        let validator = ManifestValidator::new();
        let mut manifest = validator.load(package_dir).await?;

        if let Some(name) = &options.name_override {
            self.step(&format!("  Renaming {} to {}", manifest.name, name));
            manifest.name = name.clone();
        }
        if options.auto_version {
            let version = timestamp_version(chrono::Utc::now().timestamp());
            self.step(&format!("  Version {} -> {}", manifest.version, version));
            manifest.version = version;
        }

        let result = validator.require_valid(&manifest)?;
        for warning in &result.warnings {
            self.step(&format!("  ⚠️  {}", warning));
        }
        Ok(manifest)
    }

    fn step(&self, message: &str) {
        if self.show_progress {
            println!("{}", message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{CredentialConfig, RegistryConfig};
    use crate::core::error::ErrorCategory;
    use crate::orchestration::reporter::{OutputFormat, Reporter};
    use crate::security::StaticCredentialProvider;
    use async_trait::async_trait;
    use httpmock::prelude::*;
    use secrecy::SecretString;
    use serde_json::json;
    use tempfile::TempDir;

    struct NoSession;

    #[async_trait]
    impl CredentialProvider for NoSession {
        fn name(&self) -> &str {
            "gcloud"
        }

        async fn token(&self) -> Result<SecretString, WorkflowError> {
            Err(WorkflowError::NotAuthenticated {
                provider: "gcloud".to_string(),
                message: "no active account".to_string(),
            })
        }
    }

    fn write_package(dir: &Path, version: &str) {
        std::fs::write(
            dir.join("package.json"),
            format!(
                r#"{{"name": "react-app", "version": "{}", "license": "MIT", "files": ["dist"]}}"#,
                version
            ),
        )
        .unwrap();
        std::fs::create_dir_all(dir.join("dist")).unwrap();
        std::fs::write(dir.join("dist/index.js"), "export const answer = 42;").unwrap();
        std::fs::write(dir.join("README.md"), "# react-app").unwrap();
        std::fs::write(dir.join("scratch.txt"), "local notes").unwrap();
    }

    fn config(url: &str) -> WorkflowConfig {
        WorkflowConfig {
            registry: Some(RegistryConfig {
                url: Some(url.to_string()),
                scope: Some("@observability".to_string()),
            }),
            ..Default::default()
        }
    }

    fn workflow(dir: &Path, url: &str) -> Workflow {
        Workflow::new(
            dir,
            config(url),
            Box::new(StaticCredentialProvider::new(SecretString::new(
                "ya29.workflow-token".into(),
            ))),
        )
    }

    #[test]
    fn test_timestamp_version() {
        assert_eq!(timestamp_version(1_700_000_000), "0.1.1700000000");
    }

    #[test]
    fn test_credential_provider_for_config() {
        let mut cfg = config("https://r.example/npm/");
        assert_eq!(credential_provider_for(&cfg).name(), "gcloud");

        cfg.credentials = Some(CredentialConfig {
            provider: Some(CredentialSource::Env),
            env_var: Some("CI_NPM_TOKEN".to_string()),
        });
        assert_eq!(credential_provider_for(&cfg).name(), "env");
    }

    #[tokio::test]
    async fn test_configure_writes_npmrc() {
        let temp_dir = TempDir::new().unwrap();
        let mut wf = workflow(temp_dir.path(), "us-central1-npm.pkg.dev/acme/npm-repo");

        let result = wf.configure().await.unwrap();
        assert!(result.changed);
        assert!(!result.replaced_existing);

        let content = std::fs::read_to_string(temp_dir.path().join(".npmrc")).unwrap();
        assert_eq!(
            content,
            "@observability:registry=https://us-central1-npm.pkg.dev/acme/npm-repo/\n\
             //us-central1-npm.pkg.dev/acme/npm-repo/:_authToken=${NPM_TOKEN}\n"
        );
        assert!(!content.contains("ya29"));
    }

    #[tokio::test]
    async fn test_missing_registry_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let mut wf = Workflow::new(
            temp_dir.path(),
            WorkflowConfig::default(),
            Box::new(StaticCredentialProvider::new(SecretString::new("t".into()))),
        );

        let error = wf.list_versions("@observability/react-app").await.unwrap_err();
        assert_eq!(error.category(), ErrorCategory::Config);
        assert!(wf.token_manager().is_empty());
    }

    #[tokio::test]
    async fn test_install_without_package_json_is_dependency_error() {
        let temp_dir = TempDir::new().unwrap();
        let mut wf = workflow(temp_dir.path(), "https://r.example/npm/");

        let error = wf
            .install("@observability/react-app", VersionRequest::Latest)
            .await
            .unwrap_err();
        assert_eq!(error.category(), ErrorCategory::Dependency);
    }

    #[tokio::test]
    async fn test_install_from_other_scope_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("package.json"), "{}").unwrap();
        let mut wf = workflow(temp_dir.path(), "https://r.example/npm/");

        let error = wf
            .install("@acme/lib", VersionRequest::Latest)
            .await
            .unwrap_err();

        assert_eq!(error.category(), ErrorCategory::Config);
        assert!(!temp_dir.path().join(".npmrc").exists());
    }

    #[tokio::test]
    async fn test_publish_dry_run_applies_overrides() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join("package.json"),
            r#"{"name": "@observability/react-app", "version": "0.1.0", "license": "MIT"}"#,
        )
        .unwrap();
        std::fs::write(temp_dir.path().join("index.js"), "module.exports = {}").unwrap();

        let mut wf = workflow(temp_dir.path(), "https://r.example/npm/");
        let result = wf
            .publish(
                None,
                PublishOptions {
                    dry_run: true,
                    auto_version: true,
                    name_override: Some("@observability/react-app-preview".to_string()),
                    tag: Some("next".to_string()),
                },
            )
            .await
            .unwrap();

        assert!(result.dry_run);
        assert_eq!(result.package_name, "@observability/react-app-preview");
        assert!(result.version.starts_with("0.1."));
        assert_eq!(result.tag, "next");
        assert_eq!(result.files, vec!["index.js", "package.json"]);

        // The manifest on disk is untouched
        let on_disk = std::fs::read_to_string(temp_dir.path().join("package.json")).unwrap();
        assert!(on_disk.contains("\"0.1.0\""));
        assert!(temp_dir.path().join(".npmrc").exists());
    }

    #[tokio::test]
    async fn test_publish_invalid_manifest() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join("package.json"),
            r#"{"name": "Bad Name", "version": "1.0"}"#,
        )
        .unwrap();

        let mut wf = workflow(temp_dir.path(), "https://r.example/npm/");
        let error = wf
            .publish(None, PublishOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(error, WorkflowError::InvalidManifest { .. }));
        assert!(wf.token_manager().is_empty());
    }

    #[tokio::test]
    async fn test_push_artifact_requires_repository() {
        let temp_dir = TempDir::new().unwrap();
        let mut wf = workflow(temp_dir.path(), "https://r.example/npm/");

        let error = wf
            .push_artifact(temp_dir.path(), "dashboard", None)
            .await
            .unwrap_err();
        assert_eq!(error.category(), ErrorCategory::Config);

        let error = wf
            .push_artifact(temp_dir.path(), "dashboard", Some("us-central1-docker.pkg.dev/acme"))
            .await
            .unwrap_err();
        assert!(matches!(error, WorkflowError::Config { .. }));
    }

    #[tokio::test]
    async fn test_auth_failure_never_reaches_registry() {
        let server = MockServer::start_async().await;
        let metadata = server
            .mock_async(|when, then| {
                when.method(GET).path("/npm/react-app");
                then.status(200).json_body(json!({"name": "react-app", "versions": {}}));
            })
            .await;
        let upload = server
            .mock_async(|when, then| {
                when.method(PUT).path("/npm/react-app");
                then.status(201);
            })
            .await;

        let temp_dir = TempDir::new().unwrap();
        write_package(temp_dir.path(), "0.1.0");
        let mut wf = Workflow::new(temp_dir.path(), config(&server.url("/npm/")), Box::new(NoSession));

        let error = wf.list_versions("react-app").await.unwrap_err();
        assert_eq!(error.category(), ErrorCategory::Auth);

        let error = wf
            .publish(None, PublishOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(error, WorkflowError::NotAuthenticated { .. }));

        metadata.assert_calls_async(0).await;
        upload.assert_calls_async(0).await;
        assert!(!temp_dir.path().join(".npmrc").exists());
    }

    #[tokio::test]
    async fn test_list_versions_through_workflow() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/npm/react-app")
                    .header("authorization", "Bearer ya29.workflow-token");
                then.status(200).json_body(json!({
                    "name": "react-app",
                    "dist-tags": {"latest": "1.2.0"},
                    "versions": {
                        "1.2.0": {"version": "1.2.0"},
                        "1.10.0-beta.1": {"version": "1.10.0-beta.1"},
                        "0.3.0": {"version": "0.3.0"}
                    }
                }));
            })
            .await;

        let temp_dir = TempDir::new().unwrap();
        let mut wf = workflow(temp_dir.path(), &server.url("/npm/"));
        let list = wf.list_versions("react-app").await.unwrap();

        assert_eq!(list.versions, vec!["0.3.0", "1.2.0", "1.10.0-beta.1"]);
        assert!(!wf.token_manager().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_matches_published_files() {
        let package_dir = TempDir::new().unwrap();
        write_package(package_dir.path(), "0.1.0");
        let manifest = ManifestValidator::new().load(package_dir.path()).await.unwrap();
        let archive = pack_directory(package_dir.path(), &manifest).unwrap();

        let server = MockServer::start_async().await;
        let tarball_url = server.url("/npm/react-app/-/react-app-0.1.0.tgz");
        server
            .mock_async(|when, then| {
                when.method(GET).path("/npm/react-app");
                then.status(200).json_body(json!({
                    "name": "react-app",
                    "dist-tags": {"latest": "0.1.0"},
                    "versions": {
                        "0.1.0": {"version": "0.1.0", "dist": {
                            "tarball": tarball_url,
                            "integrity": archive.integrity
                        }}
                    }
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/npm/react-app/-/react-app-0.1.0.tgz");
                then.status(200).body(archive.bytes.clone());
            })
            .await;

        let project_dir = TempDir::new().unwrap();
        let mut wf = workflow(project_dir.path(), &server.url("/npm/"));
        let result = wf
            .fetch_archive("react-app", VersionRequest::Latest, None)
            .await
            .unwrap();

        let fetched = project_dir.path().join("fetched-package");
        assert_eq!(result.output_dir, fetched);
        assert_eq!(result.files, vec!["README.md", "dist/index.js", "package.json"]);
        assert_eq!(
            std::fs::read_to_string(fetched.join("dist/index.js")).unwrap(),
            "export const answer = 42;"
        );
        assert!(!fetched.join("scratch.txt").exists());
    }

    #[tokio::test]
    async fn test_publish_existing_version_is_conflict() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/npm/react-app");
                then.status(200).json_body(json!({
                    "name": "react-app",
                    "versions": {"0.1.0": {"version": "0.1.0"}}
                }));
            })
            .await;
        let upload = server
            .mock_async(|when, then| {
                when.method(PUT).path("/npm/react-app");
                then.status(201);
            })
            .await;

        let temp_dir = TempDir::new().unwrap();
        write_package(temp_dir.path(), "0.1.0");
        let mut wf = workflow(temp_dir.path(), &server.url("/npm/"));

        let outcome = wf.publish(None, PublishOptions::default()).await;
        assert!(matches!(outcome, Err(WorkflowError::VersionConflict { .. })));
        upload.assert_calls_async(0).await;

        let reporter = Reporter::new(OutputFormat::Json, wf.token_manager());
        assert_eq!(reporter.report(&outcome), 1);
    }

    #[tokio::test]
    async fn test_publish_uploads_new_version() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/npm/react-app");
                then.status(200).json_body(json!({
                    "name": "react-app",
                    "versions": {"0.1.0": {"version": "0.1.0"}}
                }));
            })
            .await;
        let upload = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/npm/react-app")
                    .header("authorization", "Bearer ya29.workflow-token");
                then.status(201).json_body(json!({"ok": true}));
            })
            .await;

        let temp_dir = TempDir::new().unwrap();
        write_package(temp_dir.path(), "0.2.0");
        let mut wf = workflow(temp_dir.path(), &server.url("/npm/"));

        let result = wf.publish(None, PublishOptions::default()).await.unwrap();

        upload.assert_async().await;
        assert!(!result.dry_run);
        assert_eq!(result.version, "0.2.0");
        assert_eq!(result.tag, "latest");
        assert!(result.integrity.starts_with("sha512-"));
    }

    #[tokio::test]
    async fn test_configure_twice_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let mut wf = workflow(temp_dir.path(), "us-central1-npm.pkg.dev/acme/npm-repo");

        let first = wf.configure().await.unwrap();
        let content = std::fs::read_to_string(&first.npmrc_path).unwrap();

        let second = wf.configure().await.unwrap();
        assert!(!second.changed);
        assert!(!second.replaced_existing);
        assert_eq!(std::fs::read_to_string(&second.npmrc_path).unwrap(), content);
    }
}
