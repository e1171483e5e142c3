//! Registry config writer (`.npmrc`)
//!
//! Writes the two lines npm needs to route a scope to the registry and to
//! authenticate against it. The token itself is never written: the auth line
//! carries a `${VAR}` placeholder that npm substitutes from the environment of
//! the process it runs in.

use crate::core::error::WorkflowError;
use crate::core::session::RegistryLocation;
use regex::Regex;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Config file name
pub const NPMRC_FILE: &str = ".npmrc";

/// Outcome of writing `.npmrc`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpmrcWrite {
    pub path: PathBuf,
    /// Content the file had before it was overwritten
    pub previous: Option<String>,
    /// Whether the bytes on disk changed
    pub changed: bool,
}

/// Writes `.npmrc` into a project directory
#[derive(Debug, Clone)]
pub struct NpmrcWriter {
    project_dir: PathBuf,
}

impl NpmrcWriter {
    pub fn new<P: AsRef<Path>>(project_dir: P) -> Self {
        Self {
            project_dir: project_dir.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.project_dir.join(NPMRC_FILE)
    }

    /// Render the file content.
    ///
    /// # Examples
    ///
    /// ```
    /// use artifact_publisher::core::RegistryLocation;
    /// use artifact_publisher::registry::NpmrcWriter;
    ///
    /// let registry = RegistryLocation::parse("us-central1-npm.pkg.dev/acme/npm-repo").unwrap();
    /// let content = NpmrcWriter::render(&registry, "@observability", "NPM_TOKEN").unwrap();
    ///
    /// assert_eq!(
    ///     content,
    ///     "@observability:registry=https://us-central1-npm.pkg.dev/acme/npm-repo/\n\
    ///      //us-central1-npm.pkg.dev/acme/npm-repo/:_authToken=${NPM_TOKEN}\n"
    /// );
    /// ```
    pub fn render(
        registry: &RegistryLocation,
        scope: &str,
        token_env: &str,
    ) -> Result<String, WorkflowError> {
        let var_pattern = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")
            .map_err(|e| WorkflowError::config(format!("invalid pattern: {}", e)))?;
        if !var_pattern.is_match(token_env) {
            return Err(WorkflowError::config(format!(
                "token placeholder must be an environment variable name, got {:?}",
                token_env
            )));
        }
        if !scope.starts_with('@') || scope.contains(char::is_whitespace) {
            return Err(WorkflowError::config(format!(
                "scope must look like @name, got {:?}",
                scope
            )));
        }

        Ok(format!(
            "{}:registry={}\n{}:_authToken=${{{}}}\n",
            scope,
            registry.as_str(),
            registry.auth_key(),
            token_env
        ))
    }

    /// Write (or overwrite) `.npmrc`
    pub async fn write(
        &self,
        registry: &RegistryLocation,
        scope: &str,
        token_env: &str,
    ) -> Result<NpmrcWrite, WorkflowError> {
        let content = Self::render(registry, scope, token_env)?;
        let path = self.path();

        let previous = match fs::read_to_string(&path).await {
            Ok(existing) => Some(existing),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(WorkflowError::io(&path, e)),
        };

        let changed = previous.as_deref() != Some(content.as_str());
        if changed {
            fs::write(&path, &content)
                .await
                .map_err(|e| WorkflowError::io(&path, e))?;
            info!(path = %path.display(), "wrote registry config");
        } else {
            debug!(path = %path.display(), "registry config already up to date");
        }

        Ok(NpmrcWrite {
            path,
            previous,
            changed,
        })
    }

}
