//! SafeCommandExecutor: whitelisted child-process execution
//!
//! # Security Features
//!
//! - **Whitelist-based validation**: Only pre-approved commands can execute
//! - **Injection prevention**: Uses `tokio::process::Command`, never a shell
//! - **Argument sanitization**: Arguments passed as a slice, never interpolated into shell strings
//! - **Scoped environment**: Extra variables (such as `NPM_TOKEN`) are set on the child only
//! - **Working directory validation**: Validates existence before execution
//! - **Timeout control**: Long-running or hanging processes are killed
//!
//! # Example
//!
//! ```rust,no_run
//! use artifact_publisher::SafeCommandExecutor;
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), artifact_publisher::CommandError> {
//! let mut executor = SafeCommandExecutor::new(std::env::temp_dir())?;
//! executor.set_timeout(Duration::from_secs(30));
//!
//! let output = executor.execute("npm", &["--version"]).await?;
//! println!("{}", output.stdout);
//! # Ok(())
//! # }
//! ```

use crate::core::error::WorkflowError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Allowed commands whitelist.
///
/// Only these commands can be executed via SafeCommandExecutor.
const ALLOWED_COMMANDS: &[&str] = &["npm", "gcloud"];

/// Errors that can occur during command execution
#[derive(Error, Debug)]
pub enum CommandError {
    /// Command is not in the allowed whitelist
    #[error("Command '{0}' is not in the allowed whitelist")]
    CommandNotAllowed(String),

    /// Working directory does not exist or is not accessible
    #[error("Working directory does not exist: {0}")]
    InvalidWorkingDirectory(PathBuf),

    /// Command execution failed (e.g., binary not found, permission denied)
    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),

    /// Command exceeded the timeout duration
    #[error("Command timeout after {0:?}")]
    Timeout(Duration),
}

impl CommandError {
    /// Attach the command name and convert into a workflow error
    pub fn into_workflow_error(self, command: &str) -> WorkflowError {
        WorkflowError::Command {
            command: command.to_string(),
            message: self.to_string(),
        }
    }
}

/// Captured output of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code (`None` when terminated by a signal)
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout followed by stderr
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// Safe command executor with security controls
#[derive(Debug, Clone)]
pub struct SafeCommandExecutor {
    /// Working directory where commands will be executed
    working_dir: PathBuf,
    /// Optional timeout for command execution
    timeout: Option<Duration>,
}

impl SafeCommandExecutor {
    /// Create a new SafeCommandExecutor with working directory validation.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::InvalidWorkingDirectory` if the directory does not exist.
    ///
    /// # Example
    ///
    /// ```rust
    /// use artifact_publisher::SafeCommandExecutor;
    ///
    /// let executor = SafeCommandExecutor::new(std::env::temp_dir()).unwrap();
    /// ```
    pub fn new<P: AsRef<Path>>(working_dir: P) -> Result<Self, CommandError> {
        let working_dir = working_dir.as_ref().to_path_buf();

        if !working_dir.is_dir() {
            return Err(CommandError::InvalidWorkingDirectory(working_dir));
        }

        Ok(Self {
            working_dir,
            timeout: None,
        })
    }

    /// Set command execution timeout.
    ///
    /// Commands exceeding this duration are killed.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    /// Execute a whitelisted command with no extra environment.
    pub async fn execute(&self, command: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        self.execute_with_env(command, args, &[]).await
    }

    /// Execute a whitelisted command with extra environment variables.
    ///
    /// The variables are visible to the child process only.
    ///
    /// # Errors
    ///
    /// - `CommandError::CommandNotAllowed` - Command not in whitelist
    /// - `CommandError::ExecutionFailed` - Binary not found or execution error
    /// - `CommandError::Timeout` - Command ran longer than the configured timeout
    pub async fn execute_with_env(
        &self,
        command: &str,
        args: &[&str],
        envs: &[(&str, &str)],
    ) -> Result<CommandOutput, CommandError> {
        if !ALLOWED_COMMANDS.contains(&command) {
            return Err(CommandError::CommandNotAllowed(command.to_string()));
        }

        // npm and gcloud ship as .cmd wrappers on Windows
        #[cfg(target_os = "windows")]
        let command_name = format!("{}.cmd", command);

        #[cfg(not(target_os = "windows"))]
        let command_name = command.to_string();

        debug!(command, ?args, dir = %self.working_dir.display(), "executing command");

        let mut child = Command::new(&command_name);
        child
            .args(args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in envs {
            child.env(key, value);
        }

        let run = child.output();
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .map_err(|_| CommandError::Timeout(limit))?,
            None => run.await,
        }
        .map_err(|e| CommandError::ExecutionFailed(e.to_string()))?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorCategory;

    fn get_test_dir() -> PathBuf {
        std::env::temp_dir()
    }

    #[tokio::test]
    async fn test_rejected_command_rm() {
        let executor = SafeCommandExecutor::new(get_test_dir()).unwrap();
        let result = executor.execute("rm", &["-rf", "/"]).await;
        assert!(
            matches!(result, Err(CommandError::CommandNotAllowed(_))),
            "rm should be rejected as not in whitelist"
        );
    }

    #[tokio::test]
    async fn test_rejected_command_sh() {
        let executor = SafeCommandExecutor::new(get_test_dir()).unwrap();
        let result = executor.execute("sh", &["-c", "echo pwned"]).await;
        assert!(matches!(result, Err(CommandError::CommandNotAllowed(_))));
    }

    #[test]
    fn test_invalid_working_directory() {
        let result = SafeCommandExecutor::new("/nonexistent/directory/that/does/not/exist");
        assert!(
            matches!(result, Err(CommandError::InvalidWorkingDirectory(_))),
            "Should reject non-existent working directory"
        );
    }

    #[test]
    fn test_working_directory_must_be_dir() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let result = SafeCommandExecutor::new(file.path());
        assert!(matches!(result, Err(CommandError::InvalidWorkingDirectory(_))));
    }

    #[test]
    fn test_command_output_helpers() {
        let output = CommandOutput {
            code: Some(0),
            stdout: "out\n".to_string(),
            stderr: "err\n".to_string(),
        };
        assert!(output.success());
        assert_eq!(output.combined(), "out\nerr\n");

        let killed = CommandOutput {
            code: None,
            stdout: String::new(),
            stderr: String::new(),
        };
        assert!(!killed.success());
    }

    #[test]
    fn test_into_workflow_error() {
        let error = CommandError::ExecutionFailed("No such file or directory".to_string())
            .into_workflow_error("gcloud");

        assert_eq!(error.code(), "COMMAND_ERROR");
        assert_eq!(error.category(), ErrorCategory::Io);
        assert!(error.to_string().contains("gcloud"));
    }
}
