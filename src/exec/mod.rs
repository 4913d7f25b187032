// ABOUTME: Execution abstraction over local, SSH, and container targets.
// ABOUTME: Every deploy step runs through a `Runner` selected once per site.

mod connect;
mod container;
mod error;
mod local;
mod remote;
mod shell;

pub use connect::connect;
pub use container::ContainerRunner;
pub use error::ExecError;
pub use local::LocalRunner;
pub use remote::SshRunner;
pub use shell::quote;

use async_trait::async_trait;
use std::path::Path;

/// Per-invocation execution options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Directory to run the command in.
    pub cwd: Option<String>,
    /// Run with elevated privileges.
    pub sudo: bool,
    /// Log output lines as they are produced.
    pub stream: bool,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    pub fn stream(mut self) -> Self {
        self.stream = true;
        self
    }
}

/// Result of a command that ran to completion, successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Convert a non-zero exit into `ExecError::NonZeroExit`.
    pub fn into_result(self, command: &str) -> Result<Self, ExecError> {
        if self.success() {
            Ok(self)
        } else {
            Err(ExecError::NonZeroExit {
                command: command.to_string(),
                code: self.exit_code,
                stdout: self.stdout,
                stderr: self.stderr,
            })
        }
    }
}

/// Where a site's commands execute.
///
/// `run` reports the exit status without judging it; the helpers built on
/// top (`check`, `capture`, `remove`) turn a non-zero exit into an error.
/// Runners never retry.
#[async_trait]
pub trait Runner: Send + Sync {
    /// Short label for logs, e.g. `local` or `ssh deploy@web1:22`.
    fn describe(&self) -> String;

    /// Run a shell command and return its exit status and output.
    async fn run(&self, command: &str, options: &RunOptions) -> Result<CommandOutput, ExecError>;

    /// Copy a controller-side file to `remote` on the target.
    async fn put(&self, local: &Path, remote: &str) -> Result<(), ExecError>;

    /// Run a command, failing on non-zero exit.
    async fn check(&self, command: &str, options: &RunOptions) -> Result<CommandOutput, ExecError> {
        self.run(command, options).await?.into_result(command)
    }

    /// Run a command and return its trimmed stdout, failing on non-zero exit.
    async fn capture(&self, command: &str, options: &RunOptions) -> Result<String, ExecError> {
        Ok(self.check(command, options).await?.stdout.trim().to_string())
    }

    /// Evaluate a `test` expression, e.g. `-d '/srv/app'`.
    async fn test(&self, expression: &str) -> Result<bool, ExecError> {
        let output = self
            .run(&format!("test {}", expression), &RunOptions::default())
            .await?;
        Ok(output.success())
    }

    async fn exists(&self, path: &str) -> Result<bool, ExecError> {
        self.test(&format!("-e {}", quote(path))).await
    }

    /// Remove a file, link, or directory tree. Missing paths are not an error.
    async fn remove(&self, path: &str) -> Result<(), ExecError> {
        self.check(&format!("rm -rf {}", quote(path)), &RunOptions::default())
            .await?;
        Ok(())
    }
}
