// ABOUTME: Runs commands on a remote host over a pooled SSH session.
// ABOUTME: One session serves every command of a site's deploy.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::shell::compose;
use super::{CommandOutput, ExecError, RunOptions, Runner};
use crate::ssh::{self, Session};

#[derive(Debug, Clone)]
pub struct SshRunner {
    session: Arc<Session>,
    timeout: Duration,
}

impl SshRunner {
    pub fn new(session: Arc<Session>) -> Self {
        let timeout = session.config().command_timeout;
        Self { session, timeout }
    }
}

#[async_trait]
impl Runner for SshRunner {
    fn describe(&self) -> String {
        let config = self.session.config();
        format!("ssh {}@{}:{}", config.user, config.host, config.port)
    }

    async fn run(&self, command: &str, options: &RunOptions) -> Result<CommandOutput, ExecError> {
        let composed = compose(command, options);
        tracing::debug!("{}$ {}", self.session.config().host, composed);

        let output = self
            .session
            .exec_with(&composed, None, options.stream, self.timeout)
            .await
            .map_err(|e| match e {
                ssh::Error::CommandTimeout(timeout) => ExecError::Timeout {
                    command: command.to_string(),
                    timeout,
                },
                other => ExecError::Ssh(other),
            })?;

        Ok(CommandOutput {
            exit_code: i32::try_from(output.exit_code).unwrap_or(i32::MAX),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    async fn put(&self, local: &Path, remote: &str) -> Result<(), ExecError> {
        let transfer_err = |reason: String| ExecError::Transfer {
            from: local.to_path_buf(),
            to: remote.to_string(),
            reason,
        };

        let contents = tokio::fs::read(local)
            .await
            .map_err(|e| transfer_err(e.to_string()))?;

        tracing::debug!(
            "upload {} ({} bytes) -> {}:{}",
            local.display(),
            contents.len(),
            self.session.config().host,
            remote
        );

        let output = self
            .session
            .upload(&contents, remote)
            .await
            .map_err(|e| transfer_err(e.to_string()))?;

        if !output.success() {
            return Err(transfer_err(format!(
                "remote write exited with status {}: {}",
                output.exit_code,
                output.stderr.trim()
            )));
        }
        Ok(())
    }
}
