// ABOUTME: Errors raised by execution targets.
// ABOUTME: A non-zero exit is an error value carrying the command, code, and captured output.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with status {code}: {}", .stderr.trim())]
    NonZeroExit {
        command: String,
        code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("failed to transfer {from} to {to}: {reason}")]
    Transfer {
        from: PathBuf,
        to: String,
        reason: String,
    },

    #[error("invalid execution target: {0}")]
    Target(String),

    #[error("SSH error: {0}")]
    Ssh(#[from] crate::ssh::Error),
}

impl ExecError {
    /// The exit code, when the command ran to completion.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExecError::NonZeroExit { code, .. } => Some(*code),
            _ => None,
        }
    }
}
