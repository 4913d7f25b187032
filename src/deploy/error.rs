// ABOUTME: Error types for deployment operations.
// ABOUTME: Covers locking, cloning, command, permission, and rollback failures.

use serde::Serialize;

use super::LockInfo;
use crate::exec::ExecError;

/// Errors that can occur while deploying, rolling back, or unlocking a site.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Another process holds the site's lock marker.
    #[error("deploy lock {lock_path} is already held{}", holder_suffix(.holder))]
    AlreadyLocked {
        lock_path: String,
        holder: Option<Box<LockInfo>>,
    },

    /// The lock marker could not be created, read, or removed.
    #[error("lock error: {0}")]
    Lock(String),

    #[error("failed to clone {repository} ({branch}): {source}")]
    CloneFailure {
        repository: String,
        branch: String,
        #[source]
        source: ExecError,
    },

    /// A step's command exited non-zero.
    #[error("{step} failed: {source}")]
    CommandFailure {
        step: String,
        #[source]
        source: ExecError,
    },

    #[error("no previous release to roll back to")]
    NoRollbackTarget,

    #[error("failed to set permissions on {path}: {source}")]
    PermissionFailure {
        path: String,
        #[source]
        source: ExecError,
    },

    /// The target could not run the step at all (transport, spawn, timeout).
    #[error("{step}: {source}")]
    Execution {
        step: String,
        #[source]
        source: ExecError,
    },

    #[error("deploy step panicked: {0}")]
    Panicked(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Error kind for programmatic handling and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeployErrorKind {
    AlreadyLocked,
    Lock,
    CloneFailure,
    CommandFailure,
    NoRollbackTarget,
    PermissionFailure,
    Execution,
    Config,
}

impl DeployError {
    pub fn kind(&self) -> DeployErrorKind {
        match self {
            DeployError::AlreadyLocked { .. } => DeployErrorKind::AlreadyLocked,
            DeployError::Lock(_) => DeployErrorKind::Lock,
            DeployError::CloneFailure { .. } => DeployErrorKind::CloneFailure,
            DeployError::CommandFailure { .. } => DeployErrorKind::CommandFailure,
            DeployError::NoRollbackTarget => DeployErrorKind::NoRollbackTarget,
            DeployError::PermissionFailure { .. } => DeployErrorKind::PermissionFailure,
            DeployError::Execution { .. } | DeployError::Panicked(_) => DeployErrorKind::Execution,
            DeployError::Config(_) => DeployErrorKind::Config,
        }
    }

    /// Holder details when the lock was already taken.
    pub fn lock_holder_info(&self) -> Option<&LockInfo> {
        match self {
            DeployError::AlreadyLocked { holder, .. } => holder.as_deref(),
            _ => None,
        }
    }

    /// Exit code of the failing command, if a command ran to completion.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            DeployError::CloneFailure { source, .. }
            | DeployError::CommandFailure { source, .. }
            | DeployError::PermissionFailure { source, .. }
            | DeployError::Execution { source, .. } => source.exit_code(),
            _ => None,
        }
    }

    /// Classify an execution error raised while running `step`.
    ///
    /// A command that ran and exited non-zero is a `CommandFailure`; anything
    /// that kept the command from completing is an `Execution` error.
    pub fn step(step: impl Into<String>, source: ExecError) -> Self {
        let step = step.into();
        match source {
            ExecError::NonZeroExit { .. } => DeployError::CommandFailure { step, source },
            source => DeployError::Execution { step, source },
        }
    }
}

fn holder_suffix(holder: &Option<Box<LockInfo>>) -> String {
    match holder {
        Some(info) => format!(" by {}", info.describe()),
        None => String::new(),
    }
}

/// Attach the step name to execution errors.
pub trait ExecResultExt<T> {
    fn step(self, step: &str) -> Result<T, DeployError>;
}

impl<T> ExecResultExt<T> for Result<T, ExecError> {
    fn step(self, step: &str) -> Result<T, DeployError> {
        self.map_err(|e| DeployError::step(step, e))
    }
}
