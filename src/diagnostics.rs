// ABOUTME: Diagnostics accumulator for non-fatal warnings during deployment.
// ABOUTME: Collects warnings that shouldn't fail a deploy but should appear in its report.

use serde::Serialize;

/// Collects non-fatal warnings during one site's operation.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}

/// A non-fatal warning collected during deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn lock_release(message: impl Into<String>) -> Self {
        Self::new(WarningKind::LockRelease, message)
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self::new(WarningKind::Permission, message)
    }

    pub fn backup(message: impl Into<String>) -> Self {
        Self::new(WarningKind::Backup, message)
    }

    pub fn restart(message: impl Into<String>) -> Self {
        Self::new(WarningKind::Restart, message)
    }

    pub fn prune(message: impl Into<String>) -> Self {
        Self::new(WarningKind::Prune, message)
    }
}

/// Categories of warnings that can occur during deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Failed to release deploy lock (lock file may remain).
    LockRelease,
    /// A writable directory could not be chmod'ed.
    Permission,
    /// Backup creation or pruning failed.
    Backup,
    /// A restart script was missing or failed.
    Restart,
    /// Old or failed releases could not be removed.
    Prune,
}
