// ABOUTME: Deployment engine: locking, releases, backups, linking, and the deploy state machine.
// ABOUTME: Every manager executes through the site's Runner; nothing touches the target directly.

mod app;
mod backup;
mod batch;
mod deployment;
mod error;
mod layout;
mod linker;
mod lock;
mod operations;
mod release;
mod report;
mod state;

pub use app::{AppSteps, Restarted, StepRun, restart_services};
pub use backup::{BackupManager, BackupOutcome, SkipReason};
pub use batch::{BatchReport, run_batch};
pub use deployment::Deployment;
pub use error::{DeployError, DeployErrorKind, ExecResultExt};
pub use layout::{
    CURRENT_LINK, CURRENT_TMP, LOCK_FILE, RELEASE_MARKER, RELEASES_DIR, SHARED_DIR, SiteLayout,
};
pub use linker::{LinkOutcome, Linker};
pub use lock::{DeployLock, LockInfo, LockManager};
pub use operations::{deploy, restart, rollback, unlock};
pub use release::{ReleaseManager, ReleaseMetadata, Rollback};
pub use report::{
    Failure, Operation, RollbackOutcome, SiteReport, StepRecord, StepStatus,
};
pub use state::DeployState;
