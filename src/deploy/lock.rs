// ABOUTME: Deploy lock preventing concurrent deploys to the same site.
// ABOUTME: Uses atomic noclobber file creation with holder info stored as JSON in the marker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::exec::{RunOptions, Runner, quote};
use crate::types::SiteName;

use super::DeployError;
use super::layout::SiteLayout;

/// Information about who holds a deploy lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Hostname of the machine that holds the lock.
    pub holder: String,
    pub pid: u32,
    /// Login of the process that took the lock.
    pub user: String,
    pub site: String,
    pub started_at: DateTime<Utc>,
}

impl LockInfo {
    /// Create lock info for the current process.
    pub fn new(site: &SiteName) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            user: std::env::var("USER").unwrap_or_else(|_| "unknown".to_string()),
            site: site.to_string(),
            started_at: Utc::now(),
        }
    }

    pub fn held_for(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }

    /// e.g. `ci@build-3 (pid 4242) for 12m`.
    pub fn describe(&self) -> String {
        let minutes = self.held_for().num_minutes();
        let held = if minutes >= 1 {
            format!("{}m", minutes)
        } else {
            format!("{}s", self.held_for().num_seconds().max(0))
        };
        format!("{}@{} (pid {}) for {}", self.user, self.holder, self.pid, held)
    }
}

/// Lock operations on one site's `.deploy.lock`.
pub struct LockManager<'a> {
    runner: &'a dyn Runner,
    layout: &'a SiteLayout,
    site: &'a SiteName,
}

impl<'a> LockManager<'a> {
    pub fn new(runner: &'a dyn Runner, layout: &'a SiteLayout, site: &'a SiteName) -> Self {
        Self {
            runner,
            layout,
            site,
        }
    }

    /// Take the site's lock.
    ///
    /// Uses shell noclobber mode so create-if-absent is a single atomic
    /// `open(O_EXCL)`; there is no separate existence check to race against.
    pub async fn acquire(&self) -> Result<DeployLock<'a>, DeployError> {
        let lock_path = self.layout.lock_file();

        self.runner
            .check(
                &format!("mkdir -p {}", quote(self.layout.root())),
                &RunOptions::default(),
            )
            .await
            .map_err(|e| DeployError::Lock(format!("failed to create deploy path: {}", e)))?;

        let info = LockInfo::new(self.site);
        let json = serde_json::to_string(&info)
            .map_err(|e| DeployError::Lock(format!("failed to serialize lock: {}", e)))?;

        // set -C makes > fail if the file already exists.
        let acquire_cmd = format!(
            "(set -C; printf '%s\\n' {} > {}) 2>/dev/null",
            quote(&json),
            quote(&lock_path)
        );

        let result = self
            .runner
            .run(&acquire_cmd, &RunOptions::default())
            .await
            .map_err(|e| DeployError::Lock(format!("failed to acquire lock: {}", e)))?;

        if result.success() {
            tracing::debug!("Acquired deploy lock {}", lock_path);
            return Ok(DeployLock {
                runner: self.runner,
                lock_path,
                released: false,
            });
        }

        if !self.is_locked().await? {
            return Err(DeployError::Lock(format!(
                "could not create lock file {}",
                lock_path
            )));
        }

        let holder = self.holder().await.map(Box::new);
        Err(DeployError::AlreadyLocked { lock_path, holder })
    }

    /// Remove the marker unconditionally.
    pub async fn release(&self) -> Result<(), DeployError> {
        remove_marker(self.runner, &self.layout.lock_file()).await
    }

    pub async fn is_locked(&self) -> Result<bool, DeployError> {
        self.runner
            .exists(&self.layout.lock_file())
            .await
            .map_err(|e| DeployError::Lock(format!("failed to check lock: {}", e)))
    }

    /// Parsed holder info from the marker, if it is present and readable.
    pub async fn holder(&self) -> Option<LockInfo> {
        let content = self
            .runner
            .capture(
                &format!("cat {}", quote(&self.layout.lock_file())),
                &RunOptions::default(),
            )
            .await
            .ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Remove the marker without checking who holds it.
    ///
    /// Unsafe against a deploy that is genuinely still running; meant for
    /// recovering after a crashed or interrupted run. Returns whether a marker
    /// was present.
    pub async fn force_unlock(&self) -> Result<bool, DeployError> {
        if !self.is_locked().await? {
            return Ok(false);
        }
        if let Some(info) = self.holder().await {
            tracing::warn!("Breaking lock held by {}", info.describe());
        }
        self.release().await?;
        Ok(true)
    }
}

/// A held deploy lock. Must be released explicitly with [`DeployLock::release`].
pub struct DeployLock<'a> {
    runner: &'a dyn Runner,
    lock_path: String,
    released: bool,
}

impl std::fmt::Debug for DeployLock<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployLock")
            .field("lock_path", &self.lock_path)
            .field("released", &self.released)
            .finish()
    }
}

impl DeployLock<'_> {
    pub async fn release(mut self) -> Result<(), DeployError> {
        self.released = true;
        remove_marker(self.runner, &self.lock_path).await
    }
}

impl Drop for DeployLock<'_> {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!(
                "Deploy lock {} dropped without release; run unlock to clear it",
                self.lock_path
            );
        }
    }
}

async fn remove_marker(runner: &dyn Runner, lock_path: &str) -> Result<(), DeployError> {
    runner
        .check(&format!("rm -f {}", quote(lock_path)), &RunOptions::default())
        .await
        .map_err(|e| DeployError::Lock(format!("failed to remove lock {}: {}", lock_path, e)))?;
    tracing::debug!("Released deploy lock {}", lock_path);
    Ok(())
}
