// ABOUTME: Pre-deploy compressed snapshot of the live release, with retention.
// ABOUTME: Archives are named <site>_<stamp>.tar.gz under the site's backup_path.

use crate::config::SiteConfig;
use crate::exec::{RunOptions, Runner, quote};
use crate::types::BackupId;

use super::error::ExecResultExt;
use super::layout::{RELEASES_DIR, SiteLayout};
use super::release::ReleaseManager;
use super::DeployError;

const ARCHIVE_EXT: &str = ".tar.gz";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    Created { id: BackupId, path: String },
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The site has no backup_path.
    Disabled,
    /// First deploy: nothing is live yet.
    NothingDeployed,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Disabled => f.write_str("no backup_path configured"),
            SkipReason::NothingDeployed => f.write_str("no current release to back up"),
        }
    }
}

pub struct BackupManager<'a> {
    runner: &'a dyn Runner,
    layout: &'a SiteLayout,
    site: &'a SiteConfig,
}

impl<'a> BackupManager<'a> {
    pub fn new(runner: &'a dyn Runner, layout: &'a SiteLayout, site: &'a SiteConfig) -> Self {
        Self {
            runner,
            layout,
            site,
        }
    }

    fn prefix(&self) -> String {
        format!("{}_", self.site.name)
    }

    /// Archive the release `current` points to.
    pub async fn create_backup(&self) -> Result<BackupOutcome, DeployError> {
        let Some(backup_path) = self.site.backup_path.as_deref() else {
            return Ok(BackupOutcome::Skipped(SkipReason::Disabled));
        };

        let current = ReleaseManager::new(self.runner, self.layout)
            .current_release()
            .await?;
        let Some(current) = current else {
            return Ok(BackupOutcome::Skipped(SkipReason::NothingDeployed));
        };

        self.runner
            .check(&format!("mkdir -p {}", quote(backup_path)), &RunOptions::default())
            .await
            .step("create backup directory")?;

        let existing = self.list_backups().await?;
        let id = BackupId::next_after(existing.last());
        let archive = format!(
            "{}/{}{}{}",
            backup_path.trim_end_matches('/'),
            self.prefix(),
            id,
            ARCHIVE_EXT
        );

        let command = format!(
            "tar -czf {} -C {} {}",
            quote(&archive),
            quote(&format!("{}/{}", self.layout.root(), RELEASES_DIR)),
            quote(current.as_str())
        );
        self.runner
            .check(&command, &RunOptions::default())
            .await
            .step("create backup archive")?;

        tracing::info!("Backed up release {} to {}", current, archive);
        Ok(BackupOutcome::Created { id, path: archive })
    }

    /// This site's archives, oldest first.
    pub async fn list_backups(&self) -> Result<Vec<BackupId>, DeployError> {
        let Some(backup_path) = self.site.backup_path.as_deref() else {
            return Ok(Vec::new());
        };
        let listing = self
            .runner
            .capture(
                &format!("if [ -d {dir} ]; then ls -1 {dir}; fi", dir = quote(backup_path)),
                &RunOptions::default(),
            )
            .await
            .step("list backups")?;

        let prefix = self.prefix();
        let mut ids: Vec<BackupId> = listing
            .lines()
            .filter_map(|name| parse_archive_name(name.trim(), &prefix))
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Delete the oldest archives beyond `max_backups`. Returns the deleted ids.
    pub async fn prune_backups(&self) -> Result<Vec<BackupId>, DeployError> {
        let Some(backup_path) = self.site.backup_path.as_deref() else {
            return Ok(Vec::new());
        };
        let backups = self.list_backups().await?;
        let excess = backups.len().saturating_sub(self.site.max_backups);

        let mut removed = Vec::with_capacity(excess);
        for id in backups.into_iter().take(excess) {
            let archive = format!(
                "{}/{}{}{}",
                backup_path.trim_end_matches('/'),
                self.prefix(),
                id,
                ARCHIVE_EXT
            );
            self.runner.remove(&archive).await.step("prune backup")?;
            tracing::debug!("Pruned backup {}", archive);
            removed.push(id);
        }
        Ok(removed)
    }
}

/// `<prefix><stamp>.tar.gz` to the stamp. Other sites' archives whose names
/// merely share the prefix fail the stamp parse.
fn parse_archive_name(name: &str, prefix: &str) -> Option<BackupId> {
    let stamp = name.strip_prefix(prefix)?.strip_suffix(ARCHIVE_EXT)?;
    BackupId::parse(stamp).ok()
}
