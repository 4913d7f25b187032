// ABOUTME: Versioned release directories and the atomic `current` link.
// ABOUTME: Creates, populates, marks, activates, lists, rolls back, and prunes releases.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::exec::{RunOptions, Runner, quote};
use crate::types::ReleaseId;

use super::error::ExecResultExt;
use super::layout::{CURRENT_LINK, CURRENT_TMP, RELEASE_MARKER, SiteLayout};
use super::DeployError;

/// Contents of a release's completion marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseMetadata {
    pub id: String,
    pub branch: String,
    pub commit: Option<String>,
    pub completed_at: DateTime<Utc>,
}

/// Result of a manual rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rollback {
    /// The release that was live before, now discarded.
    pub from: Option<ReleaseId>,
    pub to: ReleaseId,
    /// Why `from` could not be removed, when it was left behind.
    pub leftover: Option<String>,
}

/// Owns everything under `releases/` and the `current` link.
pub struct ReleaseManager<'a> {
    runner: &'a dyn Runner,
    layout: &'a SiteLayout,
}

impl<'a> ReleaseManager<'a> {
    pub fn new(runner: &'a dyn Runner, layout: &'a SiteLayout) -> Self {
        Self { runner, layout }
    }

    /// Allocate a new, empty release directory.
    ///
    /// The id is the current time, bumped past the newest existing release so
    /// names stay unique and sorted even across clock skew. The final `mkdir`
    /// has no `-p`, so a collision fails instead of reusing a directory.
    pub async fn create_release(&self) -> Result<ReleaseId, DeployError> {
        let releases_dir = self.layout.releases_dir();
        self.runner
            .check(&format!("mkdir -p {}", quote(&releases_dir)), &RunOptions::default())
            .await
            .step("create releases directory")?;

        let existing = self.list_releases().await?;
        let id = ReleaseId::next_after(existing.last());

        self.runner
            .check(
                &format!("mkdir {}", quote(&self.layout.release_dir(&id))),
                &RunOptions::default(),
            )
            .await
            .step("create release directory")?;

        tracing::info!("Created release {}", id);
        Ok(id)
    }

    /// Clone `branch` of `repository` into the release and return the commit.
    pub async fn populate(
        &self,
        id: &ReleaseId,
        repository: &str,
        branch: &str,
        shallow: bool,
    ) -> Result<Option<String>, DeployError> {
        let dir = self.layout.release_dir(id);
        let depth = if shallow { "--depth 1 " } else { "" };
        let clone = format!(
            "git clone -q {}--branch {} -- {} {}",
            depth,
            quote(branch),
            quote(repository),
            quote(&dir)
        );

        self.runner
            .check(&clone, &RunOptions::new().stream())
            .await
            .map_err(|source| DeployError::CloneFailure {
                repository: repository.to_string(),
                branch: branch.to_string(),
                source,
            })?;

        let commit = self
            .runner
            .capture(
                &format!("git -C {} rev-parse HEAD", quote(&dir)),
                &RunOptions::default(),
            )
            .await;

        match commit {
            Ok(commit) if !commit.is_empty() => {
                tracing::info!("Checked out {} at {}", branch, commit);
                Ok(Some(commit))
            }
            Ok(_) => Ok(None),
            Err(e) => {
                tracing::warn!("Could not read commit of release {}: {}", id, e);
                Ok(None)
            }
        }
    }

    /// Write the completion marker. Only marked releases are rollback targets.
    pub async fn mark_complete(
        &self,
        id: &ReleaseId,
        branch: &str,
        commit: Option<String>,
    ) -> Result<ReleaseMetadata, DeployError> {
        let metadata = ReleaseMetadata {
            id: id.to_string(),
            branch: branch.to_string(),
            commit,
            completed_at: Utc::now(),
        };
        let json = serde_json::to_string(&metadata)
            .map_err(|e| DeployError::Config(format!("failed to serialize release metadata: {}", e)))?;

        self.runner
            .check(
                &format!(
                    "printf '%s\\n' {} > {}",
                    quote(&json),
                    quote(&self.layout.release_marker(id))
                ),
                &RunOptions::default(),
            )
            .await
            .step("write release marker")?;
        Ok(metadata)
    }

    pub async fn metadata(&self, id: &ReleaseId) -> Option<ReleaseMetadata> {
        let content = self
            .runner
            .capture(
                &format!("cat {}", quote(&self.layout.release_marker(id))),
                &RunOptions::default(),
            )
            .await
            .ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Point `current` at the release.
    ///
    /// The new link is built under a temporary name and renamed over `current`,
    /// so readers see either the old target or the new one, never nothing.
    pub async fn activate(&self, id: &ReleaseId) -> Result<(), DeployError> {
        let command = format!(
            "ln -sfn {} {} && mv -fT {} {}",
            quote(&SiteLayout::link_target(id)),
            CURRENT_TMP,
            CURRENT_TMP,
            CURRENT_LINK
        );
        self.runner
            .check(&command, &RunOptions::new().cwd(self.layout.root()))
            .await
            .step("switch current release")?;
        tracing::info!("current -> {}", id);
        Ok(())
    }

    /// The release `current` points to, if the link exists and names a release.
    pub async fn current_release(&self) -> Result<Option<ReleaseId>, DeployError> {
        let output = self
            .runner
            .run(
                &format!("readlink {}", quote(&self.layout.current_link())),
                &RunOptions::default(),
            )
            .await
            .step("read current link")?;

        if !output.success() {
            return Ok(None);
        }

        let target = output.stdout.trim().trim_end_matches('/');
        let name = target.rsplit('/').next().unwrap_or(target);
        match ReleaseId::parse(name) {
            Ok(id) => Ok(Some(id)),
            Err(_) => {
                tracing::warn!("current points to unexpected target {}", target);
                Ok(None)
            }
        }
    }

    /// All release directories, oldest first. Unparseable names are ignored.
    pub async fn list_releases(&self) -> Result<Vec<ReleaseId>, DeployError> {
        let releases_dir = self.layout.releases_dir();
        let listing = self
            .runner
            .capture(
                &format!(
                    "if [ -d {dir} ]; then ls -1 {dir}; fi",
                    dir = quote(&releases_dir)
                ),
                &RunOptions::default(),
            )
            .await
            .step("list releases")?;
        Ok(parse_listing(&listing))
    }

    /// Releases carrying the completion marker, oldest first.
    pub async fn complete_releases(&self) -> Result<Vec<ReleaseId>, DeployError> {
        let releases_dir = self.layout.releases_dir();
        let script = format!(
            "if [ -d {dir} ]; then cd {dir} && for d in */; do \
             if [ -f \"$d{marker}\" ]; then echo \"${{d%/}}\"; fi; done; fi",
            dir = quote(&releases_dir),
            marker = RELEASE_MARKER
        );
        let listing = self
            .runner
            .capture(&script, &RunOptions::default())
            .await
            .step("list complete releases")?;
        Ok(parse_listing(&listing))
    }

    /// Newest complete release other than `excluding`.
    pub async fn previous_release(
        &self,
        excluding: Option<&ReleaseId>,
    ) -> Result<Option<ReleaseId>, DeployError> {
        let complete = self.complete_releases().await?;
        Ok(complete
            .into_iter()
            .filter(|id| Some(id) != excluding)
            .max())
    }

    /// Repoint `current` at the previous complete release and discard the one
    /// it moved away from, so repeated rollbacks walk back through history.
    pub async fn rollback(&self) -> Result<Rollback, DeployError> {
        let current = self.current_release().await?;
        let target = self
            .previous_release(current.as_ref())
            .await?
            .ok_or(DeployError::NoRollbackTarget)?;

        self.activate(&target).await?;

        let mut leftover = None;
        if let Some(from) = &current
            && let Err(e) = self.discard(from).await
        {
            tracing::warn!("Rolled back to {} but could not remove {}: {}", target, from, e);
            leftover = Some(format!("failed to remove release {}: {}", from, e));
        }

        Ok(Rollback {
            from: current,
            to: target,
            leftover,
        })
    }

    /// Delete a release directory. Refuses to delete the live release.
    pub async fn discard(&self, id: &ReleaseId) -> Result<bool, DeployError> {
        if self.current_release().await?.as_ref() == Some(id) {
            tracing::warn!("Not discarding {}: it is the current release", id);
            return Ok(false);
        }
        self.runner
            .remove(&self.layout.release_dir(id))
            .await
            .step("remove release")?;
        tracing::info!("Discarded release {}", id);
        Ok(true)
    }

    /// Delete all but the newest `keep` releases, oldest first.
    ///
    /// The release `current` points to is never deleted, even when it falls
    /// outside the newest `keep`. Returns the deleted ids.
    pub async fn prune(&self, keep: usize) -> Result<Vec<ReleaseId>, DeployError> {
        let releases = self.list_releases().await?;
        if releases.len() <= keep {
            return Ok(Vec::new());
        }

        let current = self.current_release().await?;
        let excess = releases.len() - keep;
        let mut removed = Vec::new();

        for id in releases.into_iter().take(excess) {
            if Some(&id) == current.as_ref() {
                tracing::warn!("Keeping {}: it is the current release", id);
                continue;
            }
            self.runner
                .remove(&self.layout.release_dir(&id))
                .await
                .step("prune release")?;
            tracing::debug!("Pruned release {}", id);
            removed.push(id);
        }

        Ok(removed)
    }
}

fn parse_listing(listing: &str) -> Vec<ReleaseId> {
    let mut ids: Vec<ReleaseId> = listing
        .lines()
        .map(|line| line.trim().trim_end_matches('/'))
        .filter(|line| !line.is_empty())
        .filter_map(|name| ReleaseId::parse(name).ok())
        .collect();
    ids.sort();
    ids
}
