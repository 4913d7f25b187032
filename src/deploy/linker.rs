// ABOUTME: Links shared files and directories into a release and sets writable permissions.
// ABOUTME: The authoritative copy of every shared path lives under <deploy_path>/shared.

use crate::config::{Severity, SiteConfig};
use crate::exec::{RunOptions, Runner, quote};
use crate::types::ReleaseId;

use super::error::ExecResultExt;
use super::layout::{SiteLayout, parent};
use super::DeployError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SharedKind {
    File,
    Dir,
}

impl SharedKind {
    fn test_flag(self) -> &'static str {
        match self {
            SharedKind::File => "-f",
            SharedKind::Dir => "-d",
        }
    }
}

/// What happened to one shared path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// The release already linked to the shared copy.
    AlreadyLinked(String),
    /// The shared copy was seeded from the fresh checkout.
    Seeded(String),
    /// The shared copy was created empty.
    Created(String),
    Linked(String),
}

pub struct Linker<'a> {
    runner: &'a dyn Runner,
    layout: &'a SiteLayout,
    site: &'a SiteConfig,
}

impl<'a> Linker<'a> {
    pub fn new(runner: &'a dyn Runner, layout: &'a SiteLayout, site: &'a SiteConfig) -> Self {
        Self {
            runner,
            layout,
            site,
        }
    }

    /// Copy each configured upload into `shared/`.
    pub async fn upload(&self) -> Result<usize, DeployError> {
        for upload in &self.site.uploads {
            if !upload.from.is_file() {
                return Err(DeployError::Config(format!(
                    "upload source {} does not exist",
                    upload.from.display()
                )));
            }
            let dest = self.layout.shared_path(&upload.to);
            if let Some(dir) = parent(&dest) {
                self.mkdir(dir).await?;
            }
            self.runner
                .put(&upload.from, &dest)
                .await
                .step(&format!("upload {}", upload.to))?;
            tracing::info!("Uploaded {} to {}", upload.from.display(), dest);
        }
        Ok(self.site.uploads.len())
    }

    /// Link every shared file, then every shared directory, into the release.
    pub async fn link_shared(&self, id: &ReleaseId) -> Result<Vec<LinkOutcome>, DeployError> {
        let entries = self
            .site
            .shared_files
            .iter()
            .map(|p| (p.as_str(), SharedKind::File))
            .chain(self.site.shared_dirs.iter().map(|p| (p.as_str(), SharedKind::Dir)));

        let mut outcomes = Vec::new();
        for (path, kind) in entries {
            outcomes.push(self.link_one(id, path, kind).await?);
        }
        Ok(outcomes)
    }

    async fn link_one(
        &self,
        id: &ReleaseId,
        path: &str,
        kind: SharedKind,
    ) -> Result<LinkOutcome, DeployError> {
        let shared = self.layout.shared_path(path);
        let target = self.layout.release_path(id, path);
        let step = format!("link shared {}", path);

        let existing = self
            .runner
            .run(&format!("readlink {}", quote(&target)), &RunOptions::default())
            .await
            .step(&step)?;
        if existing.success() && existing.stdout.trim() == shared {
            return Ok(LinkOutcome::AlreadyLinked(path.to_string()));
        }

        let mut outcome = LinkOutcome::Linked(path.to_string());
        if !self.runner.exists(&shared).await.step(&step)? {
            if let Some(dir) = parent(&shared) {
                self.mkdir(dir).await?;
            }

            let checkout_has_it = self
                .runner
                .test(&format!(
                    "{} {} -a ! -L {}",
                    kind.test_flag(),
                    quote(&target),
                    quote(&target)
                ))
                .await
                .step(&step)?;

            let command = if checkout_has_it {
                tracing::info!("Seeding shared {} from the release", path);
                outcome = LinkOutcome::Seeded(path.to_string());
                format!("mv {} {}", quote(&target), quote(&shared))
            } else {
                outcome = LinkOutcome::Created(path.to_string());
                match kind {
                    SharedKind::File => format!("touch {}", quote(&shared)),
                    SharedKind::Dir => format!("mkdir -p {}", quote(&shared)),
                }
            };
            self.runner
                .check(&command, &RunOptions::default())
                .await
                .step(&step)?;
        }

        self.runner.remove(&target).await.step(&step)?;
        if let Some(dir) = parent(&target) {
            self.mkdir(dir).await?;
        }
        self.runner
            .check(
                &format!("ln -s {} {}", quote(&shared), quote(&target)),
                &RunOptions::default(),
            )
            .await
            .step(&step)?;

        tracing::debug!("Linked {} -> {}", target, shared);
        Ok(outcome)
    }

    /// Apply the configured mode to each writable directory in the release.
    ///
    /// With `Severity::Fatal` the first failure is returned as the error. With
    /// `Severity::Warn` every directory is attempted and the failures are
    /// returned for the caller to report.
    pub async fn apply_writable(&self, id: &ReleaseId) -> Result<Vec<DeployError>, DeployError> {
        let mut failures = Vec::new();

        for dir in &self.site.writable_dirs {
            let path = self.layout.release_path(id, dir);
            match self.chmod(&path).await {
                Ok(()) => tracing::debug!(
                    "Set mode {} on {}",
                    self.site.writable_chmod_mode,
                    path
                ),
                Err(e) if self.site.writable_failure == Severity::Fatal => return Err(e),
                Err(e) => failures.push(e),
            }
        }

        Ok(failures)
    }

    async fn chmod(&self, path: &str) -> Result<(), DeployError> {
        let options = RunOptions::new().sudo(self.site.writable_use_sudo);
        let permission_err = |source| DeployError::PermissionFailure {
            path: path.to_string(),
            source,
        };

        self.runner
            .check(&format!("mkdir -p {}", quote(path)), &options)
            .await
            .map_err(permission_err)?;

        // Trailing slash so a linked shared directory is followed.
        let recursive = if self.site.writable_recursive { "-R " } else { "" };
        let command = format!(
            "chmod {}{} {}",
            recursive,
            self.site.writable_chmod_mode,
            quote(&format!("{}/", path))
        );
        self.runner
            .check(&command, &options)
            .await
            .map_err(permission_err)?;
        Ok(())
    }

    async fn mkdir(&self, dir: &str) -> Result<(), DeployError> {
        self.runner
            .check(&format!("mkdir -p {}", quote(dir)), &RunOptions::default())
            .await
            .step(&format!("create {}", dir))?;
        Ok(())
    }
}
