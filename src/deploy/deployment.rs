// ABOUTME: The per-site deploy state machine.
// ABOUTME: Sequences every step, rolls back build failures, and always releases the lock.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;

use crate::config::SiteConfig;
use crate::diagnostics::Warning;
use crate::exec::Runner;
use crate::output::Output;
use crate::types::ReleaseId;

use super::app::{AppSteps, StepRun, restart_services};
use super::backup::{BackupManager, BackupOutcome};
use super::layout::SiteLayout;
use super::linker::Linker;
use super::lock::LockManager;
use super::release::ReleaseManager;
use super::report::{Operation, Progress, RollbackOutcome, SiteReport, StepStatus};
use super::{DeployError, DeployState};

/// One deploy attempt for one site.
///
/// Steps run strictly in order through the site's runner:
///
/// `Locking → BackingUp → Cloning → Linking → Installing → Validating →
/// Migrating → CollectingStatic → Activating → Restarting → Pruning →
/// Unlocking → Done`
///
/// A failure from `Cloning` through `Activating` enters `RollingBack`, which
/// keeps `current` on the last good release and discards the failed one. The
/// lock is released on every path once it has been taken. If the lock is
/// already held nothing else is touched.
pub struct Deployment<'a> {
    site: &'a SiteConfig,
    runner: &'a dyn Runner,
    layout: SiteLayout,
    progress: Progress<'a>,
    report: SiteReport,
    release: Option<ReleaseId>,
    commit: Option<String>,
}

impl<'a> Deployment<'a> {
    pub fn new(site: &'a SiteConfig, runner: &'a dyn Runner, output: &'a Output) -> Self {
        Self {
            site,
            runner,
            layout: SiteLayout::new(&site.deploy_path),
            progress: Progress::new(&site.name, output),
            report: SiteReport::new(site.name.clone(), Operation::Deploy),
            release: None,
            commit: None,
        }
    }

    pub async fn run(mut self) -> SiteReport {
        let site = self.site;
        let runner = self.runner;
        let layout = self.layout.clone();
        tracing::info!("Deploying {} ({}) via {}", site.name, site.branch, runner.describe());

        self.progress.enter(DeployState::Locking);
        let locks = LockManager::new(runner, &layout, &site.name);
        let lock = match locks.acquire().await {
            Ok(lock) => {
                self.progress.finish(StepStatus::Ok, None);
                lock
            }
            Err(e) => {
                tracing::error!("{}: {}", site.name, e);
                self.progress.finish(StepStatus::Failed, Some(e.to_string()));
                self.report.fail(DeployState::Locking, &e);
                return self.progress.complete(self.report);
            }
        };

        self.report.previous = ReleaseManager::new(runner, &layout)
            .current_release()
            .await
            .unwrap_or_default();

        let result = match AssertUnwindSafe(self.pipeline(&layout)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(DeployError::Panicked(panic_message(panic.as_ref()))),
        };

        if let Err(e) = result {
            let state = self.progress.state();
            tracing::error!("{} failed in {}: {}", site.name, state, e);
            self.progress.finish(StepStatus::Failed, Some(e.to_string()));
            self.report.fail(state, &e);
            if state.triggers_rollback() {
                let rolled_back = AssertUnwindSafe(self.roll_back(&layout)).catch_unwind().await;
                if let Err(panic) = rolled_back {
                    let reason = format!("rollback panicked: {}", panic_message(panic.as_ref()));
                    tracing::error!("{}: {}", site.name, reason);
                    self.progress.finish(StepStatus::Failed, Some(reason.clone()));
                    self.report.rollback = RollbackOutcome::Failed { reason };
                }
            }
        }

        self.progress.enter(DeployState::Unlocking);
        match lock.release().await {
            Ok(()) => self.progress.finish(StepStatus::Ok, None),
            Err(e) => {
                self.progress.warn(Warning::lock_release(e.to_string()));
                self.progress.finish(StepStatus::Warned, Some(e.to_string()));
            }
        }

        let terminal = match (&self.report.failure, &self.report.rollback) {
            (None, _) => Some((DeployState::Done, StepStatus::Ok)),
            (Some(_), RollbackOutcome::NoTarget | RollbackOutcome::Failed { .. }) => {
                Some((DeployState::Failed, StepStatus::Failed))
            }
            (Some(_), _) => None,
        };
        if let Some((state, status)) = terminal {
            self.progress.mark(state, status);
        }

        self.progress.complete(self.report)
    }

    async fn pipeline(&mut self, layout: &SiteLayout) -> Result<(), DeployError> {
        let site = self.site;
        let runner = self.runner;
        let releases = ReleaseManager::new(runner, layout);

        self.progress.enter(DeployState::BackingUp);
        let backups = BackupManager::new(runner, layout, site);
        match backups.create_backup().await {
            Ok(BackupOutcome::Created { path, .. }) => {
                let status = match backups.prune_backups().await {
                    Ok(_) => StepStatus::Ok,
                    Err(e) => {
                        self.progress
                            .warn(Warning::backup(format!("failed to prune backups: {}", e)));
                        StepStatus::Warned
                    }
                };
                self.progress.finish(status, Some(path));
            }
            Ok(BackupOutcome::Skipped(reason)) => {
                self.progress.finish(StepStatus::Skipped, Some(reason.to_string()));
            }
            Err(e) => {
                self.progress
                    .warn(Warning::backup(format!("backup failed: {}", e)));
                self.progress.finish(StepStatus::Warned, Some(e.to_string()));
            }
        }

        self.progress.enter(DeployState::Cloning);
        let id = releases.create_release().await?;
        self.release = Some(id.clone());
        self.report.release = Some(id.clone());
        self.commit = releases
            .populate(&id, &site.repository, &site.branch, site.shallow_clone)
            .await?;
        self.progress.finish(StepStatus::Ok, self.commit.clone());

        self.progress.enter(DeployState::Linking);
        let linker = Linker::new(runner, layout, site);
        linker.upload().await?;
        let links = linker.link_shared(&id).await?;
        let failures = linker.apply_writable(&id).await?;
        let status = if failures.is_empty() {
            StepStatus::Ok
        } else {
            for failure in &failures {
                self.progress.warn(Warning::permission(failure.to_string()));
            }
            StepStatus::Warned
        };
        self.progress.finish(
            status,
            Some(format!(
                "{} shared, {} writable",
                links.len(),
                site.writable_dirs.len()
            )),
        );

        let app = AppSteps::new(runner, layout, site);
        self.progress.enter(DeployState::Installing);
        let status = match app.install(&id).await? {
            StepRun::Ran => StepStatus::Ok,
            StepRun::Skipped => StepStatus::Skipped,
        };
        self.progress.finish(status, None);

        let django = app.has_manage_py(&id).await?;
        for state in [
            DeployState::Validating,
            DeployState::Migrating,
            DeployState::CollectingStatic,
        ] {
            self.progress.enter(state);
            if !django {
                self.progress
                    .finish(StepStatus::Skipped, Some("no manage.py".to_string()));
                continue;
            }
            match state {
                DeployState::Validating => app.validate_migrations(&id).await?,
                DeployState::Migrating => app.migrate(&id).await?,
                _ => app.collect_static(&id).await?,
            }
            self.progress.finish(StepStatus::Ok, None);
        }

        self.progress.enter(DeployState::Activating);
        releases
            .mark_complete(&id, &site.branch, self.commit.clone())
            .await?;
        releases.activate(&id).await?;
        self.progress.finish(StepStatus::Ok, Some(id.to_string()));

        // The new release is live from here on; later problems are warnings.
        self.progress.enter(DeployState::Restarting);
        let restarted = restart_services(runner, site).await;
        let status = self.progress.warn_all(restarted.warnings);
        self.progress.finish(status, None);

        self.progress.enter(DeployState::Pruning);
        match releases.prune(site.max_releases).await {
            Ok(removed) => self
                .progress
                .finish(StepStatus::Ok, Some(format!("removed {}", removed.len()))),
            Err(e) => {
                self.progress
                    .warn(Warning::prune(format!("failed to prune releases: {}", e)));
                self.progress.finish(StepStatus::Warned, Some(e.to_string()));
            }
        }

        Ok(())
    }

    /// Put `current` back on the last good release and discard the failed one.
    async fn roll_back(&mut self, layout: &SiteLayout) {
        self.progress.enter(DeployState::RollingBack);
        let restored = self.restore(layout).await;

        // Removing the failed release is cleanup and never decides the outcome.
        if let Some(failed) = self.release.clone()
            && let Err(e) = ReleaseManager::new(self.runner, layout).discard(&failed).await
        {
            self.progress.warn(Warning::prune(format!(
                "failed to remove release {}: {}",
                failed, e
            )));
        }

        match restored {
            Ok(target) => {
                self.report.rollback = RollbackOutcome::Restored {
                    release: target.clone(),
                };
                let restarted = restart_services(self.runner, self.site).await;
                let status = self.progress.warn_all(restarted.warnings);
                tracing::info!("{} rolled back to {}", self.site.name, target);
                self.progress
                    .finish(status, Some(format!("current -> {}", target)));
            }
            Err(DeployError::NoRollbackTarget) => {
                tracing::error!("{}: no previous release to roll back to", self.site.name);
                self.progress.finish(
                    StepStatus::Failed,
                    Some(DeployError::NoRollbackTarget.to_string()),
                );
                self.report.rollback = RollbackOutcome::NoTarget;
            }
            Err(e) => {
                tracing::error!("{}: rollback failed: {}", self.site.name, e);
                self.progress.finish(StepStatus::Failed, Some(e.to_string()));
                self.report.rollback = RollbackOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        }
    }

    /// Point `current` at the rollback target and return it.
    async fn restore(&self, layout: &SiteLayout) -> Result<ReleaseId, DeployError> {
        let releases = ReleaseManager::new(self.runner, layout);

        let target = match &self.report.previous {
            Some(previous) => previous.clone(),
            None => releases
                .previous_release(self.release.as_ref())
                .await?
                .ok_or(DeployError::NoRollbackTarget)?,
        };

        if releases.current_release().await?.as_ref() != Some(&target) {
            releases.activate(&target).await?;
        }
        Ok(target)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
