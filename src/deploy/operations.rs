// ABOUTME: Per-site operations exposed to the CLI: deploy, rollback, unlock, restart.
// ABOUTME: Each takes a resolved site and its runner and returns a structured report.

use crate::config::SiteConfig;
use crate::diagnostics::Warning;
use crate::exec::Runner;
use crate::output::Output;

use super::app::restart_services;
use super::deployment::Deployment;
use super::layout::SiteLayout;
use super::lock::LockManager;
use super::release::ReleaseManager;
use super::report::{Operation, Progress, RollbackOutcome, SiteReport, StepStatus};
use super::{DeployError, DeployState};

/// Deploy the site's branch as a new release.
pub async fn deploy(site: &SiteConfig, runner: &dyn Runner, output: &Output) -> SiteReport {
    Deployment::new(site, runner, output).run().await
}

/// Move `current` back to the previous complete release.
///
/// Takes the lock like a deploy does, and discards the release it leaves, so
/// rolling back twice goes two releases back.
pub async fn rollback(site: &SiteConfig, runner: &dyn Runner, output: &Output) -> SiteReport {
    let layout = SiteLayout::new(&site.deploy_path);
    let mut progress = Progress::new(&site.name, output);
    let mut report = SiteReport::new(site.name.clone(), Operation::Rollback);

    progress.enter(DeployState::Locking);
    let lock = match LockManager::new(runner, &layout, &site.name).acquire().await {
        Ok(lock) => {
            progress.finish(StepStatus::Ok, None);
            lock
        }
        Err(e) => {
            progress.finish(StepStatus::Failed, Some(e.to_string()));
            report.fail(DeployState::Locking, &e);
            return progress.complete(report);
        }
    };

    progress.enter(DeployState::RollingBack);
    match ReleaseManager::new(runner, &layout).rollback().await {
        Ok(rollback) => {
            tracing::info!("{} rolled back to {}", site.name, rollback.to);
            let status = match rollback.leftover {
                Some(reason) => progress.warn_all(vec![Warning::prune(reason)]),
                None => StepStatus::Ok,
            };
            progress.finish(status, Some(format!("current -> {}", rollback.to)));
            report.previous = rollback.from;
            report.release = Some(rollback.to.clone());
            report.rollback = RollbackOutcome::Restored {
                release: rollback.to,
            };

            progress.enter(DeployState::Restarting);
            let restarted = restart_services(runner, site).await;
            let status = progress.warn_all(restarted.warnings);
            progress.finish(status, None);
        }
        Err(e) => {
            progress.finish(StepStatus::Failed, Some(e.to_string()));
            report.rollback = match &e {
                DeployError::NoRollbackTarget => RollbackOutcome::NoTarget,
                other => RollbackOutcome::Failed {
                    reason: other.to_string(),
                },
            };
            report.fail(DeployState::RollingBack, &e);
        }
    }

    progress.enter(DeployState::Unlocking);
    match lock.release().await {
        Ok(()) => progress.finish(StepStatus::Ok, None),
        Err(e) => {
            progress.warn(Warning::lock_release(e.to_string()));
            progress.finish(StepStatus::Warned, Some(e.to_string()));
        }
    }

    if report.failure.is_none() {
        progress.mark(DeployState::Done, StepStatus::Ok);
    } else {
        progress.mark(DeployState::Failed, StepStatus::Failed);
    }
    progress.complete(report)
}

/// Remove the site's lock marker regardless of who holds it.
pub async fn unlock(site: &SiteConfig, runner: &dyn Runner, output: &Output) -> SiteReport {
    let layout = SiteLayout::new(&site.deploy_path);
    let mut progress = Progress::new(&site.name, output);
    let mut report = SiteReport::new(site.name.clone(), Operation::Unlock);

    progress.enter(DeployState::Unlocking);
    match LockManager::new(runner, &layout, &site.name)
        .force_unlock()
        .await
    {
        Ok(true) => progress.finish(StepStatus::Ok, Some("lock removed".to_string())),
        Ok(false) => progress.finish(StepStatus::Skipped, Some("not locked".to_string())),
        Err(e) => {
            progress.finish(StepStatus::Failed, Some(e.to_string()));
            report.fail(DeployState::Unlocking, &e);
        }
    }
    progress.complete(report)
}

/// Run the site's restart scripts against the live release.
pub async fn restart(site: &SiteConfig, runner: &dyn Runner, output: &Output) -> SiteReport {
    let mut progress = Progress::new(&site.name, output);
    let report = SiteReport::new(site.name.clone(), Operation::Restart);

    progress.enter(DeployState::Restarting);
    let restarted = restart_services(runner, site).await;
    let status = progress.warn_all(restarted.warnings);
    progress.finish(
        status,
        Some(format!(
            "{} of {} scripts ran",
            restarted.ran,
            site.restart_scripts.len()
        )),
    );
    progress.complete(report)
}
