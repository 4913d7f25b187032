// ABOUTME: Application build steps run inside a new release.
// ABOUTME: Dependency install, migration plan check, migrate, collectstatic, and service restarts.

use crate::config::SiteConfig;
use crate::diagnostics::Warning;
use crate::exec::{RunOptions, Runner, quote};
use crate::types::ReleaseId;

use super::error::ExecResultExt;
use super::layout::SiteLayout;
use super::DeployError;

const MANAGE_PY: &str = "manage.py";

/// Whether a build step did its work or had nothing to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepRun {
    Ran,
    Skipped,
}

pub struct AppSteps<'a> {
    runner: &'a dyn Runner,
    layout: &'a SiteLayout,
    site: &'a SiteConfig,
}

impl<'a> AppSteps<'a> {
    pub fn new(runner: &'a dyn Runner, layout: &'a SiteLayout, site: &'a SiteConfig) -> Self {
        Self {
            runner,
            layout,
            site,
        }
    }

    fn in_release(&self, id: &ReleaseId) -> RunOptions {
        RunOptions::new().cwd(self.layout.release_dir(id)).stream()
    }

    /// Create the virtualenv if needed and install requirements into it.
    pub async fn install(&self, id: &ReleaseId) -> Result<StepRun, DeployError> {
        let requirements = self.layout.release_path(id, &self.site.requirements);
        if !self.runner.test(&format!("-f {}", quote(&requirements))).await.step("install")? {
            tracing::info!("No {} in release, skipping install", self.site.requirements);
            return Ok(StepRun::Skipped);
        }

        let venv_python = format!("{}/bin/python", self.site.venv);
        let has_venv = self
            .runner
            .test(&format!("-x {}", quote(&self.layout.release_path(id, &venv_python))))
            .await
            .step("install")?;

        if !has_venv {
            let create = format!("{} -m venv {}", self.site.python, quote(&self.site.venv));
            self.runner
                .check(&create, &self.in_release(id))
                .await
                .step("create virtualenv")?;
        }

        let install = format!(
            "{} install --prefer-binary -r {}",
            quote(&format!("{}/bin/pip", self.site.venv)),
            quote(&self.site.requirements)
        );
        self.runner
            .check(&install, &self.in_release(id))
            .await
            .step("install dependencies")?;
        Ok(StepRun::Ran)
    }

    pub async fn has_manage_py(&self, id: &ReleaseId) -> Result<bool, DeployError> {
        self.runner
            .test(&format!("-f {}", quote(&self.layout.release_path(id, MANAGE_PY))))
            .await
            .step("inspect release")
    }

    /// The release's virtualenv interpreter if present, else the configured one.
    async fn interpreter(&self, id: &ReleaseId) -> Result<String, DeployError> {
        let venv_python = self
            .layout
            .release_path(id, &format!("{}/bin/python", self.site.venv));
        if self
            .runner
            .test(&format!("-x {}", quote(&venv_python)))
            .await
            .step("inspect release")?
        {
            Ok(quote(&venv_python))
        } else {
            Ok(self.site.python.clone())
        }
    }

    async fn manage(&self, id: &ReleaseId, args: &str, step: &str) -> Result<(), DeployError> {
        let python = self.interpreter(id).await?;
        let command = format!("{} {} {}", python, MANAGE_PY, args);
        self.runner
            .check(&command, &self.in_release(id))
            .await
            .step(step)?;
        Ok(())
    }

    /// Dry-run the migrations so a broken plan fails before anything changes.
    pub async fn validate_migrations(&self, id: &ReleaseId) -> Result<(), DeployError> {
        self.manage(id, "migrate --plan", "migration check").await
    }

    pub async fn migrate(&self, id: &ReleaseId) -> Result<(), DeployError> {
        self.manage(id, "migrate --noinput", "migrate").await?;
        if self.site.seed {
            self.manage(id, "db_seed", "seed database").await?;
        }
        Ok(())
    }

    pub async fn collect_static(&self, id: &ReleaseId) -> Result<(), DeployError> {
        self.manage(id, "collectstatic --noinput", "collectstatic").await
    }
}

/// What a pass over the restart scripts did.
#[derive(Debug, Default)]
pub struct Restarted {
    pub ran: usize,
    pub warnings: Vec<Warning>,
}

/// Run each restart script with the site name. Never fails: missing and
/// failing scripts come back as warnings for the caller to report.
pub async fn restart_services(runner: &dyn Runner, site: &SiteConfig) -> Restarted {
    let mut restarted = Restarted::default();

    for script in &site.restart_scripts {
        match runner.test(&format!("-f {}", quote(script))).await {
            Ok(true) => {}
            Ok(false) => {
                restarted.warnings.push(Warning::restart(format!(
                    "restart script {} not found, skipping",
                    script
                )));
                continue;
            }
            Err(e) => {
                restarted
                    .warnings
                    .push(Warning::restart(format!("could not check {}: {}", script, e)));
                continue;
            }
        }

        let command = format!("{} {}", quote(script), quote(site.name.as_str()));
        match runner.check(&command, &RunOptions::new().stream()).await {
            Ok(_) => {
                tracing::info!("Ran {} for {}", script, site.name);
                restarted.ran += 1;
            }
            Err(e) => restarted
                .warnings
                .push(Warning::restart(format!("{} failed: {}", script, e))),
        }
    }

    restarted
}
