// ABOUTME: Shared state for one CLI invocation and per-site runner setup.
// ABOUTME: Builds each site's runner from the session pool and dispatches the operation.

use stagehand::config::{HostOverride, SiteConfig, SitesConfig};
use stagehand::deploy::{self, Operation, SiteReport};
use stagehand::exec;
use stagehand::output::Output;
use stagehand::ssh::SessionPool;

/// Everything a command needs: the loaded sites, the environment override,
/// SSH sessions shared across sites, and the output sink.
pub struct CommandContext {
    pub config: SitesConfig,
    pub overrides: HostOverride,
    pub pool: SessionPool,
    pub output: Output,
}

impl CommandContext {
    pub fn new(config: SitesConfig, overrides: HostOverride, output: Output) -> Self {
        Self {
            config,
            overrides,
            pool: SessionPool::new(),
            output,
        }
    }

    /// Connect to the site's target and run `operation` there.
    ///
    /// A target that cannot be reached becomes a failed report for that site
    /// rather than an error, so batches carry on.
    pub async fn run_site(&self, site: &SiteConfig, operation: Operation) -> SiteReport {
        self.output.progress(&format!(
            "{} {} on {}",
            operation,
            site.name,
            site.target_label(&self.overrides)
        ));

        let runner = match exec::connect(site, &self.overrides, &self.pool).await {
            Ok(runner) => runner,
            Err(e) => {
                tracing::error!("{}: {}", site.name, e);
                return SiteReport::unreachable(site.name.clone(), operation, e);
            }
        };
        let runner = runner.as_ref();

        match operation {
            Operation::Deploy => deploy::deploy(site, runner, &self.output).await,
            Operation::Rollback => deploy::rollback(site, runner, &self.output).await,
            Operation::Unlock => deploy::unlock(site, runner, &self.output).await,
            Operation::Restart => deploy::restart(site, runner, &self.output).await,
        }
    }
}
