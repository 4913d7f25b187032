// ABOUTME: Selects and builds the runner for a site's configured target.
// ABOUTME: SSH legs come from the shared session pool; overrides apply to them only.

use super::{ContainerRunner, ExecError, LocalRunner, Runner, SshRunner};
use crate::config::{HostOverride, RunnerKind, SiteConfig};
use crate::ssh::{SessionConfig, SessionPool};

/// Build the runner for `site`.
///
/// `docker` sites without a host run the docker CLI locally; with a host (from
/// the file or the override) they run it over SSH.
pub async fn connect(
    site: &SiteConfig,
    overrides: &HostOverride,
    pool: &SessionPool,
) -> Result<Box<dyn Runner>, ExecError> {
    let endpoint = site.ssh_endpoint(overrides).map_err(ExecError::Target)?;

    let host_runner: Box<dyn Runner> = match endpoint {
        Some(endpoint) => {
            let mut config = SessionConfig::from_endpoint(&endpoint)
                .trust_on_first_use(site.trust_first_connection)
                .command_timeout(site.command_timeout);
            if let Some(key) = &site.ssh_key {
                config = config.key_path(key);
            }
            let session = pool.get_or_connect(config).await?;
            Box::new(SshRunner::new(session))
        }
        None => Box::new(LocalRunner::new(site.command_timeout)),
    };

    let runner: Box<dyn Runner> = match site.runner {
        RunnerKind::Local | RunnerKind::Ssh => host_runner,
        RunnerKind::Docker => {
            let container = site.docker_container.as_deref().ok_or_else(|| {
                ExecError::Target("docker_container is required when runner is docker".into())
            })?;
            Box::new(ContainerRunner::new(
                host_runner,
                container,
                site.docker_user.clone(),
            ))
        }
    };

    tracing::debug!("Site {} runs on {}", site.name, runner.describe());
    Ok(runner)
}
