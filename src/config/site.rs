// ABOUTME: Per-site deployment definition as read from sites.yml.
// ABOUTME: Defaults, validation, and endpoint resolution for one site.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use super::deserialize::{
    deserialize_list, deserialize_number, deserialize_opt_number, deserialize_site_name,
};
use super::{FileMode, HostOverride, RunnerKind, Severity, SshEndpoint};
use crate::types::SiteName;

pub const DEFAULT_RESTART_SCRIPTS: [&str; 2] = [
    "/scripts/start_gunicorn_supervisord.sh",
    "/scripts/start_celery_supervisord.sh",
];

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    #[serde(deserialize_with = "deserialize_site_name")]
    pub name: SiteName,

    pub repository: String,

    #[serde(default = "default_branch")]
    pub branch: String,

    pub deploy_path: String,

    #[serde(default)]
    pub runner: RunnerKind,

    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default, deserialize_with = "deserialize_opt_number")]
    pub port: Option<u16>,

    #[serde(default)]
    pub ssh_key: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub trust_first_connection: bool,

    #[serde(default)]
    pub docker_container: Option<String>,

    #[serde(default = "default_docker_user")]
    pub docker_user: String,

    #[serde(default = "default_venv")]
    pub venv: String,

    #[serde(default = "default_python")]
    pub python: String,

    #[serde(default = "default_requirements")]
    pub requirements: String,

    #[serde(default)]
    pub seed: bool,

    #[serde(default)]
    pub backup_path: Option<String>,

    #[serde(default = "default_retention", deserialize_with = "deserialize_number")]
    pub max_backups: usize,

    #[serde(default = "default_retention", deserialize_with = "deserialize_number")]
    pub max_releases: usize,

    #[serde(default, deserialize_with = "deserialize_list")]
    pub shared_files: Vec<String>,

    #[serde(default, deserialize_with = "deserialize_list")]
    pub shared_dirs: Vec<String>,

    #[serde(default, deserialize_with = "deserialize_list")]
    pub writable_dirs: Vec<String>,

    #[serde(default, alias = "chmod_mode")]
    pub writable_chmod_mode: FileMode,

    #[serde(default = "default_true", alias = "recursive")]
    pub writable_recursive: bool,

    #[serde(default, alias = "use_sudo")]
    pub writable_use_sudo: bool,

    #[serde(default)]
    pub writable_failure: Severity,

    #[serde(default)]
    pub uploads: Vec<Upload>,

    #[serde(default = "default_restart_scripts")]
    pub restart_scripts: Vec<String>,

    #[serde(default = "default_true")]
    pub shallow_clone: bool,

    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub command_timeout: Duration,
}

/// A controller-side file copied into `shared/` on every deploy.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Upload {
    pub from: PathBuf,
    /// Destination relative to the site's `shared/` directory.
    pub to: String,
}

fn default_branch() -> String {
    "master".to_string()
}

fn default_true() -> bool {
    true
}

fn default_docker_user() -> String {
    "root".to_string()
}

fn default_venv() -> String {
    ".venv".to_string()
}

fn default_python() -> String {
    "python3".to_string()
}

fn default_requirements() -> String {
    "requirements.txt".to_string()
}

fn default_retention() -> usize {
    5
}

fn default_restart_scripts() -> Vec<String> {
    DEFAULT_RESTART_SCRIPTS.iter().map(|s| s.to_string()).collect()
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

impl SiteConfig {
    /// Check the invariants serde cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.repository.trim().is_empty() {
            return Err("repository cannot be empty".to_string());
        }

        check_absolute("deploy_path", &self.deploy_path)?;
        if self.deploy_path.trim_end_matches('/').is_empty() {
            return Err("deploy_path cannot be the filesystem root".to_string());
        }
        if let Some(backup_path) = &self.backup_path {
            check_absolute("backup_path", backup_path)?;
        }

        if self.max_releases == 0 {
            return Err("max_releases must be at least 1".to_string());
        }
        if self.max_backups == 0 {
            return Err("max_backups must be at least 1".to_string());
        }

        if self.runner == RunnerKind::Docker
            && self
                .docker_container
                .as_deref()
                .is_none_or(|c| c.trim().is_empty())
        {
            return Err("docker_container is required when runner is docker".to_string());
        }

        for path in self
            .shared_files
            .iter()
            .chain(&self.shared_dirs)
            .chain(&self.writable_dirs)
            .chain(self.uploads.iter().map(|u| &u.to))
        {
            check_relative(path)?;
        }
        check_relative(&self.venv)?;
        check_relative(&self.requirements)?;

        Ok(())
    }

    /// The SSH endpoint for this site, if it has a remote leg.
    ///
    /// `local` sites never have one, whatever the environment says. `ssh`
    /// sites must resolve to one. `docker` sites are remote only when a host
    /// is configured or supplied by the override.
    pub fn ssh_endpoint(&self, overrides: &HostOverride) -> Result<Option<SshEndpoint>, String> {
        match self.runner {
            RunnerKind::Local => Ok(None),
            RunnerKind::Ssh => {
                SshEndpoint::resolve(self.host.as_deref(), self.user.as_deref(), self.port, overrides)?
                    .map(Some)
                    .ok_or_else(|| "runner is ssh but no host is configured".to_string())
            }
            RunnerKind::Docker => {
                SshEndpoint::resolve(self.host.as_deref(), self.user.as_deref(), self.port, overrides)
            }
        }
    }

    /// Human-readable execution target, e.g. `docker:web@deploy@host:22`.
    pub fn target_label(&self, overrides: &HostOverride) -> String {
        let endpoint = self.ssh_endpoint(overrides).ok().flatten();
        match (self.runner, endpoint) {
            (RunnerKind::Local, _) => "local".to_string(),
            (RunnerKind::Ssh, Some(ep)) => format!("ssh:{}", ep),
            (RunnerKind::Ssh, None) => "ssh:?".to_string(),
            (RunnerKind::Docker, ep) => {
                let container = self.docker_container.as_deref().unwrap_or("?");
                match ep {
                    Some(ep) => format!("docker:{}@{}", container, ep),
                    None => format!("docker:{}", container),
                }
            }
        }
    }
}

fn check_absolute(field: &str, path: &str) -> Result<(), String> {
    if path.starts_with('/') {
        Ok(())
    } else {
        Err(format!("{} must be an absolute path: {}", field, path))
    }
}

fn check_relative(path: &str) -> Result<(), String> {
    if path.trim().is_empty() {
        return Err("relative paths cannot be empty".to_string());
    }
    if path.starts_with('/') {
        return Err(format!("path must be relative to the release: {}", path));
    }
    if path.split('/').any(|part| part == "..") {
        return Err(format!("path cannot escape the release with '..': {}", path));
    }
    Ok(())
}
