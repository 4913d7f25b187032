// ABOUTME: Configuration types and parsing for sites.yml.
// ABOUTME: Loads the ordered site map, validates every site, and resolves lookups by name.

mod deserialize;
mod endpoint;
mod overrides;
mod runner;
mod site;

pub use endpoint::{DEFAULT_SSH_PORT, SshEndpoint};
pub use overrides::{HOST_ENV, HostOverride, PORT_ENV, USER_ENV};
pub use runner::{FileMode, RunnerKind, Severity};
pub use site::{DEFAULT_RESTART_SCRIPTS, SiteConfig, Upload};

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

pub const CONFIG_FILENAME: &str = "sites.yml";
pub const CONFIG_FILENAME_ALT: &str = "sites.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".stagehand/sites.yml";

/// Every site declared in the configuration file, in file order.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct SitesConfig {
    #[serde(deserialize_with = "deserialize::deserialize_sites")]
    sites: Vec<SiteConfig>,
}

impl SitesConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: SitesConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                tracing::debug!("Loading sites from {}", path.display());
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    fn validate(&self) -> Result<()> {
        // Sites sharing a deploy_path would share a lock and a release history.
        let mut seen = HashSet::new();
        for site in &self.sites {
            site.validate()
                .map_err(|e| Error::InvalidConfig(format!("site '{}': {}", site.name, e)))?;
            let root = site.deploy_path.trim_end_matches('/');
            if !seen.insert(root) {
                return Err(Error::InvalidConfig(format!(
                    "site '{}': deploy_path {} is already used by another site",
                    site.name, site.deploy_path
                )));
            }
        }
        Ok(())
    }

    pub fn sites(&self) -> &[SiteConfig] {
        &self.sites
    }

    pub fn site(&self, name: &str) -> Result<&SiteConfig> {
        self.sites
            .iter()
            .find(|s| s.name.as_str() == name)
            .ok_or_else(|| Error::UnknownSite(name.to_string()))
    }

    /// Site identifiers in configuration order.
    pub fn site_names(&self) -> Vec<&str> {
        self.sites.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}
