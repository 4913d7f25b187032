// ABOUTME: Environment-variable override of the SSH endpoint.
// ABOUTME: STAGEHAND_HOST / STAGEHAND_USER / STAGEHAND_PORT win over file values when set.

use crate::error::{Error, Result};
use std::env;

pub const HOST_ENV: &str = "STAGEHAND_HOST";
pub const USER_ENV: &str = "STAGEHAND_USER";
pub const PORT_ENV: &str = "STAGEHAND_PORT";

/// The (host, user, port) triple read from the environment.
///
/// Only the remote leg of a site's execution target honours it: `ssh` sites
/// and `docker` sites reached over SSH. Local sites ignore it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostOverride {
    pub host: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
}

impl HostOverride {
    pub fn from_env() -> Result<Self> {
        let port = match read_var(PORT_ENV) {
            Some(raw) => Some(raw.parse::<u16>().map_err(|_| {
                Error::InvalidConfig(format!("{} is not a valid port: {}", PORT_ENV, raw))
            })?),
            None => None,
        };

        Ok(Self {
            host: read_var(HOST_ENV),
            user: read_var(USER_ENV),
            port,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.host.is_none() && self.user.is_none() && self.port.is_none()
    }
}

/// Unset and empty are treated the same.
fn read_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
