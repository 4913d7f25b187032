// ABOUTME: SSH endpoint resolution for remote execution targets.
// ABOUTME: Parses "host", "user@host", "host:port", "user@host:port" and applies env overrides.

use std::env;

use super::HostOverride;

pub const DEFAULT_SSH_PORT: u16 = 22;

/// A resolved SSH destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshEndpoint {
    pub host: String,
    pub port: u16,
    pub user: String,
}

/// The parsed pieces of a host string before defaults are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct HostSpec {
    pub host: String,
    pub port: Option<u16>,
    pub user: Option<String>,
}

impl HostSpec {
    pub(crate) fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("host cannot be empty".to_string());
        }

        let (user_part, rest) = match s.find('@') {
            Some(at_pos) => (Some(&s[..at_pos]), &s[at_pos + 1..]),
            None => (None, s),
        };

        let (host, port) = match rest.rfind(':') {
            Some(colon_pos) => {
                let port_str = &rest[colon_pos + 1..];
                let port = port_str
                    .parse::<u16>()
                    .map_err(|_| format!("invalid port: {}", port_str))?;
                (&rest[..colon_pos], Some(port))
            }
            None => (rest, None),
        };

        if host.is_empty() {
            return Err("hostname cannot be empty".to_string());
        }
        if let Some(user) = user_part
            && user.is_empty()
        {
            return Err("user cannot be empty".to_string());
        }

        Ok(HostSpec {
            host: host.to_string(),
            port,
            user: user_part.map(str::to_string),
        })
    }
}

impl SshEndpoint {
    /// Combine the file values with the environment override.
    ///
    /// Precedence for every field: override, then inline `user@host:port`,
    /// then the dedicated `user`/`port` keys, then defaults (`$USER`, 22).
    /// Returns `Ok(None)` when neither the file nor the override names a host.
    pub fn resolve(
        host: Option<&str>,
        user: Option<&str>,
        port: Option<u16>,
        overrides: &HostOverride,
    ) -> Result<Option<Self>, String> {
        let file_spec = host.map(HostSpec::parse).transpose()?;
        let override_spec = overrides.host.as_deref().map(HostSpec::parse).transpose()?;

        let Some(base) = override_spec.clone().or(file_spec.clone()) else {
            return Ok(None);
        };

        let user = overrides
            .user
            .clone()
            .or_else(|| override_spec.as_ref().and_then(|s| s.user.clone()))
            .or_else(|| file_spec.as_ref().and_then(|s| s.user.clone()))
            .or_else(|| user.map(str::to_string))
            .unwrap_or_else(|| env::var("USER").unwrap_or_else(|_| "root".to_string()));

        let port = overrides
            .port
            .or_else(|| override_spec.as_ref().and_then(|s| s.port))
            .or_else(|| file_spec.as_ref().and_then(|s| s.port))
            .or(port)
            .unwrap_or(DEFAULT_SSH_PORT);

        Ok(Some(SshEndpoint {
            host: base.host,
            port,
            user,
        }))
    }
}

impl std::fmt::Display for SshEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}
