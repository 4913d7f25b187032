// ABOUTME: Application-wide error types for stagehand.
// ABOUTME: Uses thiserror for ergonomic error handling.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("unknown site: {0}")]
    UnknownSite(String),

    #[error("no sites configured")]
    NoSites,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{failed} of {total} sites failed")]
    BatchFailed { failed: usize, total: usize },

    #[error(transparent)]
    Deploy(#[from] crate::deploy::DeployError),

    #[error(transparent)]
    Exec(#[from] crate::exec::ExecError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
