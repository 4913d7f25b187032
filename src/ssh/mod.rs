// ABOUTME: SSH client module for remote execution targets.
// ABOUTME: Agent or key-file authentication, known_hosts verification, and per-invocation session pooling.

mod client;
mod error;
mod pool;

pub use client::{RemoteOutput, Session, SessionConfig};
pub use error::{Error, Result};
pub use pool::SessionPool;
