// ABOUTME: Library root for stagehand - exposes the deploy engine and its collaborators.
// ABOUTME: The main binary is in main.rs.

pub mod config;
pub mod deploy;
pub mod diagnostics;
pub mod error;
pub mod exec;
pub mod output;
pub mod ssh;
pub mod types;
