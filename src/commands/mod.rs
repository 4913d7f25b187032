// ABOUTME: Command module aggregator for the stagehand CLI.
// ABOUTME: Re-exports the per-site operation driver and the list command.

mod connection;
mod list;
mod sites;

pub use connection::CommandContext;
pub use list::list;
pub use sites::{Selection, run};
