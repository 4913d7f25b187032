// ABOUTME: Runs deploy, rollback, unlock, or restart for one site or all sites.
// ABOUTME: Prints each site's result and the batch table, and fails if any site failed.

use super::CommandContext;
use stagehand::deploy::{Operation, run_batch};
use stagehand::error::{Error, Result};
use std::slice;

/// Which sites a command applies to.
#[derive(Debug, Clone, Copy)]
pub enum Selection<'a> {
    One(&'a str),
    All,
}

pub async fn run(
    mut ctx: CommandContext,
    operation: Operation,
    selection: Selection<'_>,
    jobs: usize,
) -> Result<()> {
    ctx.output.start_timer();

    let sites = match selection {
        Selection::One(name) => slice::from_ref(ctx.config.site(name)?),
        Selection::All => ctx.config.sites(),
    };
    if sites.is_empty() {
        return Err(Error::NoSites);
    }

    if let Selection::All = selection {
        ctx.output.progress(&format!(
            "Running {} on {} site(s), {} at a time",
            operation,
            sites.len(),
            jobs.max(1)
        ));
    }

    let batch = run_batch(operation, sites, jobs, |site| ctx.run_site(site, operation)).await;

    for report in &batch.reports {
        ctx.output.report(report);
    }
    if let Selection::All = selection {
        ctx.output.summary(&batch);
    }

    ctx.pool.disconnect_all().await;

    batch.into_result().map(|_| ())
}
