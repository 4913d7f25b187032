// ABOUTME: Runs one per-site operation across many sites.
// ABOUTME: Failures never stop the batch; results come back in configuration order.

use futures::StreamExt;
use serde::Serialize;
use std::future::Future;

use crate::config::SiteConfig;
use crate::error::Error;

use super::report::{Operation, SiteReport};

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub operation: Operation,
    pub reports: Vec<SiteReport>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.reports.len()
    }

    pub fn failed(&self) -> impl Iterator<Item = &SiteReport> {
        self.reports.iter().filter(|r| !r.success)
    }

    pub fn failed_count(&self) -> usize {
        self.failed().count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed_count() == 0
    }

    /// `Err(BatchFailed)` when any site failed.
    pub fn into_result(self) -> Result<Self, Error> {
        match self.failed_count() {
            0 => Ok(self),
            failed => Err(Error::BatchFailed {
                failed,
                total: self.total(),
            }),
        }
    }
}

/// Apply `op` to every site, at most `jobs` at a time.
///
/// Sites never share a deploy_path, lock, or backup namespace, so running
/// different sites concurrently needs no coordination beyond each site's lock.
/// Each site's own steps still run strictly in sequence inside `op`.
pub async fn run_batch<'s, F, Fut>(
    operation: Operation,
    sites: &'s [SiteConfig],
    jobs: usize,
    op: F,
) -> BatchReport
where
    F: FnMut(&'s SiteConfig) -> Fut,
    Fut: Future<Output = SiteReport>,
{
    let reports = futures::stream::iter(sites)
        .map(op)
        .buffered(jobs.max(1))
        .collect()
        .await;

    BatchReport { operation, reports }
}
