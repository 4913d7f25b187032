// ABOUTME: Structured per-site results of deploy, rollback, unlock, and restart.
// ABOUTME: Records each state entered, its outcome, the failure, and the rollback result.

use serde::Serialize;
use std::time::{Duration, Instant};

use crate::diagnostics::{Diagnostics, Warning};
use crate::output::Output;
use crate::types::{ReleaseId, SiteName};

use super::{DeployError, DeployErrorKind, DeployState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Deploy,
    Rollback,
    Unlock,
    Restart,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Operation::Deploy => "deploy",
            Operation::Rollback => "rollback",
            Operation::Unlock => "unlock",
            Operation::Restart => "restart",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Ok,
    Skipped,
    /// Completed, but with a non-fatal problem.
    Warned,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub state: DeployState,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    /// State the failure happened in.
    pub state: DeployState,
    pub kind: DeployErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RollbackOutcome {
    /// Nothing needed rolling back.
    NotAttempted,
    /// `current` points at this release.
    Restored { release: ReleaseId },
    /// There was no complete release to return to.
    NoTarget,
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SiteReport {
    pub site: SiteName,
    pub operation: Operation,
    pub success: bool,
    /// Release created (deploy) or restored (rollback).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<ReleaseId>,
    /// Release that was live before the operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<ReleaseId>,
    pub steps: Vec<StepRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
    pub rollback: RollbackOutcome,
    pub warnings: Vec<Warning>,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl SiteReport {
    pub fn new(site: SiteName, operation: Operation) -> Self {
        Self {
            site,
            operation,
            success: false,
            release: None,
            previous: None,
            steps: Vec::new(),
            failure: None,
            rollback: RollbackOutcome::NotAttempted,
            warnings: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// Record the failure. The first one recorded wins.
    pub fn fail(&mut self, state: DeployState, error: &DeployError) {
        if self.failure.is_some() {
            return;
        }
        self.failure = Some(Failure {
            state,
            kind: error.kind(),
            message: error.to_string(),
            exit_code: error.exit_code(),
        });
    }

    /// The report for a site whose runner could not be built.
    pub fn unreachable(site: SiteName, operation: Operation, reason: impl std::fmt::Display) -> Self {
        let mut report = Self::new(site, operation);
        report.failure = Some(Failure {
            state: DeployState::Idle,
            kind: DeployErrorKind::Execution,
            message: format!("could not reach target: {}", reason),
            exit_code: None,
        });
        report
    }

    /// Last state recorded.
    pub fn final_state(&self) -> DeployState {
        self.steps
            .last()
            .map(|s| s.state)
            .unwrap_or(DeployState::Idle)
    }

    pub fn states(&self) -> Vec<DeployState> {
        self.steps.iter().map(|s| s.state).collect()
    }

    pub fn step(&self, state: DeployState) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.state == state)
    }
}

/// Tracks the current state, times each step, and announces transitions.
pub(crate) struct Progress<'a> {
    site: &'a SiteName,
    output: &'a Output,
    state: DeployState,
    step_started: Instant,
    started: Instant,
    steps: Vec<StepRecord>,
    diag: Diagnostics,
}

impl<'a> Progress<'a> {
    pub(crate) fn new(site: &'a SiteName, output: &'a Output) -> Self {
        let now = Instant::now();
        Self {
            site,
            output,
            state: DeployState::Idle,
            step_started: now,
            started: now,
            steps: Vec::new(),
            diag: Diagnostics::default(),
        }
    }

    pub(crate) fn state(&self) -> DeployState {
        self.state
    }

    pub(crate) fn enter(&mut self, state: DeployState) {
        tracing::debug!("{}: {} -> {}", self.site, self.state, state);
        self.state = state;
        self.step_started = Instant::now();
        self.output.state(self.site, state);
    }

    pub(crate) fn finish(&mut self, status: StepStatus, detail: Option<String>) {
        self.steps.push(StepRecord {
            state: self.state,
            status,
            detail,
            elapsed_ms: u64::try_from(self.step_started.elapsed().as_millis()).unwrap_or(u64::MAX),
        });
    }

    /// Enter a state and record it as done in one go.
    pub(crate) fn mark(&mut self, state: DeployState, status: StepStatus) {
        self.enter(state);
        self.finish(status, None);
    }

    pub(crate) fn warn(&mut self, warning: Warning) {
        self.output.warning(self.site, &warning);
        self.diag.warn(warning);
    }

    /// Report each warning, then the status the current step ends with.
    pub(crate) fn warn_all(&mut self, warnings: Vec<Warning>) -> StepStatus {
        if warnings.is_empty() {
            return StepStatus::Ok;
        }
        for warning in warnings {
            self.warn(warning);
        }
        StepStatus::Warned
    }

    /// Move the recorded steps and warnings into the report.
    pub(crate) fn complete(self, mut report: SiteReport) -> SiteReport {
        report.steps = self.steps;
        report.warnings = self.diag.into_warnings();
        report.success = report.failure.is_none();
        report.elapsed = self.started.elapsed();
        report
    }
}
