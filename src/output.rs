// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Supports normal, quiet (CI), and JSON-lines output modes.

use serde::Serialize;
use std::time::Instant;

use crate::deploy::{BatchReport, DeployState, RollbackOutcome, SiteReport};
use crate::diagnostics::Warning;
use crate::types::SiteName;

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-friendly output with progress messages
    Normal,
    /// Minimal output for CI (only final results)
    Quiet,
    /// JSON lines for scripting
    Json,
}

/// Handles CLI output based on the configured mode.
#[derive(Debug)]
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Start timing an operation.
    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Print a progress message (suppressed in quiet/json mode).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    /// A site entered a new state.
    pub fn state(&self, site: &SiteName, state: DeployState) {
        match self.mode {
            OutputMode::Normal => println!("[{site}] {state}"),
            OutputMode::Quiet => {}
            OutputMode::Json => emit(&StateEvent {
                event: "state",
                site: site.as_str(),
                state,
            }),
        }
    }

    pub fn warning(&self, site: &SiteName, warning: &Warning) {
        match self.mode {
            OutputMode::Normal => eprintln!("[{site}] warning: {}", warning.message),
            OutputMode::Quiet => {}
            OutputMode::Json => emit(&WarningEvent {
                event: "warning",
                site: site.as_str(),
                warning,
            }),
        }
    }

    /// Print the outcome of one site's operation.
    pub fn report(&self, report: &SiteReport) {
        if self.mode == OutputMode::Json {
            emit(&ResultEvent {
                event: "result",
                report,
            });
            return;
        }

        let line = result_line(report);
        if report.success {
            println!("{line}");
        } else {
            eprintln!("{line}");
        }

        if self.mode == OutputMode::Normal {
            for warning in &report.warnings {
                println!("  warning: {}", warning.message);
            }
        }
    }

    /// Print the per-site outcome table of a batch.
    pub fn summary(&self, batch: &BatchReport) {
        if self.mode == OutputMode::Json {
            let sites: Vec<_> = batch
                .reports
                .iter()
                .map(|r| SummaryRow {
                    site: r.site.as_str(),
                    success: r.success,
                    state: r.final_state(),
                })
                .collect();
            emit(&SummaryEvent {
                event: "summary",
                operation: batch.operation.to_string(),
                total: batch.total(),
                failed: batch.failed_count(),
                duration_secs: self.start_time.map(|_| self.elapsed_secs()),
                sites,
            });
            return;
        }

        let width = batch
            .reports
            .iter()
            .map(|r| r.site.as_str().len())
            .max()
            .unwrap_or(4)
            .max(4);

        println!();
        println!("{:<width$}  {:<7}  {}", "SITE", "RESULT", "DETAIL");
        for report in &batch.reports {
            let (result, detail) = if report.success {
                let detail = report
                    .release
                    .as_ref()
                    .map(|id| id.to_string())
                    .unwrap_or_default();
                ("ok", detail)
            } else {
                let detail = report
                    .failure
                    .as_ref()
                    .map(|f| format!("{}: {}", f.state, f.message))
                    .unwrap_or_default();
                ("FAILED", detail)
            };
            println!(
                "{:<width$}  {:<7}  {}",
                report.site.as_str(),
                result,
                detail
            );
        }
        println!(
            "{} {}: {} ok, {} failed",
            batch.operation,
            if batch.total() == 1 { "site" } else { "sites" },
            batch.total() - batch.failed_count(),
            batch.failed_count()
        );
    }

    /// Print configured site identifiers, one per line.
    pub fn sites(&self, names: &[&str]) {
        match self.mode {
            OutputMode::Json => emit(&SitesEvent {
                event: "sites",
                sites: names,
            }),
            _ => {
                for name in names {
                    println!("{name}");
                }
            }
        }
    }

    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!("Error: {message}"),
            OutputMode::Json => {
                let event = JsonEvent {
                    event: "error",
                    message,
                    duration_secs: self.start_time.map(|_| self.elapsed_secs()),
                };
                if let Ok(json) = serde_json::to_string(&event) {
                    eprintln!("{json}");
                }
            }
        }
    }
}

/// One human-readable line for a site's result.
pub fn result_line(report: &SiteReport) -> String {
    let elapsed = report.elapsed.as_secs_f64();
    if report.success {
        let what = match &report.release {
            Some(id) => format!(" ({})", id),
            None => String::new(),
        };
        return format!(
            "{}: {} ok{} in {:.1}s",
            report.site, report.operation, what, elapsed
        );
    }

    let mut line = format!("{}: {} failed", report.site, report.operation);
    if let Some(failure) = &report.failure {
        line.push_str(&format!(" in {}: {}", failure.state, failure.message));
        if let Some(code) = failure.exit_code {
            line.push_str(&format!(" (exit {})", code));
        }
    }
    match &report.rollback {
        RollbackOutcome::NotAttempted => {}
        RollbackOutcome::Restored { release } => {
            line.push_str(&format!("; rolled back to {}", release))
        }
        RollbackOutcome::NoTarget => line.push_str("; no release to roll back to"),
        RollbackOutcome::Failed { reason } => {
            line.push_str(&format!("; rollback failed: {}", reason))
        }
    }
    line
}

fn emit<T: Serialize>(event: &T) {
    if let Ok(json) = serde_json::to_string(event) {
        println!("{json}");
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}

#[derive(Serialize)]
struct StateEvent<'a> {
    event: &'a str,
    site: &'a str,
    state: DeployState,
}

#[derive(Serialize)]
struct WarningEvent<'a> {
    event: &'a str,
    site: &'a str,
    #[serde(flatten)]
    warning: &'a Warning,
}

#[derive(Serialize)]
struct ResultEvent<'a> {
    event: &'a str,
    #[serde(flatten)]
    report: &'a SiteReport,
}

#[derive(Serialize)]
struct SummaryRow<'a> {
    site: &'a str,
    success: bool,
    state: DeployState,
}

#[derive(Serialize)]
struct SummaryEvent<'a> {
    event: &'a str,
    operation: String,
    total: usize,
    failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
    sites: Vec<SummaryRow<'a>>,
}

#[derive(Serialize)]
struct SitesEvent<'a> {
    event: &'a str,
    sites: &'a [&'a str],
}
