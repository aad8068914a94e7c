//! Console and JSON rendering of executor results

use chrono::{DateTime, Utc};
use colored::Colorize;
use fanout::{Failure, Operation, Outcome, Reporter, RunSummary, TaskLine, TaskStatus};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::time::Duration;

use crate::ui;

/// Prints task lines above a progress bar counting finished targets
pub struct ConsoleReporter {
    bar: ProgressBar,
}

impl ConsoleReporter {
    pub fn new(targets: usize) -> Self {
        let bar = ProgressBar::new(targets as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Reporter for ConsoleReporter {
    fn on_task(&self, system: &str, line: &TaskLine) {
        let text = render_line(system, line);
        self.bar.suspend(|| println!("{text}"));
    }

    fn on_complete(&self, system: &str, _index: usize, failure: Option<&Failure>) {
        if let Some(failure) = failure {
            let text = format!("{} {} {failure}", "✗".red(), system.bold());
            self.bar.suspend(|| eprintln!("{text}"));
        }
        self.bar.set_message(ui::truncate_path(system, 30));
        self.bar.inc(1);
    }
}

/// One task line, prefixed with its target
pub fn render_line(system: &str, line: &TaskLine) -> String {
    let indent = "  ".repeat(line.depth);
    let label = match line.status {
        TaskStatus::Changed => line.status.label().yellow(),
        TaskStatus::Ok => line.status.label().green(),
        TaskStatus::Error => line.status.label().red(),
    };

    let mut text = format!(
        "{} {indent}{label} {}",
        format!("[{system}]").dimmed(),
        line.message
    );
    if line.verbose {
        for item in &line.items {
            let marker = if item.changed { "+".yellow() } else { "=".dimmed() };
            text.push_str(&format!("\n{indent}    {marker} {}", item.item));
        }
    }
    text
}

/// Table cell for one target's `apply` or `delete` result
pub fn change_cell(outcome: &Outcome<usize>) -> String {
    match outcome {
        Outcome::Success(0) => "ok".green().to_string(),
        Outcome::Success(1) => "1 change".yellow().to_string(),
        Outcome::Success(changes) => format!("{changes} changes").yellow().to_string(),
        Outcome::Failure(failure) => format!("failed: {failure}").red().to_string(),
    }
}

/// Table cell for one target's `is_applied` result
pub fn check_cell(outcome: &Outcome<bool>) -> String {
    match outcome {
        Outcome::Success(true) => "applied".green().to_string(),
        Outcome::Success(false) => "pending".yellow().to_string(),
        Outcome::Failure(failure) => format!("failed: {failure}").red().to_string(),
    }
}

/// Target names padded to a common width, paired with their cells
pub fn table_rows(targets: &[String], cells: &[String]) -> Vec<String> {
    let width = targets
        .iter()
        .map(|target| target.chars().count())
        .max()
        .unwrap_or(0);

    targets
        .iter()
        .zip(cells)
        .map(|(target, cell)| format!("{target:<width$}  {cell}"))
        .collect()
}

/// One-line summary of a run
pub fn summary_line(operation: Operation, summary: &RunSummary, elapsed: Duration) -> String {
    let targets = match summary.total() {
        1 => "1 target".to_string(),
        n => format!("{n} targets"),
    };

    let detail = match operation {
        Operation::IsApplied => format!(
            "{} applied, {} pending",
            summary.succeeded - summary.pending,
            summary.pending
        ),
        Operation::Apply | Operation::Delete => {
            format!("{} changed ({} changes)", summary.changed, summary.changes)
        }
    };

    format!(
        "{targets}: {detail}, {} failed in {}",
        summary.failed,
        ui::format_duration(elapsed)
    )
}

/// Machine-readable run report
#[derive(Debug, Serialize)]
pub struct Report<T> {
    pub manifest: String,
    pub operation: Operation,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub targets: Vec<TargetReport<T>>,
    pub summary: RunSummary,
}

#[derive(Debug, Serialize)]
pub struct TargetReport<T> {
    pub target: String,
    pub outcome: Outcome<T>,
}

impl<T: Serialize> Report<T> {
    pub fn new(
        manifest: impl Into<String>,
        operation: Operation,
        started_at: DateTime<Utc>,
        targets: Vec<String>,
        results: Vec<Outcome<T>>,
        summary: RunSummary,
    ) -> Self {
        Self {
            manifest: manifest.into(),
            operation,
            started_at,
            finished_at: Utc::now(),
            targets: targets
                .into_iter()
                .zip(results)
                .map(|(target, outcome)| TargetReport { target, outcome })
                .collect(),
            summary,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
