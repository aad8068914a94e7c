//! `giga apply`, `giga delete` and `giga check`

use anyhow::{Context as AnyhowContext, Result, bail};
use chrono::{DateTime, Utc};
use dialoguer::Confirm;
use fanout::{
    Executor, Group, LogReporter, NoReport, Operation, Outcome, Reporter, RunSummary, Sequence,
    System,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::Context;
use crate::cli::{DeleteArgs, RunArgs};
use crate::config::Settings;
use crate::report::{self, ConsoleReporter, Report};
use crate::resource::Step;
use crate::schema::{GroupOverrides, Manifest};
use crate::ui;

pub fn apply(ctx: &Context, args: RunArgs) -> Result<()> {
    apply_with(ctx, &args, &Settings::load()?).map(drop)
}

pub fn delete(ctx: &Context, args: DeleteArgs) -> Result<()> {
    delete_with(ctx, &args, &Settings::load()?).map(drop)
}

pub fn check(ctx: &Context, args: RunArgs) -> Result<()> {
    check_with(ctx, &args, &Settings::load()?).map(drop)
}

/// A manifest expanded into a group, ready to run
struct Run {
    name: String,
    targets: Vec<String>,
    group: Group<Sequence<Step>>,
    settings: Settings,
    json: bool,
    quiet: bool,
}

impl Run {
    fn load(ctx: &Context, args: &RunArgs, settings: &Settings) -> Result<Self> {
        let manifest = Manifest::load(&args.manifest)?;
        let name = manifest.name.clone();

        let overrides = GroupOverrides {
            targets: args.targets.clone(),
            jobs: args.jobs,
            synchronize: args.sync,
            fail_early: args.fail_early,
            verbose: ctx.verbose > 0,
        };
        let group = manifest.into_group(&overrides, settings)?;
        let targets = group.systems().iter().map(System::name).collect();

        log::debug!(
            "Loaded {name}: {} targets, {} workers, synchronize={}, fail_early={}",
            group.len(),
            group.workers(),
            group.synchronize(),
            group.fail_early()
        );

        Ok(Self {
            name,
            targets,
            group,
            settings: settings.clone(),
            json: args.json,
            quiet: ctx.quiet,
        })
    }

    /// Run one operation, clearing the progress bar even when it fails
    fn execute<T>(
        &self,
        operation: Operation,
        call: impl FnOnce(&Executor, &Group<Sequence<Step>>) -> fanout::Result<Vec<Outcome<T>>>,
    ) -> Result<Vec<Outcome<T>>> {
        let console = (!self.json && !self.quiet)
            .then(|| Arc::new(ConsoleReporter::new(self.group.len())));
        let reporter: Arc<dyn Reporter> = match &console {
            Some(console) => Arc::clone(console) as Arc<dyn Reporter>,
            None if self.json => Arc::new(LogReporter),
            None => Arc::new(NoReport),
        };

        let executor = Executor::new()
            .with_options(self.settings.executor_options())
            .with_reporter(reporter);
        let results = call(&executor, &self.group);

        if let Some(console) = console {
            console.finish();
        }
        results.with_context(|| {
            format!("Failed to {} {}", title(operation).to_lowercase(), self.name)
        })
    }

    fn print<T: Serialize>(
        &self,
        operation: Operation,
        started_at: DateTime<Utc>,
        elapsed: Duration,
        results: Vec<Outcome<T>>,
        summary: &RunSummary,
        cell: fn(&Outcome<T>) -> String,
    ) -> Result<()> {
        if self.json {
            let report = Report::new(
                &self.name,
                operation,
                started_at,
                self.targets.clone(),
                results,
                summary.clone(),
            );
            println!("{}", report.to_json().context("Failed to serialize report")?);
            return Ok(());
        }
        if self.quiet {
            return Ok(());
        }

        ui::header(&format!("{} {}", title(operation), self.name));
        let cells: Vec<String> = results.iter().map(cell).collect();
        for row in report::table_rows(&self.targets, &cells) {
            println!("  {row}");
        }
        println!();

        let line = report::summary_line(operation, summary, elapsed);
        if !summary.is_success() {
            ui::error(&line);
        } else if summary.pending > 0 {
            ui::warn(&line);
        } else {
            ui::success(&line);
        }
        Ok(())
    }
}

fn title(operation: Operation) -> &'static str {
    match operation {
        Operation::Apply => "Apply",
        Operation::Delete => "Delete",
        Operation::IsApplied => "Check",
    }
}

fn apply_with(ctx: &Context, args: &RunArgs, settings: &Settings) -> Result<RunSummary> {
    let run = Run::load(ctx, args, settings)?;
    run_changes(&run, Operation::Apply)
}

fn delete_with(ctx: &Context, args: &DeleteArgs, settings: &Settings) -> Result<RunSummary> {
    let run = Run::load(ctx, &args.run, settings)?;

    if !args.yes {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Delete {} from {} target(s)?",
                run.name,
                run.targets.len()
            ))
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
        if !confirmed {
            ui::info("Cancelled");
            return Ok(RunSummary::default());
        }
    }

    run_changes(&run, Operation::Delete)
}

fn run_changes(run: &Run, operation: Operation) -> Result<RunSummary> {
    let started_at = Utc::now();
    let start = Instant::now();

    let results = run.execute(operation, |executor, group| match operation {
        Operation::Delete => executor.delete(group),
        _ => executor.apply(group),
    })?;

    let summary = RunSummary::from_changes(&results);
    run.print(
        operation,
        started_at,
        start.elapsed(),
        results,
        &summary,
        report::change_cell,
    )?;

    if !summary.is_success() {
        bail!("{} of {} targets failed", summary.failed, summary.total());
    }
    Ok(summary)
}

fn check_with(ctx: &Context, args: &RunArgs, settings: &Settings) -> Result<RunSummary> {
    let run = Run::load(ctx, args, settings)?;
    let started_at = Utc::now();
    let start = Instant::now();

    let results = run.execute(Operation::IsApplied, |executor, group| {
        executor.is_applied(group)
    })?;

    let summary = RunSummary::from_checks(&results);
    run.print(
        Operation::IsApplied,
        started_at,
        start.elapsed(),
        results,
        &summary,
        report::check_cell,
    )?;

    if !summary.is_success() {
        bail!("{} of {} targets failed", summary.failed, summary.total());
    }
    if !summary.is_converged() {
        bail!(
            "{} of {} targets are not applied",
            summary.pending,
            summary.total()
        );
    }
    Ok(summary)
}
