//! Execution engine - runs one operation of a group on every system in parallel
//!
//! Every invocation walks the same phases:
//!
//! 1. `Created`: clone the template per system, create the coordinator and
//!    spawn the pool.
//! 2. `Starting`: wait until every worker holding a pool slot bound its
//!    configuration.
//! 3. `Coordinating`: open the barrier and wait for the run to settle.
//! 4. `Joining`: collect the results in system order.
//!
//! Per-system failures come back as [`Outcome::Failure`]. Only systemic
//! problems are returned as errors, and never before the pool was joined.

use crate::configuration::{Configuration, System};
use crate::context::{Context, LogReporter, Reporter};
use crate::coordinator::Coordinator;
use crate::error::{Error, Result};
use crate::group::Group;
use crate::pool::{PoolRun, ThreadPool, capture};
use crate::types::{Operation, Outcome};
use anyhow::Context as AnyhowContext;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Tuning knobs of the executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorOptions {
    /// How long workers may take to bind before the run is aborted
    pub threads_start_timeout: Duration,
    /// Poll interval while waiting for workers to bind
    pub threads_start_interval: Duration,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            threads_start_timeout: Duration::from_secs(1),
            threads_start_interval: Duration::from_millis(10),
        }
    }
}

/// Lifecycle of one executor invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Created,
    Starting,
    Coordinating,
    Joining,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Coordinating => "coordinating",
            Self::Joining => "joining",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// The configuration method a run invokes on every copy
type Call<C, T> = fn(&mut C, &mut Context<<C as Configuration>::System>) -> anyhow::Result<T>;

/// One unit of pool work: a private copy bound to one system
struct WorkItem<C: Configuration> {
    index: usize,
    config: C,
    system: C::System,
}

/// Runs groups of configurations
pub struct Executor {
    options: ExecutorOptions,
    reporter: Arc<dyn Reporter>,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor {
    pub fn new() -> Self {
        Self {
            options: ExecutorOptions::default(),
            reporter: Arc::new(LogReporter),
        }
    }

    pub fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    /// Receiver for task lines and worker completion, shared by all workers
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Apply the group and return the change count of every system
    pub fn apply<C: Configuration>(&self, group: &Group<C>) -> Result<Vec<Outcome<usize>>> {
        self.run(group, Operation::Apply, |config, ctx| config.apply(ctx))
    }

    /// Delete the group and return the change count of every system
    pub fn delete<C: Configuration>(&self, group: &Group<C>) -> Result<Vec<Outcome<usize>>> {
        self.run(group, Operation::Delete, |config, ctx| config.delete(ctx))
    }

    /// Check whether every system is in the desired state
    pub fn is_applied<C: Configuration>(&self, group: &Group<C>) -> Result<Vec<Outcome<bool>>> {
        self.run(group, Operation::IsApplied, |config, ctx| config.is_applied(ctx))
    }

    fn run<C, T>(
        &self,
        group: &Group<C>,
        operation: Operation,
        call: Call<C, T>,
    ) -> Result<Vec<Outcome<T>>>
    where
        C: Configuration,
        T: Send + 'static,
    {
        let name = group.config().name();
        let count = group.len();
        log_phase(&name, operation, Phase::Created);

        if count == 0 {
            log::debug!("{name} {operation}: no systems, nothing to do");
            return Ok(Vec::new());
        }

        let workers = group.workers();
        if workers == 0 {
            return Err(Error::InvalidGroup(format!(
                "{name} has {count} systems but no workers"
            )));
        }

        let coordinator = Arc::new(
            Coordinator::new(count)
                .with_synchronize(group.synchronize())
                .with_fail_early(group.fail_early())
                .with_verbose(group.verbose()),
        );

        let items: Vec<WorkItem<C>> = group
            .systems()
            .iter()
            .enumerate()
            .map(|(index, system)| WorkItem {
                index,
                config: group.config().clone(),
                system: system.clone(),
            })
            .collect();

        let worker = {
            let coordinator = Arc::clone(&coordinator);
            let reporter = Arc::clone(&self.reporter);
            let params = group.params().clone();
            let verbose = group.verbose();

            move |item: WorkItem<C>| -> Outcome<T> {
                let WorkItem {
                    index,
                    mut config,
                    system,
                } = item;
                let system_name = system.name();
                let config_name = config.name();

                let bound = capture(|| {
                    config
                        .bind(&system)
                        .with_context(|| format!("Failed to bind {config_name} to {system_name}"))
                });
                coordinator.register(index);

                let outcome = match bound {
                    Outcome::Failure(failure) => Outcome::Failure(failure),
                    Outcome::Success(()) => {
                        let mut ctx = Context::new(system)
                            .with_index(index)
                            .with_params(params.clone())
                            .with_verbose(verbose)
                            .with_reporter(Arc::clone(&reporter))
                            .with_coordinator(Arc::clone(&coordinator));
                        capture(|| call(&mut config, &mut ctx))
                    }
                };

                coordinator.finish(index, outcome.failure().cloned());
                reporter.on_complete(&system_name, index, outcome.failure());
                outcome
            }
        };

        let pool = ThreadPool::new(workers).spawn(worker, items)?;

        // Queued systems only start once a slot frees up
        let expected = workers.min(count);
        log_phase(&name, operation, Phase::Starting);
        if let Err(err) = self.wait_for_startup(&coordinator, &pool, expected) {
            return Err(abort(pool, &coordinator, err));
        }

        log_phase(&name, operation, Phase::Coordinating);
        if let Err(err) = coordinator.coordinate() {
            for (index, failure) in coordinator.failures() {
                log::error!("{name} {operation}: worker {index} failed: {failure}");
            }
            return Err(abort(pool, &coordinator, err));
        }

        if group.fail_early() && coordinator.failed() > 0 {
            log::warn!(
                "{name} {operation}: {} worker(s) failed, cancelling the rest",
                coordinator.failed()
            );
            coordinator.cancel();
        }

        log_phase(&name, operation, Phase::Joining);
        log::trace!("{name} {operation}: waiting for {} systems", pool.len());
        let results = pool.join()?;

        log_phase(&name, operation, Phase::Done);
        Ok(results)
    }

    /// Poll until `expected` workers bound their configuration
    fn wait_for_startup<T>(
        &self,
        coordinator: &Coordinator,
        pool: &PoolRun<T>,
        expected: usize,
    ) -> Result<()> {
        let timeout = self.options.threads_start_timeout;
        let deadline = Instant::now() + timeout;

        loop {
            let started = coordinator.started();
            if started >= expected {
                log::debug!("{started}/{expected} workers started");
                return Ok(());
            }

            if !pool.is_alive() {
                // Workers register before the pool exits
                let started = coordinator.started();
                if started >= expected {
                    return Ok(());
                }
                return Err(Error::Pool(format!(
                    "pool stopped after {started} of {expected} workers started"
                )));
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(Error::StartupTimeout {
                    started,
                    expected,
                    timeout,
                });
            }

            thread::sleep(self.options.threads_start_interval.min(deadline - now));
        }
    }
}

/// Release every worker, wait for the pool and hand back `err`
fn abort<T>(pool: PoolRun<T>, coordinator: &Coordinator, err: Error) -> Error {
    if pool.is_alive() {
        coordinator.cancel();
    }

    if let Err(join_err) = pool.join() {
        log::error!("pool did not shut down cleanly: {join_err}");
    }

    err
}

fn log_phase(name: &str, operation: Operation, phase: Phase) {
    log::debug!("{name} {operation}: {phase}");
}
