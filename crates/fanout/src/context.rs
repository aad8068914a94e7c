//! Execution context and reporter traits
//!
//! A [`Context`] is created by the executor for every worker. It carries the
//! worker's target, the group parameters, the shared coordinator, and the
//! task stack that replaces a process-wide "current task".

use crate::configuration::System;
use crate::coordinator::Coordinator;
use crate::task::{TaskFrame, TaskLine};
use crate::types::{Failure, Operation, Params};
use anyhow::Result;
use std::sync::Arc;

/// Receiver for task lines and worker completion
///
/// Implementations are shared by all workers of a run and must be thread-safe.
pub trait Reporter: Send + Sync {
    /// Called when a task exits
    fn on_task(&self, system: &str, line: &TaskLine);

    /// Called when a worker finished its operation
    fn on_complete(&self, system: &str, index: usize, failure: Option<&Failure>) {
        let _ = (system, index, failure);
    }
}

/// Reporter writing through the `log` facade
pub struct LogReporter;

impl Reporter for LogReporter {
    fn on_task(&self, system: &str, line: &TaskLine) {
        log::info!("[{system}] {line}");
    }

    fn on_complete(&self, system: &str, index: usize, failure: Option<&Failure>) {
        match failure {
            Some(failure) => log::warn!("[{system}] worker {index} failed: {failure}"),
            None => log::debug!("[{system}] worker {index} done"),
        }
    }
}

/// Reporter that drops everything
pub struct NoReport;

impl Reporter for NoReport {
    fn on_task(&self, _system: &str, _line: &TaskLine) {}
}

/// Per-worker execution context
pub struct Context<S: System> {
    pub(crate) system: S,
    pub(crate) index: usize,
    pub(crate) params: Params,
    pub(crate) verbose: bool,
    pub(crate) coordinator: Option<Arc<Coordinator>>,
    pub(crate) reporter: Arc<dyn Reporter>,
    pub(crate) operation: Option<Operation>,
    pub(crate) changes: usize,
    pub(crate) tasks: Vec<TaskFrame>,
}

impl<S: System> Context<S> {
    /// Create a standalone context for `system`
    ///
    /// The context is inactive until a configuration operation runs with it.
    pub fn new(system: S) -> Self {
        Self {
            system,
            index: 0,
            params: Params::default(),
            verbose: false,
            coordinator: None,
            reporter: Arc::new(LogReporter),
            operation: None,
            changes: 0,
            tasks: Vec::new(),
        }
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_coordinator(mut self, coordinator: Arc<Coordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// The target this worker operates on
    pub fn system(&self) -> &S {
        &self.system
    }

    /// Position of this worker's target in the group
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Coordinator shared with the other workers of the run, if any
    pub fn coordinator(&self) -> Option<&Coordinator> {
        self.coordinator.as_deref()
    }

    /// Whether a configuration operation is running with this context
    pub fn is_active(&self) -> bool {
        self.operation.is_some()
    }

    /// Changes accumulated by the configuration so far
    pub fn changes(&self) -> usize {
        self.changes
    }

    /// Run `f` as `operation`, restoring the previous operation afterwards
    pub(crate) fn enter<T, F>(&mut self, operation: Operation, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let previous = self.operation.replace(operation);
        let result = f(self);
        self.operation = previous;
        result
    }
}
