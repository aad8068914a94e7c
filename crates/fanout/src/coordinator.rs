//! Barrier coordination between the workers of one executor run
//!
//! Every worker of a run holds the same [`Coordinator`]. When the group asks
//! for synchronization, each task a worker opens checks in here first and
//! blocks until every worker that is still alive has checked in too. The
//! executor opens the barrier with [`Coordinator::coordinate`] once all
//! workers started, and can release everybody at any point with
//! [`Coordinator::cancel`].

use crate::error::{Error, Result};
use crate::types::Failure;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct State {
    /// Workers in this run
    expected: usize,
    started: usize,
    finished: usize,
    failed: usize,
    /// Workers waiting at the current synchronization point
    arrived: usize,
    /// Bumped every time a synchronization point is released
    generation: u64,
    /// Set by `coordinate()`; no barrier releases before that
    open: bool,
    cancelled: bool,
    failures: Vec<(usize, Failure)>,
}

impl State {
    /// Workers that started and have not finished yet
    fn alive(&self) -> usize {
        self.started.saturating_sub(self.finished)
    }

    fn try_release(&mut self) -> bool {
        if self.open && self.arrived > 0 && self.arrived >= self.alive() {
            self.arrived = 0;
            self.generation += 1;
            true
        } else {
            false
        }
    }

    fn settled(&self, fail_early: bool) -> bool {
        self.cancelled || self.finished >= self.expected || (fail_early && self.failed > 0)
    }
}

/// Shared synchronization object for the workers of one run
#[derive(Debug)]
pub struct Coordinator {
    synchronize: bool,
    fail_early: bool,
    verbose: bool,
    state: Mutex<State>,
    changed: Condvar,
}

impl Coordinator {
    /// Create a coordinator for `expected` workers
    ///
    /// Synchronization is off until enabled with [`Coordinator::with_synchronize`].
    pub fn new(expected: usize) -> Self {
        Self {
            synchronize: false,
            fail_early: false,
            verbose: false,
            state: Mutex::new(State {
                expected,
                ..State::default()
            }),
            changed: Condvar::new(),
        }
    }

    pub fn with_synchronize(mut self, synchronize: bool) -> Self {
        self.synchronize = synchronize;
        self
    }

    pub fn with_fail_early(mut self, fail_early: bool) -> Self {
        self.fail_early = fail_early;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn synchronize(&self) -> bool {
        self.synchronize
    }

    pub fn fail_early(&self) -> bool {
        self.fail_early
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    // Worker side never fails on a poisoned lock; the counters stay usable.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark worker `index` as started (its configuration is bound)
    pub fn register(&self, index: usize) {
        let mut state = self.lock();
        state.started += 1;
        log::trace!(
            "worker {index} started ({}/{})",
            state.started,
            state.expected
        );
    }

    /// Mark worker `index` as finished, recording its failure if any
    ///
    /// A finished worker no longer counts towards the barrier, so peers
    /// already waiting may be released.
    pub fn finish(&self, index: usize, failure: Option<Failure>) {
        let mut state = self.lock();
        state.finished += 1;

        if let Some(failure) = failure {
            log::debug!("worker {index} failed: {failure}");
            state.failed += 1;
            state.failures.push((index, failure));
        }

        if state.try_release() {
            self.log_release(&state, "worker exit");
        }

        self.changed.notify_all();
    }

    /// Wait at a synchronization point
    ///
    /// Returns immediately when synchronization is disabled or the run was
    /// cancelled. Otherwise blocks until every alive worker checked in.
    pub fn check_in(&self, index: usize, label: &str) {
        if !self.synchronize {
            return;
        }

        let mut state = self.lock();
        if state.cancelled {
            return;
        }

        state.arrived += 1;
        if state.try_release() {
            self.log_release(&state, label);
            self.changed.notify_all();
            return;
        }

        log::trace!(
            "worker {index} waiting at '{label}' ({}/{})",
            state.arrived,
            state.alive()
        );

        let generation = state.generation;
        let _state = self
            .changed
            .wait_while(state, |s| s.generation == generation && !s.cancelled)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Open the barrier and block until the run settles
    ///
    /// The run is settled when every worker finished, when the coordinator
    /// was cancelled, or, with `fail_early`, as soon as one worker failed.
    pub fn coordinate(&self) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| Error::Coordination("coordinator state poisoned".to_string()))?;

        state.open = true;
        if state.try_release() {
            self.log_release(&state, "open");
            self.changed.notify_all();
        }

        let state = self
            .changed
            .wait_while(state, |s| !s.settled(self.fail_early))
            .map_err(|_| Error::Coordination("coordinator state poisoned".to_string()))?;

        log::debug!(
            "coordination settled: {} finished, {} failed, cancelled={}",
            state.finished,
            state.failed,
            state.cancelled
        );

        Ok(())
    }

    /// Release every blocked worker and disable further synchronization
    pub fn cancel(&self) {
        let mut state = self.lock();
        if !state.cancelled {
            log::debug!(
                "cancelling coordination ({} alive, {} waiting)",
                state.alive(),
                state.arrived
            );
            state.cancelled = true;
        }
        self.changed.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    /// Number of workers that started so far
    pub fn started(&self) -> usize {
        self.lock().started
    }

    /// Number of workers that finished so far
    pub fn finished(&self) -> usize {
        self.lock().finished
    }

    /// Number of workers that failed so far
    pub fn failed(&self) -> usize {
        self.lock().failed
    }

    /// Failures recorded so far, by worker index
    pub fn failures(&self) -> Vec<(usize, Failure)> {
        self.lock().failures.clone()
    }

    fn log_release(&self, state: &State, label: &str) {
        if self.verbose {
            log::info!(
                "synchronization point {} released at '{label}'",
                state.generation
            );
        } else {
            log::debug!(
                "synchronization point {} released at '{label}'",
                state.generation
            );
        }
    }
}
