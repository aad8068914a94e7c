//! Bounded worker pool running one function over a list of items
//!
//! The pool is driven from a background thread so the caller stays free to
//! watch startup and drive coordination while the workers run.

use crate::error::{Error, Result};
use crate::types::{Failure, Outcome};
use rayon::prelude::*;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

/// Run `f`, turning an error or a panic into a [`Failure`]
pub fn capture<T, F>(f: F) -> Outcome<T>
where
    F: FnOnce() -> anyhow::Result<T>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Outcome::Success(value),
        Ok(Err(err)) => Outcome::Failure(Failure::from_error(&err)),
        Err(payload) => Outcome::Failure(Failure::from_panic(payload.as_ref())),
    }
}

/// A fixed-size pool of worker threads
#[derive(Debug, Clone, Copy)]
pub struct ThreadPool {
    workers: usize,
}

impl ThreadPool {
    pub fn new(workers: usize) -> Self {
        Self { workers }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Map `f` over `items` in the background
    ///
    /// Each item runs as its own job, so at most `workers` items run at once
    /// and the rest wait for a free thread. Results keep the order of
    /// `items`.
    pub fn spawn<I, T, F>(&self, f: F, items: Vec<I>) -> Result<PoolRun<T>>
    where
        I: Send + 'static,
        T: Send + 'static,
        F: Fn(I) -> T + Send + Sync + 'static,
    {
        if self.workers == 0 {
            return Err(Error::Pool("pool needs at least one worker".to_string()));
        }

        let workers = self.workers;
        let count = items.len();

        let handle = thread::Builder::new()
            .name("fanout-pool".to_string())
            .spawn(move || -> Result<Vec<T>> {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .thread_name(|i| format!("fanout-worker-{i}"))
                    .build()
                    .map_err(|e| Error::Pool(format!("Failed to create thread pool: {e}")))?;

                log::debug!("pool running {count} items on {workers} workers");

                Ok(pool.install(|| {
                    items
                        .into_par_iter()
                        .with_max_len(1)
                        .map(&f)
                        .collect::<Vec<T>>()
                }))
            })
            .map_err(|e| Error::Pool(format!("Failed to spawn pool driver: {e}")))?;

        Ok(PoolRun {
            handle,
            len: count,
        })
    }
}

/// Handle to a running pool
///
/// Results are only reachable through [`PoolRun::join`].
pub struct PoolRun<T> {
    handle: JoinHandle<Result<Vec<T>>>,
    len: usize,
}

impl<T> PoolRun<T> {
    /// Whether the driver thread is still running
    pub fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Number of items submitted
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Wait for every item and return the results in item order
    pub fn join(self) -> Result<Vec<T>> {
        match self.handle.join() {
            Ok(results) => results,
            Err(payload) => {
                let failure = Failure::from_panic(payload.as_ref());
                Err(Error::Pool(format!("pool driver panicked: {}", failure.message)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_results_keep_item_order() {
        // Later items finish first
        let run = ThreadPool::new(4)
            .spawn(
                |i: u64| {
                    thread::sleep(Duration::from_millis(40 - i * 10));
                    i * 2
                },
                vec![0, 1, 2, 3],
            )
            .unwrap();

        assert_eq!(run.len(), 4);
        assert_eq!(run.join().unwrap(), vec![0, 2, 4, 6]);
    }

    #[test]
    fn test_parallelism_is_bounded_by_workers() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let run = {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            ThreadPool::new(2)
                .spawn(
                    move |_: usize| {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(20));
                        running.fetch_sub(1, Ordering::SeqCst);
                    },
                    (0..6).collect(),
                )
                .unwrap()
        };

        assert_eq!(run.join().unwrap().len(), 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_is_alive_while_items_run() {
        let run = ThreadPool::new(1)
            .spawn(|_: ()| thread::sleep(Duration::from_millis(100)), vec![()])
            .unwrap();

        assert!(run.is_alive());
        run.join().unwrap();
    }

    #[test]
    fn test_capture_converts_errors_and_panics() {
        assert_eq!(capture(|| Ok(7)), Outcome::Success(7));

        let failed: Outcome<()> = capture(|| anyhow::bail!("boom"));
        assert_eq!(failed.failure().unwrap().message, "boom");

        let panicked: Outcome<()> = capture(|| panic!("kaboom"));
        let failure = panicked.failure().unwrap();
        assert_eq!(failure.kind, crate::FailureKind::Panic);
        assert_eq!(failure.message, "kaboom");
    }

    #[test]
    fn test_panicking_function_fails_the_pool() {
        let run = ThreadPool::new(2)
            .spawn(
                |i: usize| {
                    if i == 1 {
                        panic!("uncaught");
                    }
                    i
                },
                vec![0, 1, 2],
            )
            .unwrap();

        assert!(matches!(run.join(), Err(Error::Pool(_))));
    }

    #[test]
    fn test_zero_workers_is_rejected() {
        let result = ThreadPool::new(0).spawn(|i: usize| i, vec![1]);
        assert!(matches!(result, Err(Error::Pool(_))));
    }
}
