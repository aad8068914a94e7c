//! A configuration template paired with the targets it is applied to

use crate::configuration::Configuration;
use crate::types::Params;

/// One configuration, many systems
///
/// The executor clones `config` once per system; the template itself is
/// never run.
#[derive(Debug, Clone)]
pub struct Group<C: Configuration> {
    config: C,
    systems: Vec<C::System>,
    workers: Option<usize>,
    synchronize: bool,
    fail_early: bool,
    verbose: bool,
    params: Params,
}

impl<C: Configuration> Group<C> {
    pub fn new(config: C, systems: Vec<C::System>) -> Self {
        Self {
            config,
            systems,
            workers: None,
            synchronize: false,
            fail_early: false,
            verbose: false,
            params: Params::default(),
        }
    }

    /// Cap the pool size; by default every system gets its own worker
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Make every task a synchronization point across workers
    pub fn with_synchronize(mut self, synchronize: bool) -> Self {
        self.synchronize = synchronize;
        self
    }

    /// Stop coordinating as soon as one worker fails
    pub fn with_fail_early(mut self, fail_early: bool) -> Self {
        self.fail_early = fail_early;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.params = self.params.with_arg(arg);
        self
    }

    pub fn with_kwarg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params = self.params.with_kwarg(key, value);
        self
    }

    /// The configuration template
    pub fn config(&self) -> &C {
        &self.config
    }

    pub fn systems(&self) -> &[C::System] {
        &self.systems
    }

    /// Number of pool workers, one per system unless capped
    pub fn workers(&self) -> usize {
        self.workers.unwrap_or(self.systems.len())
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

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::{Noop, System};
    use crate::testing::{TestSystem, systems};

    #[test]
    fn test_defaults() {
        let group = Group::new(Noop::<TestSystem>::new(), systems(3));

        assert_eq!(group.len(), 3);
        assert_eq!(group.workers(), 3);
        assert!(!group.synchronize());
        assert!(!group.fail_early());
        assert!(!group.verbose());
        assert!(group.params().is_empty());
    }

    #[test]
    fn test_builders() {
        let group = Group::new(Noop::<TestSystem>::new(), systems(4))
            .with_workers(2)
            .with_synchronize(true)
            .with_fail_early(true)
            .with_arg("--fast")
            .with_kwarg("env", "prod");

        assert_eq!(group.workers(), 2);
        assert!(group.synchronize());
        assert!(group.fail_early());
        assert_eq!(group.params().arg(0), Some("--fast"));
        assert_eq!(group.params().get("env"), Some("prod"));
        assert_eq!(group.systems()[3].name(), "host-3");
    }

    #[test]
    fn test_empty_group_has_no_workers() {
        let group = Group::new(Noop::<TestSystem>::new(), Vec::new());
        assert!(group.is_empty());
        assert_eq!(group.workers(), 0);
    }
}
