//! Error types for parallel configuration execution.
//!
//! Only systemic failures are errors. A configuration that fails on one
//! target is reported as [`Failure`](crate::Failure) data in the result list.

use std::time::Duration;
use thiserror::Error;

/// Systemic errors raised by the executor and its collaborators.
#[derive(Debug, Error)]
pub enum Error {
    /// A task was opened outside an apply, delete or is_applied call
    #[error("task '{task}' opened outside of an apply, delete or is_applied call")]
    ConfigContext {
        /// Message of the offending task
        task: String,
    },

    /// Not every worker acquired its system binding in time
    #[error("only {started} of {expected} workers started within {timeout:?}")]
    StartupTimeout {
        started: usize,
        expected: usize,
        timeout: Duration,
    },

    /// The barrier protocol could not be driven to completion
    #[error("coordination failed: {0}")]
    Coordination(String),

    /// The worker pool could not be started or did not terminate cleanly
    #[error("thread pool failed: {0}")]
    Pool(String),

    /// The group cannot be executed as described
    #[error("invalid group: {0}")]
    InvalidGroup(String),
}

impl Error {
    /// Variant name, used to label captured failures
    pub fn variant(&self) -> &'static str {
        match self {
            Self::ConfigContext { .. } => "ConfigContext",
            Self::StartupTimeout { .. } => "StartupTimeout",
            Self::Coordination(_) => "Coordination",
            Self::Pool(_) => "Pool",
            Self::InvalidGroup(_) => "InvalidGroup",
        }
    }
}

/// Result alias for fanout operations
pub type Result<T, E = Error> = std::result::Result<T, E>;
