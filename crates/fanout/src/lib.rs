//! # Fanout
//!
//! Apply one declarative configuration to many systems in parallel.
//!
//! The crate clones a configuration template once per target system, runs
//! every copy on its own worker, and hands back one result per system in the
//! order the systems were given.
//!
//! ## Core Concepts
//!
//! - **Configuration**: desired state with `apply`, `delete` and `is_applied`
//! - **System**: an opaque, cheaply cloned handle to a target
//! - **Task**: a scoped, change-tracking unit of work inside an operation
//! - **Coordinator**: barrier letting workers start each task together
//! - **Executor**: drives the pool, startup, coordination and joining
//!
//! ## Example
//!
//! ```ignore
//! use fanout::{Configuration, Context, Executor, Group, Outcome, System};
//!
//! #[derive(Debug, Clone)]
//! struct Host(String);
//!
//! impl System for Host {
//!     fn name(&self) -> String { self.0.clone() }
//! }
//!
//! #[derive(Debug, Clone)]
//! struct Hello;
//!
//! impl Configuration for Hello {
//!     type System = Host;
//!
//!     fn name(&self) -> String { "hello".into() }
//!
//!     fn on_apply(&mut self, ctx: &mut Context<Host>) -> anyhow::Result<()> {
//!         ctx.task("say hello", |ctx| {
//!             ctx.increment();
//!             Ok(())
//!         })
//!     }
//!
//!     fn on_delete(&mut self, _ctx: &mut Context<Host>) -> anyhow::Result<()> { Ok(()) }
//!
//!     fn on_is_applied(&mut self, _ctx: &mut Context<Host>) -> anyhow::Result<bool> { Ok(true) }
//! }
//!
//! let hosts = vec![Host("a".into()), Host("b".into())];
//! let group = Group::new(Hello, hosts).with_synchronize(true);
//!
//! let results = Executor::new().apply(&group)?;
//! assert_eq!(results, vec![Outcome::Success(1), Outcome::Success(1)]);
//! ```
//!
//! ## Failures
//!
//! A configuration that errors or panics on one system shows up as
//! [`Outcome::Failure`] at that system's position. Only systemic problems
//! (startup timeout, broken coordination, pool failure, invalid group) are
//! returned as [`Error`].

pub mod configuration;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod group;
pub mod pool;
pub mod task;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export main types at crate root
pub use configuration::{Configuration, Noop, Sequence, System};
pub use context::{Context, LogReporter, NoReport, Reporter};
pub use coordinator::Coordinator;
pub use error::{Error, Result};
pub use executor::{Executor, ExecutorOptions, Phase};
pub use group::Group;
pub use pool::{PoolRun, ThreadPool, capture};
pub use task::{TaskItem, TaskLine, TaskStatus};
pub use types::{Failure, FailureKind, Operation, Outcome, Params, RunSummary};
