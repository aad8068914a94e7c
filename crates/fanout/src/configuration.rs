//! Configuration trait for declarative state applied to many systems
//!
//! A Configuration describes desired state. The executor clones it once per
//! target system, binds each copy to its system, and runs one of the three
//! operations on every copy in parallel.

use crate::context::Context;
use crate::types::Operation;
use anyhow::{Context as AnyhowContext, Result};
use std::fmt;
use std::marker::PhantomData;

/// An opaque handle to a target system
///
/// Handles are cloned into worker threads; they must be cheap to clone and
/// hold no live connection. Connections belong to the configuration's
/// binding, acquired in [`Configuration::bind`].
pub trait System: Clone + Send + Sync + fmt::Debug + 'static {
    /// Short, human-readable name used in logs and reports
    fn name(&self) -> String;
}

/// Core trait for configurations
///
/// Implementations provide the three `on_*` hooks; the provided `apply`,
/// `delete` and `is_applied` wrap them so tasks can be opened with the
/// context.
///
/// # Copies
///
/// The executor gives every worker its own `clone()` of the template.
/// `Clone` must therefore produce an independent value: no `Rc`/`Arc` around
/// mutable state, no open sockets or file handles. Anything live is acquired
/// after copying, in [`Configuration::bind`].
///
/// # Example
///
/// ```ignore
/// use fanout::{Configuration, Context, System};
///
/// #[derive(Debug, Clone)]
/// struct Motd { text: String }
///
/// impl Configuration for Motd {
///     type System = Host;
///
///     fn name(&self) -> String { "motd".into() }
///
///     fn on_apply(&mut self, ctx: &mut Context<Host>) -> anyhow::Result<()> {
///         ctx.task("write /etc/motd", |ctx| {
///             if ctx.system().read("/etc/motd")? != self.text {
///                 ctx.system().write("/etc/motd", &self.text)?;
///                 ctx.change(1);
///             }
///             Ok(())
///         })
///     }
///
///     fn on_delete(&mut self, ctx: &mut Context<Host>) -> anyhow::Result<()> { Ok(()) }
///
///     fn on_is_applied(&mut self, ctx: &mut Context<Host>) -> anyhow::Result<bool> {
///         Ok(ctx.system().read("/etc/motd")? == self.text)
///     }
/// }
/// ```
pub trait Configuration: Clone + Send + fmt::Debug + 'static {
    /// Kind of target this configuration applies to
    type System: System;

    /// Human-readable name of this configuration
    fn name(&self) -> String;

    /// Acquire the live binding to `system`
    ///
    /// Runs on the worker thread, after the copy was made. The executor
    /// counts a worker as started once this returns.
    fn bind(&mut self, system: &Self::System) -> Result<()> {
        let _ = system;
        Ok(())
    }

    /// Converge the system to the desired state
    fn on_apply(&mut self, ctx: &mut Context<Self::System>) -> Result<()>;

    /// Remove the desired state from the system
    fn on_delete(&mut self, ctx: &mut Context<Self::System>) -> Result<()>;

    /// Check whether the system is in the desired state
    fn on_is_applied(&mut self, ctx: &mut Context<Self::System>) -> Result<bool>;

    /// Apply and return the number of changes made
    fn apply(&mut self, ctx: &mut Context<Self::System>) -> Result<usize> {
        ctx.enter(Operation::Apply, |ctx| self.on_apply(ctx))?;
        Ok(ctx.changes())
    }

    /// Delete and return the number of changes made
    fn delete(&mut self, ctx: &mut Context<Self::System>) -> Result<usize> {
        ctx.enter(Operation::Delete, |ctx| self.on_delete(ctx))?;
        Ok(ctx.changes())
    }

    /// Whether the system is in the desired state
    fn is_applied(&mut self, ctx: &mut Context<Self::System>) -> Result<bool> {
        ctx.enter(Operation::IsApplied, |ctx| self.on_is_applied(ctx))
    }
}

/// Configuration that does nothing and is always applied
#[derive(Debug, Clone)]
pub struct Noop<S> {
    _system: PhantomData<fn() -> S>,
}

impl<S> Noop<S> {
    pub fn new() -> Self {
        Self {
            _system: PhantomData,
        }
    }
}

impl<S> Default for Noop<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: System> Configuration for Noop<S> {
    type System = S;

    fn name(&self) -> String {
        "noop".to_string()
    }

    fn on_apply(&mut self, _ctx: &mut Context<S>) -> Result<()> {
        Ok(())
    }

    fn on_delete(&mut self, _ctx: &mut Context<S>) -> Result<()> {
        Ok(())
    }

    fn on_is_applied(&mut self, _ctx: &mut Context<S>) -> Result<bool> {
        Ok(true)
    }
}

/// An ordered list of sub-configurations
///
/// Applies steps in order, deletes them in reverse order, and is applied
/// when every step is applied. The first failing step stops the operation.
#[derive(Debug, Clone)]
pub struct Sequence<C> {
    name: String,
    steps: Vec<C>,
}

impl<C> Sequence<C> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn with_steps(mut self, steps: impl IntoIterator<Item = C>) -> Self {
        self.steps.extend(steps);
        self
    }

    pub fn steps(&self) -> &[C] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl<C: Configuration> Configuration for Sequence<C> {
    type System = C::System;

    fn name(&self) -> String {
        self.name.clone()
    }

    fn bind(&mut self, system: &Self::System) -> Result<()> {
        for step in &mut self.steps {
            step.bind(system)
                .with_context(|| format!("Failed to bind {} to {}", step.name(), system.name()))?;
        }
        Ok(())
    }

    fn on_apply(&mut self, ctx: &mut Context<Self::System>) -> Result<()> {
        for step in &mut self.steps {
            step.on_apply(ctx)?;
        }
        Ok(())
    }

    fn on_delete(&mut self, ctx: &mut Context<Self::System>) -> Result<()> {
        for step in self.steps.iter_mut().rev() {
            step.on_delete(ctx)?;
        }
        Ok(())
    }

    fn on_is_applied(&mut self, ctx: &mut Context<Self::System>) -> Result<bool> {
        for step in &mut self.steps {
            if !step.on_is_applied(ctx)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
