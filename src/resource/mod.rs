//! Manifest steps as configurations applied to local targets
//!
//! Every step is a [`Configuration`] over [`LocalSystem`]: paths are
//! resolved against the target root in `bind`, and each operation runs as a
//! task on the worker's context so it is tracked, traced and synchronized
//! like any other task.

use anyhow::{Context as AnyhowContext, Result, bail};
use fanout::{Configuration, Context, System};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::system::LocalSystem;

pub mod command;
pub mod directory;
pub mod file;
pub mod symlink;

pub use command::ShellCommand;
pub use directory::Directory;
pub use file::File;
pub use symlink::Symlink;

/// One step of a manifest, tagged by `type`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Step {
    Directory(Directory),
    File(File),
    Symlink(Symlink),
    Command(ShellCommand),
}

impl Step {
    /// Step type as written in manifests
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Directory(_) => "directory",
            Self::File(_) => "file",
            Self::Symlink(_) => "symlink",
            Self::Command(_) => "command",
        }
    }
}

impl Configuration for Step {
    type System = LocalSystem;

    fn name(&self) -> String {
        match self {
            Self::Directory(step) => step.name(),
            Self::File(step) => step.name(),
            Self::Symlink(step) => step.name(),
            Self::Command(step) => step.name(),
        }
    }

    fn bind(&mut self, system: &LocalSystem) -> Result<()> {
        check_root(system)?;
        log::trace!("Binding {} step to {}", self.kind(), system.name());
        match self {
            Self::Directory(step) => step.bind(system),
            Self::File(step) => step.bind(system),
            Self::Symlink(step) => step.bind(system),
            Self::Command(step) => step.bind(system),
        }
    }

    fn on_apply(&mut self, ctx: &mut Context<LocalSystem>) -> Result<()> {
        match self {
            Self::Directory(step) => step.on_apply(ctx),
            Self::File(step) => step.on_apply(ctx),
            Self::Symlink(step) => step.on_apply(ctx),
            Self::Command(step) => step.on_apply(ctx),
        }
    }

    fn on_delete(&mut self, ctx: &mut Context<LocalSystem>) -> Result<()> {
        match self {
            Self::Directory(step) => step.on_delete(ctx),
            Self::File(step) => step.on_delete(ctx),
            Self::Symlink(step) => step.on_delete(ctx),
            Self::Command(step) => step.on_delete(ctx),
        }
    }

    fn on_is_applied(&mut self, ctx: &mut Context<LocalSystem>) -> Result<bool> {
        match self {
            Self::Directory(step) => step.on_is_applied(ctx),
            Self::File(step) => step.on_is_applied(ctx),
            Self::Symlink(step) => step.on_is_applied(ctx),
            Self::Command(step) => step.on_is_applied(ctx),
        }
    }
}

/// A target root must be a directory when it exists
fn check_root(system: &LocalSystem) -> Result<()> {
    let root = system.root();
    if root.exists() && !root.is_dir() {
        bail!(
            "Target {} is not a directory: {}",
            system.name(),
            root.display()
        );
    }
    Ok(())
}

/// The path a step resolved in `bind`
fn bound<'a>(resolved: &'a Option<PathBuf>, step: &str) -> Result<&'a Path> {
    resolved
        .as_deref()
        .with_context(|| format!("{step} is not bound to a target"))
}
