//! Symlink step

use anyhow::{Context as AnyhowContext, Result, bail};
use fanout::{Configuration, Context};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::system::LocalSystem;

/// A symlink under the target root
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Symlink {
    /// Where the link is created, relative to the target root
    pub path: String,
    /// What the link points to, relative to the target root
    pub source: String,

    #[serde(skip)]
    resolved: Option<(PathBuf, PathBuf)>,
}

#[derive(Debug, PartialEq, Eq)]
enum SymlinkState {
    Missing,
    Correct,
    WrongTarget(PathBuf),
    FileExists,
}

impl Symlink {
    #[cfg(all(test, unix))]
    pub fn new(path: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
            resolved: None,
        }
    }

    /// Resolved (link, source) paths
    fn paths(&self) -> Result<(&Path, &Path)> {
        let (link, source) = self
            .resolved
            .as_ref()
            .with_context(|| format!("{} is not bound to a target", self.path))?;
        Ok((link.as_path(), source.as_path()))
    }
}

fn check_current(link: &Path, source: &Path) -> Result<SymlinkState> {
    if !link.exists() && !link.is_symlink() {
        return Ok(SymlinkState::Missing);
    }

    if !link.is_symlink() {
        return Ok(SymlinkState::FileExists);
    }

    let link_target = fs::read_link(link).context("Failed to read symlink")?;

    // Canonicalize for comparison
    let expected = source.canonicalize().unwrap_or_else(|_| source.to_path_buf());
    let actual = if link_target.is_absolute() {
        link_target.canonicalize().unwrap_or(link_target)
    } else {
        link.parent()
            .map(|p| p.join(&link_target))
            .and_then(|p| p.canonicalize().ok())
            .unwrap_or(link_target)
    };

    if expected == actual {
        Ok(SymlinkState::Correct)
    } else {
        Ok(SymlinkState::WrongTarget(actual))
    }
}

fn create_symlink(link: &Path, source: &Path) -> Result<()> {
    if !source.exists() {
        bail!("Source does not exist: {}", source.display());
    }

    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory: {}", parent.display()))?;
    }

    // Replace a link pointing elsewhere
    if link.is_symlink() {
        fs::remove_file(link)
            .with_context(|| format!("Failed to remove existing symlink: {}", link.display()))?;
    }

    #[cfg(unix)]
    std::os::unix::fs::symlink(source, link).with_context(|| {
        format!(
            "Failed to create symlink: {} -> {}",
            link.display(),
            source.display()
        )
    })?;

    #[cfg(windows)]
    {
        use std::os::windows::fs::{symlink_dir, symlink_file};

        if source.is_dir() {
            // Junctions need no admin privileges
            match junction::create(source, link) {
                Ok(()) => (),
                Err(e) => {
                    log::debug!("Junction creation failed ({e}), trying symlink_dir");
                    symlink_dir(source, link).with_context(|| {
                        format!(
                            "Failed to create directory symlink: {} -> {}",
                            link.display(),
                            source.display()
                        )
                    })?;
                }
            }
        } else {
            symlink_file(source, link).with_context(|| {
                format!(
                    "Failed to create file symlink: {} -> {}",
                    link.display(),
                    source.display()
                )
            })?;
        }
    }

    #[cfg(not(any(unix, windows)))]
    bail!("Symlinks not supported on this platform");

    Ok(())
}

impl Configuration for Symlink {
    type System = LocalSystem;

    fn name(&self) -> String {
        format!("symlink {} -> {}", self.path, self.source)
    }

    fn bind(&mut self, system: &LocalSystem) -> Result<()> {
        self.resolved = Some((system.resolve(&self.path), system.resolve(&self.source)));
        Ok(())
    }

    fn on_apply(&mut self, ctx: &mut Context<LocalSystem>) -> Result<()> {
        let (link, source) = self.paths()?;

        ctx.task(format!("link {} -> {}", self.path, self.source), |ctx| {
            match check_current(link, source)? {
                SymlinkState::Correct => {
                    ctx.change_item(0, &self.path);
                }
                SymlinkState::Missing => {
                    create_symlink(link, source)?;
                    ctx.change_item(1, &self.path);
                }
                SymlinkState::WrongTarget(actual) => {
                    log::debug!("{} points at {}, relinking", link.display(), actual.display());
                    create_symlink(link, source)?;
                    ctx.change_item(1, &self.path);
                }
                SymlinkState::FileExists => {
                    bail!(
                        "Refusing to replace {} with a symlink: a file exists there",
                        link.display()
                    );
                }
            }
            Ok(())
        })
    }

    fn on_delete(&mut self, ctx: &mut Context<LocalSystem>) -> Result<()> {
        let (link, _) = self.paths()?;

        ctx.task(format!("unlink {}", self.path), |ctx| {
            if link.is_symlink() {
                fs::remove_file(link)
                    .with_context(|| format!("Failed to remove symlink: {}", link.display()))?;
                ctx.change_item(1, &self.path);
            }
            Ok(())
        })
    }

    fn on_is_applied(&mut self, _ctx: &mut Context<LocalSystem>) -> Result<bool> {
        let (link, source) = self.paths()?;
        Ok(check_current(link, source)? == SymlinkState::Correct)
    }
}
