//! File step - content with `{{key}}` placeholders filled from group params

use anyhow::{Context as AnyhowContext, Result};
use fanout::{Configuration, Context, Params};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use super::bound;
use crate::system::LocalSystem;

/// A file with fixed content under the target root
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct File {
    /// Path relative to the target root
    pub path: String,

    /// Content template
    #[serde(default)]
    pub content: String,

    /// Permission bits, unix only
    #[serde(default)]
    pub mode: Option<u32>,

    #[serde(skip)]
    resolved: Option<PathBuf>,
}

impl File {
    #[cfg(test)]
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            mode: None,
            resolved: None,
        }
    }

    #[cfg(test)]
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }
}

/// Replace every `{{key}}` in `template` with the matching named param
///
/// Placeholders without a param are left in place.
pub fn render(template: &str, params: &Params) -> String {
    params
        .kwargs
        .iter()
        .fold(template.to_string(), |text, (key, value)| {
            text.replace(&format!("{{{{{key}}}}}"), value)
        })
}

fn content_matches(path: &Path, desired: &str) -> bool {
    match fs::read(path) {
        Ok(current) => blake3::hash(&current) == blake3::hash(desired.as_bytes()),
        Err(_) => false,
    }
}

/// Unified diff between what is on disk and what will be written
fn diff(path: &Path, desired: &str) -> String {
    let current = fs::read_to_string(path).unwrap_or_default();
    let name = path.display().to_string();
    similar::TextDiff::from_lines(current.as_str(), desired)
        .unified_diff()
        .header(&name, &name)
        .to_string()
}

#[cfg(unix)]
fn mode_matches(path: &Path, mode: u32) -> Result<bool> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = fs::metadata(path)
        .with_context(|| format!("Failed to read metadata: {}", path.display()))?;
    Ok(metadata.permissions().mode() & 0o7777 == mode)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .with_context(|| format!("Failed to set mode {mode:o} on {}", path.display()))
}

#[cfg(not(unix))]
fn mode_matches(_path: &Path, _mode: u32) -> Result<bool> {
    Ok(true)
}

#[cfg(not(unix))]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    log::debug!("Ignoring mode {mode:o} for {} on this platform", path.display());
    Ok(())
}

impl Configuration for File {
    type System = LocalSystem;

    fn name(&self) -> String {
        format!("file {}", self.path)
    }

    fn bind(&mut self, system: &LocalSystem) -> Result<()> {
        self.resolved = Some(system.resolve(&self.path));
        Ok(())
    }

    fn on_apply(&mut self, ctx: &mut Context<LocalSystem>) -> Result<()> {
        let path = bound(&self.resolved, &self.path)?;
        let desired = render(&self.content, ctx.params());
        let mode = self.mode;

        ctx.task(format!("write file {}", self.path), |ctx| {
            if content_matches(path, &desired) {
                ctx.change_item(0, "content");
            } else {
                if ctx.verbose() {
                    log::info!("[{}] {}", ctx.system().root().display(), diff(path, &desired));
                }

                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create parent directory: {}", parent.display())
                    })?;
                }
                fs::write(path, &desired)
                    .with_context(|| format!("Failed to write file: {}", path.display()))?;
                ctx.change_item(1, "content");
            }

            if let Some(mode) = mode
                && !mode_matches(path, mode)?
            {
                set_mode(path, mode)?;
                ctx.change_item(1, format!("mode {mode:o}"));
            }

            Ok(())
        })
    }

    fn on_delete(&mut self, ctx: &mut Context<LocalSystem>) -> Result<()> {
        let path = bound(&self.resolved, &self.path)?;

        ctx.task(format!("remove file {}", self.path), |ctx| {
            if path.is_file() {
                fs::remove_file(path)
                    .with_context(|| format!("Failed to remove file: {}", path.display()))?;
                ctx.change_item(1, &self.path);
            }
            Ok(())
        })
    }

    fn on_is_applied(&mut self, ctx: &mut Context<LocalSystem>) -> Result<bool> {
        let path = bound(&self.resolved, &self.path)?;
        let desired = render(&self.content, ctx.params());

        if !content_matches(path, &desired) {
            return Ok(false);
        }
        match self.mode {
            Some(mode) => mode_matches(path, mode),
            None => Ok(true),
        }
    }
}
