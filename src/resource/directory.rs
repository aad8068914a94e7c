//! Directory step

use anyhow::{Context as AnyhowContext, Result, bail};
use fanout::{Configuration, Context};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use walkdir::WalkDir;

use super::bound;
use crate::system::LocalSystem;

/// A directory that must exist under the target root
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Directory {
    /// Path relative to the target root
    pub path: String,

    #[serde(skip)]
    resolved: Option<PathBuf>,
}

impl Directory {
    #[cfg(test)]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            resolved: None,
        }
    }
}

impl Configuration for Directory {
    type System = LocalSystem;

    fn name(&self) -> String {
        format!("directory {}", self.path)
    }

    fn bind(&mut self, system: &LocalSystem) -> Result<()> {
        self.resolved = Some(system.resolve(&self.path));
        Ok(())
    }

    fn on_apply(&mut self, ctx: &mut Context<LocalSystem>) -> Result<()> {
        let path = bound(&self.resolved, &self.path)?;

        ctx.task(format!("create directory {}", self.path), |ctx| {
            if path.is_dir() {
                ctx.change_item(0, &self.path);
                return Ok(());
            }
            if path.exists() {
                bail!("{} exists and is not a directory", path.display());
            }

            fs::create_dir_all(path)
                .with_context(|| format!("Failed to create directory: {}", path.display()))?;
            ctx.change_item(1, &self.path);
            Ok(())
        })
    }

    fn on_delete(&mut self, ctx: &mut Context<LocalSystem>) -> Result<()> {
        let path = bound(&self.resolved, &self.path)?;

        ctx.task(format!("remove directory {}", self.path), |ctx| {
            if !path.is_dir() {
                return Ok(());
            }

            // One change per entry, the directory itself included
            let entries = WalkDir::new(path).into_iter().filter_map(|entry| entry.ok()).count();
            fs::remove_dir_all(path)
                .with_context(|| format!("Failed to remove directory: {}", path.display()))?;
            ctx.change_item(entries, &self.path);
            Ok(())
        })
    }

    fn on_is_applied(&mut self, _ctx: &mut Context<LocalSystem>) -> Result<bool> {
        Ok(bound(&self.resolved, &self.path)?.is_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::tests::context;
    use tempfile::TempDir;

    fn bound_directory(temp: &TempDir, path: &str) -> Directory {
        let mut dir = Directory::new(path);
        dir.bind(&LocalSystem::new("test", temp.path())).unwrap();
        dir
    }

    #[test]
    fn test_apply_creates_nested_directory_once() {
        let temp = TempDir::new().unwrap();
        let mut dir = bound_directory(&temp, "etc/app");

        assert!(!dir.is_applied(&mut context(&temp)).unwrap());
        assert_eq!(dir.apply(&mut context(&temp)).unwrap(), 1);
        assert!(temp.path().join("etc/app").is_dir());
        assert!(dir.is_applied(&mut context(&temp)).unwrap());

        assert_eq!(dir.apply(&mut context(&temp)).unwrap(), 0);
    }

    #[test]
    fn test_delete_counts_removed_entries() {
        let temp = TempDir::new().unwrap();
        let mut dir = bound_directory(&temp, "data");
        fs::create_dir_all(temp.path().join("data/sub")).unwrap();
        fs::write(temp.path().join("data/sub/a.txt"), "a").unwrap();
        fs::write(temp.path().join("data/b.txt"), "b").unwrap();

        // data, data/sub, data/sub/a.txt, data/b.txt
        assert_eq!(dir.delete(&mut context(&temp)).unwrap(), 4);
        assert!(!temp.path().join("data").exists());

        assert_eq!(dir.delete(&mut context(&temp)).unwrap(), 0);
    }

    #[test]
    fn test_apply_refuses_to_replace_a_file() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("etc"), "not a dir").unwrap();
        let mut dir = bound_directory(&temp, "etc");

        let err = dir.apply(&mut context(&temp)).unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }
}
