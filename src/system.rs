//! Local directory targets

use fanout::System;
use std::path::{Path, PathBuf};

use crate::paths;

/// A target rooted at a local directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSystem {
    name: String,
    root: PathBuf,
}

impl LocalSystem {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
        }
    }

    /// Target as written in a manifest or on the command line
    ///
    /// The name keeps the spelling the user gave; the root is expanded.
    pub fn from_target(target: &str) -> Self {
        Self::new(target, paths::expand(target))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a step path against this target's root
    pub fn resolve(&self, path: &str) -> PathBuf {
        paths::resolve(&self.root, path)
    }
}

impl System for LocalSystem {
    fn name(&self) -> String {
        self.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_target_keeps_name_and_expands_root() {
        let system = LocalSystem::from_target("~/stage/a");
        let home = dirs::home_dir().unwrap();

        assert_eq!(system.name(), "~/stage/a");
        assert_eq!(system.root(), home.join("stage").join("a"));
        assert_eq!(
            system.resolve("etc/motd"),
            home.join("stage").join("a").join("etc/motd")
        );
    }
}
