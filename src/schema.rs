//! Manifest schema: a named group of steps applied to local targets

use anyhow::{Context, Result};
use fanout::{Group, Params, Sequence};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::Settings;
use crate::resource::Step;
use crate::system::LocalSystem;

/// A giga manifest
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Group name, shown in reports
    pub name: String,

    /// Target directories; `--target` flags replace this list
    #[serde(default)]
    pub targets: Vec<String>,

    #[serde(default)]
    pub options: ManifestOptions,

    /// Forwarded to every worker; `kwargs` fill `{{key}}` in file content
    #[serde(default)]
    pub params: Params,

    /// Applied in order, deleted in reverse
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// Per-manifest overrides of the settings defaults
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestOptions {
    pub workers: Option<usize>,
    pub synchronize: Option<bool>,
    pub fail_early: Option<bool>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManifestError {
    #[error("manifest name must not be empty")]
    EmptyName,

    #[error("manifest {0} has no steps")]
    NoSteps(String),

    #[error("manifest {0} has no targets; add `targets` or pass --target")]
    NoTargets(String),

    #[error("target {0} is listed more than once")]
    DuplicateTarget(String),
}

/// Command-line values that take precedence over the manifest
#[derive(Debug, Clone, Default)]
pub struct GroupOverrides {
    pub targets: Vec<String>,
    pub jobs: Option<usize>,
    pub synchronize: bool,
    pub fail_early: bool,
    pub verbose: bool,
}

impl Manifest {
    /// Load and validate a manifest file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read manifest: {}", path.display()))?;

        let manifest: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid manifest: {}", path.display()))?;
        manifest.validate()?;

        Ok(manifest)
    }

    /// Check the manifest alone; targets may still come from the command line
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.name.trim().is_empty() {
            return Err(ManifestError::EmptyName);
        }
        if self.steps.is_empty() {
            return Err(ManifestError::NoSteps(self.name.clone()));
        }
        Ok(())
    }

    /// Build the executor group
    ///
    /// Flags win over the manifest, which wins over settings.
    pub fn into_group(
        self,
        overrides: &GroupOverrides,
        settings: &Settings,
    ) -> Result<Group<Sequence<Step>>> {
        let targets = if overrides.targets.is_empty() {
            self.targets
        } else {
            overrides.targets.clone()
        };

        if targets.is_empty() {
            return Err(ManifestError::NoTargets(self.name).into());
        }
        let mut seen = HashSet::new();
        for target in &targets {
            if !seen.insert(target.as_str()) {
                return Err(ManifestError::DuplicateTarget(target.clone()).into());
            }
        }

        let synchronize = overrides.synchronize
            || self
                .options
                .synchronize
                .unwrap_or(settings.defaults.synchronize);
        let fail_early = overrides.fail_early
            || self
                .options
                .fail_early
                .unwrap_or(settings.defaults.fail_early);
        let workers = overrides
            .jobs
            .or(self.options.workers)
            .or(settings.defaults.workers);

        let systems: Vec<LocalSystem> = targets
            .iter()
            .map(|target| LocalSystem::from_target(target))
            .collect();
        let config = Sequence::new(self.name).with_steps(self.steps);

        let mut group = Group::new(config, systems)
            .with_synchronize(synchronize)
            .with_fail_early(fail_early)
            .with_verbose(overrides.verbose)
            .with_params(self.params);
        if let Some(workers) = workers {
            group = group.with_workers(workers);
        }

        Ok(group)
    }
}
