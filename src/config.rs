//! User settings loaded from `config.toml` in the config directory

use anyhow::{Context, Result};
use fanout::ExecutorOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::paths;

/// Floor for the startup poll interval
const MIN_START_INTERVAL_MS: u64 = 1;

/// Effective giga settings
///
/// Every field is optional in the file; a missing file yields defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Executor timing
    pub executor: ExecutorSettings,

    /// Defaults for groups, overridden by manifests and flags
    pub defaults: GroupDefaults,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// How long workers may take to bind to their target
    pub threads_start_timeout_ms: u64,
    /// Poll interval while waiting for workers
    pub threads_start_interval_ms: u64,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        let options = ExecutorOptions::default();
        Self {
            threads_start_timeout_ms: duration_ms(options.threads_start_timeout),
            threads_start_interval_ms: duration_ms(options.threads_start_interval),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupDefaults {
    /// Cap on pool size; unset means one worker per target
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    pub synchronize: bool,
    pub fail_early: bool,
}

impl Settings {
    /// Load settings from the resolved config directory
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_file()?)
    }

    /// Load settings from `path`, falling back to defaults when it is missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read settings file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Invalid TOML format in {}", path.display()))
    }

    /// Executor options derived from these settings
    pub fn executor_options(&self) -> ExecutorOptions {
        ExecutorOptions {
            threads_start_timeout: Duration::from_millis(self.executor.threads_start_timeout_ms),
            threads_start_interval: Duration::from_millis(
                self.executor
                    .threads_start_interval_ms
                    .max(MIN_START_INTERVAL_MS),
            ),
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize settings")
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let settings = Settings::load_from(&temp.path().join("config.toml")).unwrap();

        assert_eq!(settings, Settings::default());
        assert_eq!(settings.executor.threads_start_timeout_ms, 1000);
        assert_eq!(settings.executor.threads_start_interval_ms, 10);
        assert_eq!(settings.executor_options(), ExecutorOptions::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            r#"
[executor]
threads_start_timeout_ms = 2500

[defaults]
workers = 8
synchronize = true
"#,
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();

        assert_eq!(settings.executor.threads_start_timeout_ms, 2500);
        assert_eq!(settings.executor.threads_start_interval_ms, 10);
        assert_eq!(settings.defaults.workers, Some(8));
        assert!(settings.defaults.synchronize);
        assert!(!settings.defaults.fail_early);
        assert_eq!(
            settings.executor_options().threads_start_timeout,
            Duration::from_millis(2500)
        );
    }

    #[test]
    fn test_zero_start_interval_is_raised_to_floor() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "[executor]\nthreads_start_interval_ms = 0\n").unwrap();

        let settings = Settings::load_from(&path).unwrap();

        assert_eq!(settings.executor.threads_start_interval_ms, 0);
        assert_eq!(
            settings.executor_options().threads_start_interval,
            Duration::from_millis(1)
        );
    }

    #[test]
    fn test_invalid_file_names_the_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "[executor\n").unwrap();

        let err = Settings::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_to_toml_parses_back() {
        let settings = Settings::default();
        let text = settings.to_toml().unwrap();
        let parsed: Settings = toml::from_str(&text).unwrap();
        assert_eq!(parsed, settings);
    }
}
