//! Core types for parallel configuration execution

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

/// The configuration operation a worker runs against its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Apply,
    Delete,
    IsApplied,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Apply => "apply",
            Self::Delete => "delete",
            Self::IsApplied => "is_applied",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extra parameters forwarded to every worker call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    /// Positional arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Named arguments
    #[serde(default)]
    pub kwargs: BTreeMap<String, String>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set a named argument, replacing any previous value
    pub fn with_kwarg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    /// Positional argument at `index`
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    /// Named argument `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.kwargs.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }
}

/// How a worker failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The configuration returned an error
    Error,
    /// The configuration panicked
    Panic,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => f.write_str("error"),
            Self::Panic => f.write_str("panic"),
        }
    }
}

/// A failure captured inside a worker thread
///
/// Failures are returned as data in the executor's result list; they never
/// unwind across the worker boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    /// Type of the root cause, when it is a recognized error type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    /// Top-level error message
    pub message: String,
    /// Underlying causes, outermost first
    #[serde(default)]
    pub trace: Vec<String>,
}

impl Failure {
    /// Capture an error and its cause chain
    pub fn from_error(err: &anyhow::Error) -> Self {
        Self {
            kind: FailureKind::Error,
            error_type: root_type(err.root_cause()),
            message: err.to_string(),
            trace: err.chain().skip(1).map(ToString::to_string).collect(),
        }
    }

    /// Capture a panic payload
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "worker panicked".to_string()
        };

        Self {
            kind: FailureKind::Panic,
            error_type: None,
            message,
            trace: Vec::new(),
        }
    }
}

/// Name the type of an error, e.g. `io::NotFound`
fn root_type(root: &(dyn std::error::Error + 'static)) -> Option<String> {
    if let Some(err) = root.downcast_ref::<std::io::Error>() {
        return Some(format!("io::{:?}", err.kind()));
    }
    if let Some(err) = root.downcast_ref::<crate::Error>() {
        return Some(format!("fanout::{}", err.variant()));
    }
    if root.is::<std::num::ParseIntError>() {
        return Some("num::ParseIntError".to_string());
    }
    if root.is::<std::str::Utf8Error>() || root.is::<std::string::FromUtf8Error>() {
        return Some("utf8".to_string());
    }
    None
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind == FailureKind::Panic {
            write!(f, "panic: ")?;
        }
        write!(f, "{}", self.message)?;
        for cause in &self.trace {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

/// Result of one worker: either the operation's value or a captured failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Outcome<T> {
    Success(T),
    Failure(Failure),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(failure),
        }
    }
}

/// Aggregate view over one executor result list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Targets whose operation completed
    pub succeeded: usize,
    /// Targets whose operation failed
    pub failed: usize,
    /// Targets that reported at least one change
    pub changed: usize,
    /// Sum of changes across all targets
    pub changes: usize,
    /// Targets whose `is_applied` returned false
    pub pending: usize,
}

impl RunSummary {
    /// Summarize the results of `apply` or `delete`
    pub fn from_changes(results: &[Outcome<usize>]) -> Self {
        let mut summary = Self::default();
        for result in results {
            summary.add_change(result);
        }
        summary
    }

    /// Summarize the results of `is_applied`
    pub fn from_checks(results: &[Outcome<bool>]) -> Self {
        let mut summary = Self::default();
        for result in results {
            summary.add_check(result);
        }
        summary
    }

    pub fn add_change(&mut self, result: &Outcome<usize>) {
        match result {
            Outcome::Success(changes) => {
                self.succeeded += 1;
                self.changes += changes;
                if *changes > 0 {
                    self.changed += 1;
                }
            }
            Outcome::Failure(_) => self.failed += 1,
        }
    }

    pub fn add_check(&mut self, result: &Outcome<bool>) {
        match result {
            Outcome::Success(applied) => {
                self.succeeded += 1;
                if !applied {
                    self.pending += 1;
                }
            }
            Outcome::Failure(_) => self.failed += 1,
        }
    }

    /// Total number of targets summarized
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    /// No target failed
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// No target failed and none is pending
    pub fn is_converged(&self) -> bool {
        self.failed == 0 && self.pending == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_from_error_keeps_cause_chain() {
        let err = anyhow::anyhow!("disk full").context("write etc/motd");
        let failure = Failure::from_error(&err);

        assert_eq!(failure.kind, FailureKind::Error);
        assert_eq!(failure.error_type, None);
        assert_eq!(failure.message, "write etc/motd");
        assert_eq!(failure.trace, vec!["disk full".to_string()]);
        assert_eq!(failure.to_string(), "write etc/motd: disk full");
    }

    #[test]
    fn test_failure_from_error_names_root_type() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = anyhow::Error::new(io).context("read etc/motd");
        let failure = Failure::from_error(&err);
        assert_eq!(failure.error_type.as_deref(), Some("io::NotFound"));
        assert_eq!(failure.to_string(), "read etc/motd: no such file");

        let err = anyhow::Error::new(crate::Error::Pool("gone".into())).context("run");
        assert_eq!(
            Failure::from_error(&err).error_type.as_deref(),
            Some("fanout::Pool")
        );

        let parse = "x".parse::<u32>().unwrap_err();
        let failure = Failure::from_error(&anyhow::Error::new(parse));
        assert_eq!(failure.error_type.as_deref(), Some("num::ParseIntError"));

        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["error_type"], "num::ParseIntError");
    }

    #[test]
    fn test_failure_from_panic_payloads() {
        let static_str: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(Failure::from_panic(static_str.as_ref()).message, "boom");

        let owned: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        let failure = Failure::from_panic(owned.as_ref());
        assert_eq!(failure.kind, FailureKind::Panic);
        assert_eq!(failure.error_type, None);
        assert_eq!(failure.to_string(), "panic: owned boom");

        let other: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(Failure::from_panic(other.as_ref()).message, "worker panicked");
    }

    #[test]
    fn test_summary_from_changes() {
        let results = vec![
            Outcome::Success(2),
            Outcome::Success(0),
            Outcome::Failure(Failure::from_error(&anyhow::anyhow!("boom"))),
        ];
        let summary = RunSummary::from_changes(&results);

        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.changed, 1);
        assert_eq!(summary.changes, 2);
        assert_eq!(summary.total(), 3);
        assert!(!summary.is_success());
    }

    #[test]
    fn test_summary_from_checks() {
        let summary = RunSummary::from_checks(&[Outcome::Success(true), Outcome::Success(false)]);

        assert_eq!(summary.pending, 1);
        assert!(summary.is_success());
        assert!(!summary.is_converged());
    }

    #[test]
    fn test_params_accessors() {
        let params = Params::new().with_arg("--fast").with_kwarg("env", "prod");

        assert_eq!(params.arg(0), Some("--fast"));
        assert_eq!(params.arg(1), None);
        assert_eq!(params.get("env"), Some("prod"));
        assert!(!params.is_empty());
    }
}
