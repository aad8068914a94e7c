//! Test doubles shared by the unit tests of this crate

use crate::configuration::System;
use crate::context::Reporter;
use crate::task::TaskLine;
use crate::types::Failure;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestSystem {
    name: String,
}

impl TestSystem {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl System for TestSystem {
    fn name(&self) -> String {
        self.name.clone()
    }
}

/// `host-0` .. `host-{n-1}`
pub fn systems(n: usize) -> Vec<TestSystem> {
    (0..n).map(|i| TestSystem::new(&format!("host-{i}"))).collect()
}

/// Reporter keeping everything it receives
#[derive(Default)]
pub struct RecordingReporter {
    lines: Mutex<Vec<TaskLine>>,
    completed: Mutex<Vec<(String, usize, bool)>>,
}

impl RecordingReporter {
    pub fn lines(&self) -> Vec<TaskLine> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// (system, index, failed) per finished worker, in completion order
    pub fn completed(&self) -> Vec<(String, usize, bool)> {
        self.completed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Reporter for RecordingReporter {
    fn on_task(&self, _system: &str, line: &TaskLine) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.clone());
    }

    fn on_complete(&self, system: &str, index: usize, failure: Option<&Failure>) {
        self.completed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((system.to_string(), index, failure.is_some()));
    }
}
