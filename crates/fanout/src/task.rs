//! Scoped, change-tracking units of work
//!
//! A task is opened with [`Context::task`] inside a configuration operation.
//! Tasks nest with strict stack discipline: a child always exits before its
//! parent, and the frame is popped even when the body fails or panics.

use crate::configuration::System;
use crate::context::Context;
use crate::error::Error;
use anyhow::Result;
use serde::Serialize;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// Final state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// The task changed something
    Changed,
    /// Nothing to do
    Ok,
    /// The task body failed
    Error,
}

impl TaskStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Changed => "(change)",
            Self::Ok => "(ok)",
            Self::Error => "(error)",
        }
    }
}

/// One item recorded by a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskItem {
    pub item: String,
    pub changed: bool,
}

/// Trace record emitted when a task exits
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskLine {
    /// Nesting depth, 0 for outermost tasks
    pub depth: usize,
    pub status: TaskStatus,
    pub message: String,
    pub changes: usize,
    pub items: Vec<TaskItem>,
    /// Whether the itemized breakdown should be rendered
    pub verbose: bool,
}

impl fmt::Display for TaskLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let indent = "  ".repeat(self.depth);
        write!(f, "{indent}{} {}", self.status.label(), self.message)?;

        if self.verbose {
            for item in &self.items {
                let marker = if item.changed { "+" } else { "=" };
                write!(f, "\n{indent}    {marker} {}", item.item)?;
            }
        }

        Ok(())
    }
}

/// A task on the context's stack
#[derive(Debug)]
pub(crate) struct TaskFrame {
    pub(crate) message: String,
    pub(crate) changes: usize,
    pub(crate) items: Vec<TaskItem>,
}

impl TaskFrame {
    fn new(message: String) -> Self {
        Self {
            message,
            changes: 0,
            items: Vec::new(),
        }
    }
}

impl<S: System> Context<S> {
    /// Run `f` as a task described by `message`
    ///
    /// Fails with [`Error::ConfigContext`] when no configuration operation is
    /// running. With synchronization enabled, checks in with the coordinator
    /// before running the body, so peers start the task together.
    pub fn task<T, F>(&mut self, message: impl Into<String>, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let message = message.into();
        if !self.is_active() {
            return Err(Error::ConfigContext { task: message }.into());
        }

        self.tasks.push(TaskFrame::new(message));
        if let (Some(coordinator), Some(frame)) = (&self.coordinator, self.tasks.last()) {
            coordinator.check_in(self.index, &frame.message);
        }

        let result = panic::catch_unwind(AssertUnwindSafe(|| f(self)));
        self.exit_task(!matches!(result, Ok(Ok(_))));

        match result {
            Ok(result) => result,
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    /// Add `count` changes to the current task and return its new total
    ///
    /// Outside of any task the changes go to the configuration's total.
    pub fn change(&mut self, count: usize) -> usize {
        match self.tasks.last_mut() {
            Some(task) => {
                task.changes += count;
                task.changes
            }
            None => {
                self.changes += count;
                self.changes
            }
        }
    }

    /// Add `count` changes attributed to `item`
    pub fn change_item(&mut self, count: usize, item: impl Into<String>) -> usize {
        let total = self.change(count);
        self.record_item(item.into(), count > 0);
        total
    }

    /// Shorthand for `change(1)`
    pub fn increment(&mut self) -> usize {
        self.change(1)
    }

    /// Run `f` and attribute the changes it makes to `item`
    ///
    /// The item is recorded exactly once, also when `f` fails.
    pub fn item<T, F>(&mut self, item: impl Into<String>, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let item = item.into();
        let before = self.current_changes();

        let result = panic::catch_unwind(AssertUnwindSafe(|| f(self)));
        let changed = self.current_changes() > before;
        self.record_item(item, changed);

        match result {
            Ok(result) => result,
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    /// Changes of the innermost open task, if any
    pub fn task_changes(&self) -> Option<usize> {
        self.tasks.last().map(|task| task.changes)
    }

    /// Number of open tasks
    pub fn task_depth(&self) -> usize {
        self.tasks.len()
    }

    fn current_changes(&self) -> usize {
        self.task_changes().unwrap_or(self.changes)
    }

    fn record_item(&mut self, item: String, changed: bool) {
        if let Some(task) = self.tasks.last_mut() {
            task.items.push(TaskItem { item, changed });
        }
    }

    fn exit_task(&mut self, failed: bool) {
        let Some(frame) = self.tasks.pop() else {
            return;
        };

        match self.tasks.last_mut() {
            Some(parent) => parent.changes += frame.changes,
            None => self.changes += frame.changes,
        }

        let status = if failed {
            TaskStatus::Error
        } else if frame.changes > 0 {
            TaskStatus::Changed
        } else {
            TaskStatus::Ok
        };

        let line = TaskLine {
            depth: self.tasks.len(),
            status,
            message: frame.message,
            changes: frame.changes,
            items: frame.items,
            verbose: self.verbose,
        };
        self.reporter.on_task(&self.system.name(), &line);
    }
}
