//! Shell command step

use anyhow::Result;
use fanout::{Configuration, Context};
use serde::Deserialize;
use std::path::PathBuf;

use super::bound;
use crate::runner;
use crate::system::LocalSystem;

/// A shell command run in the target root
///
/// Without `creates` the command runs on every apply and the step never
/// counts as applied.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShellCommand {
    /// Script passed to the shell
    pub run: String,

    /// Marker path, relative to the target root; the step is applied when it exists
    #[serde(default)]
    pub creates: Option<String>,

    /// Script undoing `run`
    #[serde(default)]
    pub remove: Option<String>,

    #[serde(skip)]
    root: Option<PathBuf>,

    #[serde(skip)]
    marker: Option<PathBuf>,
}

impl ShellCommand {
    #[cfg(all(test, unix))]
    pub fn new(run: impl Into<String>) -> Self {
        Self {
            run: run.into(),
            creates: None,
            remove: None,
            root: None,
            marker: None,
        }
    }

    #[cfg(all(test, unix))]
    pub fn with_creates(mut self, creates: impl Into<String>) -> Self {
        self.creates = Some(creates.into());
        self
    }

    #[cfg(all(test, unix))]
    pub fn with_remove(mut self, remove: impl Into<String>) -> Self {
        self.remove = Some(remove.into());
        self
    }

    fn marker_exists(&self) -> bool {
        self.marker.as_ref().is_some_and(|marker| marker.exists())
    }
}

impl Configuration for ShellCommand {
    type System = LocalSystem;

    fn name(&self) -> String {
        format!("command {}", self.run)
    }

    fn bind(&mut self, system: &LocalSystem) -> Result<()> {
        self.root = Some(system.root().to_path_buf());
        self.marker = self.creates.as_deref().map(|creates| system.resolve(creates));
        Ok(())
    }

    fn on_apply(&mut self, ctx: &mut Context<LocalSystem>) -> Result<()> {
        let root = bound(&self.root, &self.run)?;
        let done = self.marker_exists();

        ctx.task(format!("run {}", self.run), |ctx| {
            if done {
                ctx.change_item(0, &self.run);
                return Ok(());
            }

            let output = runner::run_shell(&self.run, root)?;
            if !output.is_empty() {
                log::debug!("[{}] {output}", ctx.system().root().display());
            }
            ctx.change_item(1, &self.run);
            Ok(())
        })
    }

    fn on_delete(&mut self, ctx: &mut Context<LocalSystem>) -> Result<()> {
        let root = bound(&self.root, &self.run)?;
        // Nothing to undo when the marker says the command never ran
        let never_ran = self.creates.is_some() && !self.marker_exists();
        let remove = self.remove.as_deref().filter(|_| !never_ran);
        let message = match self.remove.as_deref() {
            Some(remove) => format!("run {remove}"),
            None => format!("undo {}", self.run),
        };

        // Opened on every target, skipped or not, to keep barrier check-ins aligned
        ctx.task(message, |ctx| {
            let Some(remove) = remove else {
                ctx.change_item(0, &self.run);
                return Ok(());
            };

            runner::run_shell(remove, root)?;
            ctx.change_item(1, remove);
            Ok(())
        })
    }

    fn on_is_applied(&mut self, _ctx: &mut Context<LocalSystem>) -> Result<bool> {
        bound(&self.root, &self.run)?;
        Ok(self.marker_exists())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::resource::tests::context;
    use crate::resource::{Directory, Step};
    use fanout::{Executor, Group, Outcome, Reporter, Sequence, TaskLine};
    use std::sync::{Arc, Mutex};
    use std::time::Instant;
    use tempfile::TempDir;

    fn bound_command(temp: &TempDir, command: ShellCommand) -> ShellCommand {
        let mut command = command;
        command
            .bind(&LocalSystem::new("test", temp.path()))
            .unwrap();
        command
    }

    #[test]
    fn test_creates_marker_skips_second_run() {
        let temp = TempDir::new().unwrap();
        let mut cmd = bound_command(
            &temp,
            ShellCommand::new("mkdir -p bin && echo ok > bin/app && echo x >> runs")
                .with_creates("bin/app"),
        );

        assert!(!cmd.is_applied(&mut context(&temp)).unwrap());
        assert_eq!(cmd.apply(&mut context(&temp)).unwrap(), 1);
        assert!(cmd.is_applied(&mut context(&temp)).unwrap());
        assert_eq!(cmd.apply(&mut context(&temp)).unwrap(), 0);

        let runs = std::fs::read_to_string(temp.path().join("runs")).unwrap();
        assert_eq!(runs.lines().count(), 1);
    }

    #[test]
    fn test_without_marker_runs_every_time_and_never_applied() {
        let temp = TempDir::new().unwrap();
        let mut cmd = bound_command(&temp, ShellCommand::new("echo x >> runs"));

        assert_eq!(cmd.apply(&mut context(&temp)).unwrap(), 1);
        assert_eq!(cmd.apply(&mut context(&temp)).unwrap(), 1);
        assert!(!cmd.is_applied(&mut context(&temp)).unwrap());
    }

    #[test]
    fn test_delete_runs_remove_only_when_applied() {
        let temp = TempDir::new().unwrap();
        let mut cmd = bound_command(
            &temp,
            ShellCommand::new("touch marker")
                .with_creates("marker")
                .with_remove("rm marker"),
        );

        assert_eq!(cmd.delete(&mut context(&temp)).unwrap(), 0);

        cmd.apply(&mut context(&temp)).unwrap();
        assert_eq!(cmd.delete(&mut context(&temp)).unwrap(), 1);
        assert!(!temp.path().join("marker").exists());
    }

    #[test]
    fn test_delete_without_remove_opens_a_task() {
        let temp = TempDir::new().unwrap();
        let mut cmd = bound_command(&temp, ShellCommand::new("true"));
        let timeline = Arc::new(Timeline::default());
        let mut ctx = context(&temp).with_reporter(Arc::clone(&timeline) as Arc<dyn Reporter>);

        assert_eq!(cmd.delete(&mut ctx).unwrap(), 0);
        assert_eq!(timeline.find("test", "undo true").0, 0);
    }

    /// Records every task exit with the time it happened
    #[derive(Default)]
    struct Timeline {
        lines: Mutex<Vec<(String, String, usize, Instant)>>,
    }

    impl Reporter for Timeline {
        fn on_task(&self, system: &str, line: &TaskLine) {
            self.lines.lock().unwrap().push((
                system.to_string(),
                line.message.clone(),
                line.changes,
                Instant::now(),
            ));
        }
    }

    impl Timeline {
        fn find(&self, system: &str, message: &str) -> (usize, Instant) {
            let lines = self.lines.lock().unwrap();
            let (_, _, changes, at) = lines
                .iter()
                .find(|(s, m, _, _)| s == system && m == message)
                .unwrap_or_else(|| panic!("no task {message} on {system}: {lines:?}"));
            (*changes, *at)
        }
    }

    #[test]
    fn test_synchronized_delete_keeps_skipping_target_in_step() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        for root in [&a, &b] {
            std::fs::create_dir(root.path().join("etc")).unwrap();
        }
        std::fs::write(a.path().join("marker"), "").unwrap();

        let steps = vec![
            Step::Directory(Directory::new("etc")),
            Step::Command(
                ShellCommand::new("touch marker")
                    .with_creates("marker")
                    .with_remove("sleep 0.3 && rm marker"),
            ),
        ];
        let systems = vec![
            LocalSystem::new("a", a.path()),
            LocalSystem::new("b", b.path()),
        ];
        let group =
            Group::new(Sequence::new("sync").with_steps(steps), systems).with_synchronize(true);

        let timeline = Arc::new(Timeline::default());
        let results = Executor::new()
            .with_reporter(Arc::clone(&timeline) as Arc<dyn Reporter>)
            .delete(&group)
            .unwrap();

        assert_eq!(results, vec![Outcome::Success(2), Outcome::Success(1)]);

        let (changes, a_remove) = timeline.find("a", "run sleep 0.3 && rm marker");
        assert_eq!(changes, 1);
        let (changes, _) = timeline.find("b", "run sleep 0.3 && rm marker");
        assert_eq!(changes, 0);

        // b waits at the directory barrier until a has finished its command
        let (_, b_dir) = timeline.find("b", "remove directory etc");
        assert!(b_dir >= a_remove);
        assert!(!a.path().join("marker").exists());
        assert!(!b.path().join("etc").exists());
    }

    #[test]
    fn test_failing_command_fails_the_step() {
        let temp = TempDir::new().unwrap();
        let mut cmd = bound_command(&temp, ShellCommand::new("exit 1"));

        assert!(cmd.apply(&mut context(&temp)).is_err());
    }
}
