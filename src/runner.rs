use anyhow::{Context, Result};
use std::path::Path;
use std::process::Command;

/// Build a shell invocation of `script`
fn shell(script: &str) -> Command {
    #[cfg(windows)]
    {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", script]);
        cmd
    }

    #[cfg(not(windows))]
    {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script]);
        cmd
    }
}

/// Run `script` through the shell in `cwd` and capture its output
///
/// Output is captured, never inherited; workers share the terminal.
pub fn run_shell(script: &str, cwd: &Path) -> Result<String> {
    let output = shell(script)
        .current_dir(cwd)
        .output()
        .with_context(|| format!("Failed to execute: {script}"))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!(
            "Command failed ({}): {}: {}",
            output.status,
            script,
            stderr.trim()
        )
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_runs_in_working_directory() {
        let temp = TempDir::new().unwrap();
        let out = run_shell("touch marker && echo done", temp.path()).unwrap();

        assert_eq!(out, "done");
        assert!(temp.path().join("marker").exists());
    }

    #[test]
    fn test_failure_carries_stderr() {
        let temp = TempDir::new().unwrap();
        let err = run_shell("echo broken >&2; exit 3", temp.path()).unwrap_err();
        assert!(err.to_string().contains("broken"));
    }
}
