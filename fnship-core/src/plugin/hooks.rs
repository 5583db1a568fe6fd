//! User-defined shell hooks.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::Plugin;
use crate::archive::ArchiveBuilder;
use crate::error::{HookError, ShipError, ShipResult};
use crate::function::FunctionSpec;
use crate::types::Hook;

/// Runs `hooks.build`, `hooks.clean` and `hooks.deploy` through `sh -c` in
/// the function directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct HooksPlugin;

#[async_trait]
impl Plugin for HooksPlugin {
    fn name(&self) -> &str {
        "hooks"
    }

    fn hooks(&self) -> &'static [Hook] {
        &[Hook::Build, Hook::Clean, Hook::Deploy]
    }

    async fn build(&self, spec: &mut FunctionSpec, _archive: &mut ArchiveBuilder) -> ShipResult<()> {
        run(Hook::Build, &spec.config.hooks.build, &spec.path).await
    }

    async fn clean(&self, spec: &FunctionSpec) -> ShipResult<()> {
        run(Hook::Clean, &spec.config.hooks.clean, &spec.path).await
    }

    async fn deploy(&self, spec: &mut FunctionSpec) -> ShipResult<()> {
        run(Hook::Deploy, &spec.config.hooks.deploy, &spec.path).await
    }
}

/// Run `command` in `dir`. Empty commands are skipped.
pub async fn run(hook: Hook, command: &str, dir: &Path) -> ShipResult<()> {
    if command.trim().is_empty() {
        return Ok(());
    }

    debug!(hook = %hook, command = %command, "Running hook command");

    let output = shell(command)
        .current_dir(dir)
        .output()
        .await
        .map_err(|source| ShipError::Io {
            context: "spawning hook command",
            source,
        })?;

    if output.status.success() {
        return Ok(());
    }

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    Err(HookError {
        hook,
        command: command.to_string(),
        output: combined,
    }
    .into())
}

#[cfg(unix)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/c").arg(command);
    cmd
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_runs_in_function_directory() {
        let dir = TempDir::new().unwrap();
        run(Hook::Build, "echo built > out.txt", dir.path()).await.unwrap();
        let out = std::fs::read_to_string(dir.path().join("out.txt")).unwrap();
        assert_eq!(out.trim(), "built");
    }

    #[tokio::test]
    async fn test_failure_carries_combined_output() {
        let dir = TempDir::new().unwrap();
        let err = run(Hook::Deploy, "echo to-stdout; echo to-stderr >&2; exit 3", dir.path())
            .await
            .unwrap_err();

        match err {
            ShipError::Hook(e) => {
                assert_eq!(e.hook, Hook::Deploy);
                assert!(e.output.contains("to-stdout"));
                assert!(e.output.contains("to-stderr"));
                assert!(e.command.contains("exit 3"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_empty_command_skipped() {
        let dir = TempDir::new().unwrap();
        run(Hook::Clean, "  ", dir.path()).await.unwrap();
    }
}
