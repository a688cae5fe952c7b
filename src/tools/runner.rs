//! External process spawning.
//!
//! Every tool is spawned with kill-on-drop, so dropping the future returned
//! by [`ProcessRunner::run`] (which is what the watchdog does on expiry)
//! kills the child. Stderr is kept for failure reports, bounded in size.

use std::process::Stdio;
use std::time::Instant;

#[cfg(windows)]
use std::os::windows::process::CommandExt;

use tokio::process::Command;

use super::{ToolFuture, ToolInvocation, ToolOutput, ToolPaths, ToolRunner};
use crate::error::AppError;

/// Keep only the last N bytes of stderr to avoid unbounded memory growth.
const MAX_STDERR_BYTES: usize = 64 * 1024;

/// Runs tools as real child processes.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    paths: ToolPaths,
}

impl ProcessRunner {
    pub fn new(paths: ToolPaths) -> Self {
        Self { paths }
    }

    async fn run_inner(&self, invocation: &ToolInvocation) -> Result<ToolOutput, AppError> {
        let program = self.paths.get(invocation.tool)?;

        log::debug!(
            target: "nimbus_preview::tools::runner",
            "Spawning {}: path={}, args={:?}",
            invocation.tool,
            program.display(),
            invocation.args_lossy()
        );

        let mut cmd = Command::new(program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(windows)]
        cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW

        let started = Instant::now();
        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::ToolNotFound(invocation.tool)
            } else {
                AppError::from(format!("Failed to spawn {}: {}", invocation.tool, e))
            }
        })?;

        let stderr = tail_lossy(&output.stderr, MAX_STDERR_BYTES);

        if output.status.success() {
            log::debug!(
                target: "nimbus_preview::tools::runner",
                "{} completed in {:?}",
                invocation.tool,
                started.elapsed()
            );
            Ok(ToolOutput {
                stdout: output.stdout,
                stderr,
            })
        } else {
            // No exit code means the process was killed by a signal.
            let code = output.status.code().unwrap_or(-1);
            log::debug!(
                target: "nimbus_preview::tools::runner",
                "{} exited with code {} after {:?}",
                invocation.tool,
                code,
                started.elapsed()
            );
            Err(AppError::tool_failed(invocation.tool, code, stderr))
        }
    }
}

impl ToolRunner for ProcessRunner {
    fn run<'a>(&'a self, invocation: &'a ToolInvocation) -> ToolFuture<'a> {
        Box::pin(self.run_inner(invocation))
    }
}

fn tail_lossy(bytes: &[u8], max: usize) -> String {
    let start = bytes.len().saturating_sub(max);
    String::from_utf8_lossy(&bytes[start..]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Tool;

    #[test]
    fn tail_keeps_last_bytes() {
        let s = tail_lossy(b"0123456789", 4);
        assert_eq!(s, "6789");
        assert_eq!(tail_lossy(b"abc", 10), "abc");
    }

    #[tokio::test]
    async fn missing_tool_fails_before_spawning() {
        let runner = ProcessRunner::new(ToolPaths::default());
        let inv = ToolInvocation::new(Tool::Ffmpeg).arg("-version");
        let err = runner.run(&inv).await.expect_err("no ffmpeg configured");
        assert!(matches!(err, AppError::ToolNotFound(Tool::Ffmpeg)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_tool_failed() {
        let runner = ProcessRunner::new(ToolPaths::default().with(Tool::Ffprobe, "/bin/sh"));
        let inv = ToolInvocation::new(Tool::Ffprobe).args(["-c", "echo nope >&2; exit 3"]);
        match runner.run(&inv).await {
            Err(AppError::ToolFailed { tool, code, stderr }) => {
                assert_eq!(tool, Tool::Ffprobe);
                assert_eq!(code, 3);
                assert_eq!(stderr.trim(), "nope");
            }
            other => panic!("expected ToolFailed, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonexistent_binary_maps_to_not_found() {
        let runner = ProcessRunner::new(
            ToolPaths::default().with(Tool::Chromium, "/nonexistent/chromium-for-tests"),
        );
        let inv = ToolInvocation::new(Tool::Chromium);
        let err = runner.run(&inv).await.expect_err("spawn fails");
        assert!(matches!(err, AppError::ToolNotFound(Tool::Chromium)));
    }
}
