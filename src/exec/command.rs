// src/exec/command.rs

//! Running a rendered command line as a subprocess.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::{FlowError, Result};
use crate::process::task::Task;

pub type TaskFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Strategy that produces a task's outputs.
///
/// Implementations must write every output to its temp path
/// ([`Task::out_temp_path`]); the calling process atomizes them afterwards.
/// The default is [`ShellExecutor`].
pub trait TaskExecutor: Send + Sync {
    fn execute<'a>(&'a self, task: &'a Task) -> TaskFuture<'a>;
}

/// Runs the task's rendered command with `sh -c`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellExecutor;

impl TaskExecutor for ShellExecutor {
    fn execute<'a>(&'a self, task: &'a Task) -> TaskFuture<'a> {
        Box::pin(run_shell(task.process(), task.command()))
    }
}

/// Run `cmd` through the platform shell and fail on a non-zero exit code.
///
/// stdout and stderr are consumed line by line and logged at debug level. The
/// child is killed if the returned future is dropped.
pub async fn run_shell(process: &str, cmd: &str) -> Result<()> {
    info!(process = %process, cmd = %cmd, "executing command");

    let mut command = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    };

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .with_context(|| format!("spawning command for process '{process}'"))?;

    let stdout = child.stdout.take().map(|s| log_lines(process.to_string(), "stdout", s));
    let stderr = child.stderr.take().map(|s| log_lines(process.to_string(), "stderr", s));

    let status = child
        .wait()
        .await
        .with_context(|| format!("waiting for command of process '{process}'"))?;

    for handle in [stdout, stderr].into_iter().flatten() {
        // A reader that panicked only loses log lines.
        let _ = handle.await;
    }

    let code = status.code().unwrap_or(-1);
    debug!(process = %process, exit_code = code, "command exited");
    if !status.success() {
        return Err(FlowError::CommandFailed {
            process: process.to_string(),
            code,
        });
    }
    Ok(())
}

fn log_lines<R>(process: String, stream: &'static str, reader: R) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(process = %process, "{stream}: {line}");
        }
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zero_exit_is_ok() {
        run_shell("t", "echo hi; echo err >&2").await.unwrap();
    }

    #[tokio::test]
    async fn non_zero_exit_reports_code() {
        let err = run_shell("t", "exit 3").await.unwrap_err();
        assert!(matches!(
            err,
            FlowError::CommandFailed { ref process, code: 3 } if process == "t"
        ));
    }
}
