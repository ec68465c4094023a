//! Task executor that writes outputs in-process instead of spawning a shell.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use scidag::errors::FlowError;
use scidag::exec::{TaskExecutor, TaskFuture};
use scidag::process::Task;

/// Writes `"<process>:<port>\n"` to every output temp path and records each
/// call.
///
/// With [`CountingExecutor::failing`] the executor writes the temp files and
/// then reports a non-zero exit code, which simulates a tool that crashed
/// half-way through.
#[derive(Debug, Default)]
pub struct CountingExecutor {
    calls: AtomicUsize,
    commands: Mutex<Vec<String>>,
    fail: bool,
}

impl CountingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Rendered command lines, in execution order.
    pub fn commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

impl TaskExecutor for CountingExecutor {
    fn execute<'a>(&'a self, task: &'a Task) -> TaskFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut commands) = self.commands.lock() {
                commands.push(task.command().to_string());
            }

            for (port, ip) in task.outputs() {
                ip.write(format!("{}:{port}\n", task.process()).as_bytes())?;
            }

            if self.fail {
                return Err(FlowError::CommandFailed {
                    process: task.process().to_string(),
                    code: 1,
                });
            }
            Ok(())
        })
    }
}
