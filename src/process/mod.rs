// src/process/mod.rs

//! Process nodes and the context they run in.
//!
//! Every node in a workflow implements [`Process`]: it owns its [`Ports`]
//! and, once the workflow starts, is moved into its own tokio task through
//! [`Process::run`]. Nodes coordinate only through their port channels.

pub mod shell;
pub mod task;

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::errors::{FlowError, Result};
use crate::port::Ports;
use crate::types::ProcessState;

pub use shell::ShellProcess;
pub use task::Task;

pub type ProcessFuture = Pin<Box<dyn Future<Output = Result<ProcessStats>> + Send>>;

/// A node of the workflow graph.
pub trait Process: Send {
    fn name(&self) -> &str;

    fn ports(&self) -> &Ports;

    fn ports_mut(&mut self) -> &mut Ports;

    /// Output paths known before running, checked for uniqueness.
    fn static_outputs(&self) -> Vec<PathBuf> {
        Vec::new()
    }

    /// One-line description for dry-run output.
    fn describe(&self) -> String;

    /// Consistency checks that need the whole process configured.
    fn check(&self) -> Result<()> {
        Ok(())
    }

    /// Consume input tuples until an in-port closes, then return. Dropping
    /// the process afterwards closes its out-ports.
    fn run(self: Box<Self>, ctx: ProcessContext) -> ProcessFuture;
}

/// Per-process outcome counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessStats {
    pub computed: usize,
    pub skipped: usize,
}

impl ProcessStats {
    pub fn record(&mut self, state: ProcessState) {
        match state {
            ProcessState::Computed => self.computed += 1,
            ProcessState::Skipped => self.skipped += 1,
            _ => {}
        }
    }
}

/// Shared state handed to every process of one workflow run.
#[derive(Debug, Clone)]
pub struct ProcessContext {
    workflow: Arc<str>,
    permits: Arc<Semaphore>,
    outputs: Arc<Mutex<HashMap<PathBuf, String>>>,
}

impl ProcessContext {
    pub fn new(workflow: &str, max_tasks: usize) -> Self {
        Self {
            workflow: Arc::from(workflow),
            permits: Arc::new(Semaphore::new(max_tasks.max(1))),
            outputs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn workflow(&self) -> &str {
        &self.workflow
    }

    /// Wait for a compute slot. Hold the permit only while doing work, never
    /// while waiting on ports.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| FlowError::Other(e.into()))
    }

    /// Register `path` as produced by `process`. A path may be claimed once
    /// per run.
    pub fn claim(&self, path: &Path, process: &str) -> Result<()> {
        let mut outputs = self.outputs.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(first) = outputs.get(path) {
            return Err(FlowError::DuplicateOutput {
                path: path.to_path_buf(),
                first: first.clone(),
                second: process.to_string(),
            });
        }
        outputs.insert(path.to_path_buf(), process.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_of_a_path_fails() {
        let ctx = ProcessContext::new("wf", 2);
        ctx.claim(Path::new("dat/a.txt"), "p1").unwrap();
        ctx.claim(Path::new("dat/b.txt"), "p1").unwrap();
        let err = ctx.claim(Path::new("dat/a.txt"), "p2").unwrap_err();
        assert!(matches!(
            err,
            FlowError::DuplicateOutput { ref first, ref second, .. } if first == "p1" && second == "p2"
        ));
    }

    #[tokio::test]
    async fn permits_are_bounded() {
        let ctx = ProcessContext::new("wf", 1);
        let held = ctx.acquire().await.unwrap();
        assert_eq!(ctx.permits.available_permits(), 0);
        drop(held);
        assert_eq!(ctx.permits.available_permits(), 1);
    }

    #[test]
    fn stats_count_terminal_states() {
        let mut stats = ProcessStats::default();
        stats.record(ProcessState::Computed);
        stats.record(ProcessState::Skipped);
        stats.record(ProcessState::Skipped);
        stats.record(ProcessState::Closed);
        assert_eq!(stats, ProcessStats { computed: 1, skipped: 2 });
    }
}
