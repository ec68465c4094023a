// src/process/shell.rs

//! Process driven by a command template.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::errors::{FlowError, Result};
use crate::exec::{Bindings, CommandTemplate, PathPolicy, ShellExecutor, TaskExecutor};
use crate::ip::{AuditInfo, FileIp};
use crate::port::{InputTuple, Ports};
use crate::process::{Process, ProcessContext, ProcessFuture, ProcessStats, Task};
use crate::types::ProcessState;

/// A process whose ports are declared by its command template.
///
/// For each input tuple it resolves every output path, skips the work when
/// all outputs already exist, and otherwise runs its executor (by default
/// `sh -c` on the rendered template) and atomizes the outputs.
pub struct ShellProcess {
    name: String,
    template: CommandTemplate,
    ports: Ports,
    paths: BTreeMap<String, PathPolicy>,
    executor: Arc<dyn TaskExecutor>,
}

impl ShellProcess {
    pub fn new(name: impl Into<String>, cmd: &str) -> Result<Self> {
        let name = name.into();
        let template = CommandTemplate::parse(cmd)?;
        let mut ports = Ports::new();
        for port in template.inputs() {
            ports.add_in_file(&port)?;
        }
        for port in template.params() {
            ports.add_in_param(&port)?;
        }
        for port in template.outputs() {
            ports.add_out_file(&port)?;
        }
        Ok(Self {
            name,
            template,
            ports,
            paths: BTreeMap::new(),
            executor: Arc::new(ShellExecutor),
        })
    }

    /// Set the path policy of out-port `port`. In-ports the policy reads are
    /// declared on the process.
    pub fn with_path(mut self, port: &str, policy: PathPolicy) -> Result<Self> {
        if !self.template.outputs().contains(port) {
            return Err(FlowError::UnknownPort {
                process: self.name.clone(),
                port: port.to_string(),
            });
        }
        for input in policy.inputs() {
            self.ports.add_in_file(&input)?;
        }
        for param in policy.params() {
            self.ports.add_in_param(&param)?;
        }
        self.paths.insert(port.to_string(), policy);
        Ok(self)
    }

    pub fn with_executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn template(&self) -> &CommandTemplate {
        &self.template
    }

    async fn run_loop(mut self, ctx: ProcessContext) -> Result<ProcessStats> {
        info!(workflow = %ctx.workflow(), process = %self.name, "process starting");
        let mut stats = ProcessStats::default();

        if self.ports.has_inputs() {
            while let Some(tuple) = self.ports.receive_tuple().await {
                let state = self.handle(tuple, &ctx).await?;
                stats.record(state);
            }
        } else {
            let state = self.handle(InputTuple::default(), &ctx).await?;
            stats.record(state);
        }

        info!(
            process = %self.name,
            computed = stats.computed,
            skipped = stats.skipped,
            state = %ProcessState::Closed,
            "process finished"
        );
        Ok(stats)
    }

    async fn handle(&self, tuple: InputTuple, ctx: &ProcessContext) -> Result<ProcessState> {
        let mut bindings = Bindings {
            inputs: tuple.files,
            outputs: BTreeMap::new(),
            params: tuple.params,
        };

        let mut targets = BTreeMap::new();
        for (port, policy) in &self.paths {
            let path = policy.resolve(&bindings)?;
            ctx.claim(&path, &self.name)?;
            targets.insert(port.clone(), FileIp::new(path));
        }
        for (port, ip) in &targets {
            bindings.outputs.insert(port.clone(), ip.temp_path());
        }
        let command = self.template.render(&bindings)?;

        let mut audit = AuditInfo::new(&self.name);
        audit.command = command.clone();
        for ip in bindings.inputs.values() {
            audit.merge_upstream(&ip.path().to_string_lossy(), ip.audit());
        }
        let mut audit = audit.with_params(bindings.params.clone());

        if !targets.is_empty() && targets.values().all(FileIp::exists) {
            info!(
                process = %self.name,
                state = %ProcessState::Skipped,
                "all outputs exist; skipping"
            );
            for (port, ip) in targets {
                let existing = FileIp::existing(ip.path(), audit.clone());
                self.ports.send_file(&port, existing).await?;
            }
            return Ok(ProcessState::Skipped);
        }

        for ip in targets.values() {
            if ip.temp_exists() {
                warn!(
                    process = %self.name,
                    path = ?ip.temp_path(),
                    "removing stale temp output from an earlier run"
                );
                ip.remove_temp()?;
            }
            ip.prepare_temp()?;
        }

        let task = Task::new(
            &self.name,
            command,
            bindings.inputs,
            targets,
            bindings.params,
        );

        let started = Instant::now();
        {
            let _permit = ctx.acquire().await?;
            info!(process = %self.name, state = %ProcessState::Running, "computing");
            self.executor.execute(&task).await?;
        }
        audit.exec_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let outputs = task.into_outputs();
        if let Some(missing) = outputs.values().find(|ip| !ip.temp_exists()) {
            return Err(FlowError::MissingOutput {
                process: self.name.clone(),
                path: missing.path().to_path_buf(),
            });
        }

        let mut finished = Vec::with_capacity(outputs.len());
        for (port, ip) in outputs {
            let out = FileIp::with_audit(ip.path(), audit.clone());
            out.atomize()?;
            finished.push((port, out));
        }
        info!(
            process = %self.name,
            state = %ProcessState::Computed,
            exec_time_ms = audit.exec_time_ms,
            "outputs finalized"
        );
        for (port, out) in finished {
            self.ports.send_file(&port, out).await?;
        }
        Ok(ProcessState::Computed)
    }
}

impl Process for ShellProcess {
    fn name(&self) -> &str {
        &self.name
    }

    fn ports(&self) -> &Ports {
        &self.ports
    }

    fn ports_mut(&mut self) -> &mut Ports {
        &mut self.ports
    }

    fn static_outputs(&self) -> Vec<PathBuf> {
        self.paths
            .values()
            .filter_map(|p| p.static_path().map(|p| p.to_path_buf()))
            .collect()
    }

    fn describe(&self) -> String {
        let mut out = format!("cmd: {}", self.template.source());
        for (port, policy) in &self.paths {
            let _ = write!(out, "\n      out.{port}: {policy}");
        }
        out
    }

    fn check(&self) -> Result<()> {
        for port in self.template.outputs() {
            if !self.paths.contains_key(&port) {
                return Err(FlowError::ConfigError(format!(
                    "out-port '{port}' of process '{}' has no path policy",
                    self.name
                )));
            }
        }
        Ok(())
    }

    fn run(self: Box<Self>, ctx: ProcessContext) -> ProcessFuture {
        Box::pin((*self).run_loop(ctx))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn ports_come_from_template_and_policies() {
        let p = ShellProcess::new("train", "train {i:data} -c {p:cost} > {o:model}")
            .unwrap()
            .with_path(
                "model",
                PathPolicy::Extend {
                    input: "data".into(),
                    suffix: ".jar".into(),
                },
            )
            .unwrap();
        let names: Vec<String> = p.ports().specs().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["data", "cost", "model"]);
        assert!(p.check().is_ok());
    }

    #[test]
    fn output_without_policy_fails_check() {
        let p = ShellProcess::new("p", "echo > {o:out}").unwrap();
        assert!(p.check().is_err());
    }

    #[test]
    fn policy_for_undeclared_output_is_rejected() {
        let p = ShellProcess::new("p", "echo > {o:out}").unwrap();
        assert!(matches!(
            p.with_path("other", PathPolicy::Static("x".into())),
            Err(FlowError::UnknownPort { .. })
        ));
    }

    #[tokio::test]
    async fn source_process_runs_once_and_atomizes() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.txt");
        let p = ShellProcess::new("src", "echo hello > {o:out}")
            .unwrap()
            .with_path("out", PathPolicy::Static(target.clone()))
            .unwrap();

        let stats = Box::new(p).run(ProcessContext::new("wf", 1)).await.unwrap();
        assert_eq!(stats, ProcessStats { computed: 1, skipped: 0 });
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "hello\n");
        assert!(dir.path().join("out.txt.audit.json").exists());
        assert!(!dir.path().join("out.txt.tmp").exists());
    }

    #[tokio::test]
    async fn failing_command_leaves_no_final_output() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.txt");
        let p = ShellProcess::new("src", "echo partial > {o:out}; exit 1")
            .unwrap()
            .with_path("out", PathPolicy::Static(target.clone()))
            .unwrap();

        let err = Box::new(p).run(ProcessContext::new("wf", 1)).await.unwrap_err();
        assert!(matches!(err, FlowError::CommandFailed { code: 1, .. }));
        assert!(!target.exists());
        assert!(dir.path().join("out.txt.tmp").exists());
    }

    #[tokio::test]
    async fn command_that_forgets_an_output_fails() {
        let dir = tempfile::tempdir().unwrap();
        let p = ShellProcess::new("src", "true {o:out}")
            .unwrap()
            .with_path("out", PathPolicy::Static(dir.path().join("never.txt")))
            .unwrap();

        let err = Box::new(p).run(ProcessContext::new("wf", 1)).await.unwrap_err();
        assert!(matches!(err, FlowError::MissingOutput { .. }));
    }
}
