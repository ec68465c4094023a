// src/engine/runtime.rs

use std::collections::{BTreeMap, BTreeSet};

use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::errors::{FlowError, Result};
use crate::ip::FileIp;
use crate::port::{InPort, PortRef};
use crate::process::{ProcessContext, ProcessStats};
use crate::types::PortKind;

use super::workflow::Workflow;

/// Outcome of one workflow run.
///
/// Items that reached an out-port with no consumer are collected here, keyed
/// by `process.port`.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub processes: BTreeMap<String, ProcessStats>,
    pub outputs: BTreeMap<String, Vec<FileIp>>,
    pub params: BTreeMap<String, Vec<String>>,
}

impl RunReport {
    pub fn stats(&self, process: &str) -> Option<ProcessStats> {
        self.processes.get(process).copied()
    }

    pub fn total_computed(&self) -> usize {
        self.processes.values().map(|s| s.computed).sum()
    }

    pub fn total_skipped(&self) -> usize {
        self.processes.values().map(|s| s.skipped).sum()
    }

    /// First value that reached the unconnected param out-port `port`.
    pub fn param(&self, port: &str) -> Option<&str> {
        self.params
            .get(port)
            .and_then(|v| v.first())
            .map(String::as_str)
    }
}

enum Sink {
    Files(PortRef, InPort<FileIp>),
    Params(PortRef, InPort<String>),
}

enum Drained {
    Files(PortRef, Vec<FileIp>),
    Params(PortRef, Vec<String>),
}

impl Workflow {
    /// Execute the workflow to completion.
    ///
    /// Every process runs in its own task; the call returns once all of them
    /// have finished and every sink is drained. The first process error
    /// aborts all remaining tasks and is returned.
    pub async fn run(mut self) -> Result<RunReport> {
        self.validate()?;
        self.apply_run_to()?;

        let sinks = self.attach_sinks()?;
        for process in self.processes.values_mut() {
            process.ports_mut().seal();
        }

        let ctx = ProcessContext::new(&self.name, self.max_tasks);
        info!(
            workflow = %self.name,
            processes = self.processes.len(),
            max_tasks = self.max_tasks,
            "workflow starting"
        );

        let mut drains = JoinSet::new();
        for sink in sinks {
            drains.spawn(drain(sink));
        }

        let mut running = JoinSet::new();
        for (name, process) in std::mem::take(&mut self.processes) {
            let ctx = ctx.clone();
            running.spawn(async move { (name, process.run(ctx).await) });
        }

        let mut report = RunReport::default();
        while let Some(joined) = running.join_next().await {
            let failure = match joined {
                Ok((name, Ok(stats))) => {
                    debug!(process = %name, ?stats, "process task finished");
                    report.processes.insert(name, stats);
                    continue;
                }
                Ok((name, Err(err))) => {
                    error!(process = %name, error = %err, "process failed; aborting workflow");
                    err
                }
                Err(join_err) => {
                    error!(error = %join_err, "process task panicked; aborting workflow");
                    FlowError::ProcessPanicked(join_err.to_string())
                }
            };
            running.abort_all();
            drains.abort_all();
            return Err(failure);
        }

        while let Some(joined) = drains.join_next().await {
            match joined.map_err(|e| FlowError::ProcessPanicked(e.to_string()))? {
                Drained::Files(port, items) => {
                    report.outputs.insert(port.to_string(), items);
                }
                Drained::Params(port, items) => {
                    report.params.insert(port.to_string(), items);
                }
            }
        }

        info!(
            workflow = %self.name,
            computed = report.total_computed(),
            skipped = report.total_skipped(),
            "workflow finished"
        );
        Ok(report)
    }

    /// Drop every process not needed to reach the `run_to` targets.
    fn apply_run_to(&mut self) -> Result<()> {
        let Some(pattern) = self.run_to.clone() else {
            return Ok(());
        };
        let targets: Vec<&str> = self
            .processes
            .keys()
            .map(String::as_str)
            .filter(|name| pattern.is_match(name))
            .collect();
        if targets.is_empty() {
            return Err(FlowError::ConfigError(format!(
                "no process matches run-to pattern '{pattern}'"
            )));
        }
        let keep: BTreeSet<String> = self.graph.upstream_closure(targets);
        info!(pattern = %pattern, kept = ?keep, "restricting run to upstream closure");

        self.processes.retain(|name, _| keep.contains(name));
        for process in self.processes.values_mut() {
            process
                .ports_mut()
                .retain_targets(|target| keep.contains(&target.process));
        }
        Ok(())
    }

    /// Connect every out-port without a consumer to a draining sink.
    fn attach_sinks(&mut self) -> Result<Vec<Sink>> {
        let mut sinks = Vec::new();
        for (name, process) in self.processes.iter_mut() {
            let ports = process.ports_mut();
            for (port, kind) in ports.dangling_outputs() {
                let source = PortRef::new(name.clone(), port.clone());
                let sink_ref = PortRef::new(format!("{}:sink", self.name), source.to_string());
                match kind {
                    PortKind::File => {
                        let mut sink = InPort::new(source.to_string());
                        let tx = sink.attach(source.clone())?;
                        if let Some(out) = ports.out_file_mut(&port) {
                            out.connect(sink_ref, tx);
                        }
                        sink.seal();
                        sinks.push(Sink::Files(source, sink));
                    }
                    PortKind::Param => {
                        let mut sink = InPort::new(source.to_string());
                        let tx = sink.attach(source.clone())?;
                        if let Some(out) = ports.out_param_mut(&port) {
                            out.connect(sink_ref, tx);
                        }
                        sink.seal();
                        sinks.push(Sink::Params(source, sink));
                    }
                }
            }
        }
        Ok(sinks)
    }
}

async fn drain(sink: Sink) -> Drained {
    match sink {
        Sink::Files(port, mut rx) => {
            let mut items = Vec::new();
            while let Some(ip) = rx.recv().await {
                debug!(port = %port, path = ?ip.path(), "sink received");
                items.push(ip);
            }
            Drained::Files(port, items)
        }
        Sink::Params(port, mut rx) => {
            let mut items = Vec::new();
            while let Some(value) = rx.recv().await {
                debug!(port = %port, value = %value, "sink received param");
                items.push(value);
            }
            Drained::Params(port, items)
        }
    }
}
