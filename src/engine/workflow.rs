// src/engine/workflow.rs

//! Workflow builder: owns the processes and wires their ports.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::path::PathBuf;

use regex::Regex;
use tracing::debug;

use crate::dag::DagGraph;
use crate::errors::{FlowError, Result};
use crate::port::{PortRef, Upstream};
use crate::process::Process;
use crate::types::{PortDirection, PortKind, ProcessState};

/// A DAG of processes connected through their ports.
///
/// Built with [`Workflow::add`], [`Workflow::connect`] and
/// [`Workflow::connect_str`], then executed once with `Workflow::run`.
pub struct Workflow {
    pub(crate) name: String,
    pub(crate) max_tasks: usize,
    pub(crate) processes: BTreeMap<String, Box<dyn Process>>,
    pub(crate) graph: DagGraph,
    pub(crate) run_to: Option<Regex>,
}

impl Workflow {
    pub fn new(name: impl Into<String>, max_tasks: usize) -> Self {
        Self {
            name: name.into(),
            max_tasks,
            processes: BTreeMap::new(),
            graph: DagGraph::new(),
            run_to: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_tasks(&self) -> usize {
        self.max_tasks
    }

    pub fn set_max_tasks(&mut self, max_tasks: usize) {
        self.max_tasks = max_tasks;
    }

    /// Only run processes whose name matches `pattern`, plus everything
    /// upstream of them.
    pub fn set_run_to(&mut self, pattern: Regex) {
        self.run_to = Some(pattern);
    }

    pub fn add(&mut self, process: impl Process + 'static) -> Result<()> {
        self.add_boxed(Box::new(process))
    }

    pub fn add_boxed(&mut self, process: Box<dyn Process>) -> Result<()> {
        let name = process.name().to_string();
        self.graph.add_process(&name)?;
        debug!(process = %name, state = %ProcessState::Idle, "process added");
        self.processes.insert(name, process);
        Ok(())
    }

    pub fn process_names(&self) -> impl Iterator<Item = &str> {
        self.processes.keys().map(String::as_str)
    }

    pub fn graph(&self) -> &DagGraph {
        &self.graph
    }

    fn port_kind(&self, port: &PortRef, direction: PortDirection) -> Result<PortKind> {
        let process = self
            .processes
            .get(&port.process)
            .ok_or_else(|| FlowError::UnknownProcess(port.process.clone()))?;
        process
            .ports()
            .kind_of(direction, &port.port)
            .ok_or_else(|| FlowError::UnknownPort {
                process: port.process.clone(),
                port: port.port.clone(),
            })
    }

    fn process_mut(&mut self, name: &str) -> Result<&mut Box<dyn Process>> {
        self.processes
            .get_mut(name)
            .ok_or_else(|| FlowError::UnknownProcess(name.to_string()))
    }

    /// Connect out-port `from` to in-port `to`.
    ///
    /// Both ports must carry the same kind of data, and the edge must not
    /// close a cycle.
    pub fn connect(&mut self, from: impl Into<PortRef>, to: impl Into<PortRef>) -> Result<()> {
        let from = from.into();
        let to = to.into();

        let from_kind = self.port_kind(&from, PortDirection::Out)?;
        let to_kind = self.port_kind(&to, PortDirection::In)?;
        if from_kind != to_kind {
            return Err(FlowError::PortKindMismatch {
                from: from.to_string(),
                to: to.to_string(),
                reason: format!("{from_kind:?} out-port cannot feed {to_kind:?} in-port"),
            });
        }

        self.graph.add_edge(&from.process, &to.process)?;

        match from_kind {
            PortKind::File => {
                let tx = self
                    .process_mut(&to.process)?
                    .ports_mut()
                    .in_file_mut(&to.port)
                    .ok_or_else(|| unknown_port(&to))?
                    .attach(from.clone())?;
                self.process_mut(&from.process)?
                    .ports_mut()
                    .out_file_mut(&from.port)
                    .ok_or_else(|| unknown_port(&from))?
                    .connect(to.clone(), tx);
            }
            PortKind::Param => {
                let tx = self
                    .process_mut(&to.process)?
                    .ports_mut()
                    .in_param_mut(&to.port)
                    .ok_or_else(|| unknown_port(&to))?
                    .attach(from.clone())?;
                self.process_mut(&from.process)?
                    .ports_mut()
                    .out_param_mut(&from.port)
                    .ok_or_else(|| unknown_port(&from))?
                    .connect(to.clone(), tx);
            }
        }
        debug!(from = %from, to = %to, kind = ?from_kind, "connected");
        Ok(())
    }

    /// Feed a constant value to param in-port `to`.
    pub fn connect_str(&mut self, to: impl Into<PortRef>, value: impl Into<String>) -> Result<()> {
        let to = to.into();
        let kind = self.port_kind(&to, PortDirection::In)?;
        if kind != PortKind::Param {
            return Err(FlowError::PortKindMismatch {
                from: "constant".to_string(),
                to: to.to_string(),
                reason: "constants can only feed param in-ports".to_string(),
            });
        }
        self.process_mut(&to.process)?
            .ports_mut()
            .in_param_mut(&to.port)
            .ok_or_else(|| unknown_port(&to))?
            .feed_constant(value)
    }

    /// Check everything that can be checked before running.
    pub fn validate(&self) -> Result<()> {
        if self.max_tasks == 0 {
            return Err(FlowError::ConfigError(
                "max_tasks must be >= 1 (got 0)".to_string(),
            ));
        }
        if self.processes.is_empty() {
            return Err(FlowError::ConfigError(format!(
                "workflow '{}' has no processes",
                self.name
            )));
        }

        let mut claimed: HashMap<PathBuf, &str> = HashMap::new();
        for (name, process) in &self.processes {
            process.check()?;

            if let Some(port) = process.ports().unconnected_inputs().into_iter().next() {
                return Err(FlowError::UnconnectedPort {
                    process: name.clone(),
                    port,
                });
            }

            for path in process.static_outputs() {
                if let Some(first) = claimed.get(&path) {
                    return Err(FlowError::DuplicateOutput {
                        path,
                        first: first.to_string(),
                        second: name.clone(),
                    });
                }
                claimed.insert(path, name);
            }
        }
        Ok(())
    }

    /// Human-readable listing of processes, ports and edges.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "workflow '{}' (max_tasks = {})",
            self.name, self.max_tasks
        );
        if let Some(re) = &self.run_to {
            let _ = writeln!(out, "run_to: {re}");
        }
        let order = self
            .graph
            .topological_order()
            .unwrap_or_else(|_| self.graph.processes().map(str::to_string).collect());
        let _ = writeln!(out, "\nprocesses ({}):", self.processes.len());
        for name in &order {
            let Some(process) = self.processes.get(name) else {
                continue;
            };
            let _ = writeln!(out, "  - {name}");
            let _ = writeln!(out, "      {}", process.describe());
            let ports = process.ports();
            for spec in ports.specs() {
                let kind = match spec.kind {
                    PortKind::File => "file",
                    PortKind::Param => "param",
                };
                match spec.direction {
                    PortDirection::In => {
                        let upstream = match spec.kind {
                            PortKind::File => ports.in_file(&spec.name).map(|p| p.upstream()),
                            PortKind::Param => ports.in_param(&spec.name).map(|p| p.upstream()),
                        };
                        let sources: Vec<String> = upstream
                            .unwrap_or_default()
                            .iter()
                            .map(|u| match u {
                                Upstream::Port(r) => r.to_string(),
                                Upstream::Constant(v) => format!("{v:?}"),
                            })
                            .collect();
                        let _ = writeln!(
                            out,
                            "      in  {kind:<5} {} <- {}",
                            spec.name,
                            sources.join(", ")
                        );
                    }
                    PortDirection::Out => {
                        let targets: Vec<String> = match spec.kind {
                            PortKind::File => ports
                                .out_file(&spec.name)
                                .map(|p| p.targets().map(ToString::to_string).collect())
                                .unwrap_or_default(),
                            PortKind::Param => ports
                                .out_param(&spec.name)
                                .map(|p| p.targets().map(ToString::to_string).collect())
                                .unwrap_or_default(),
                        };
                        let targets = if targets.is_empty() {
                            "(sink)".to_string()
                        } else {
                            targets.join(", ")
                        };
                        let _ = writeln!(out, "      out {kind:<5} {} -> {targets}", spec.name);
                    }
                }
            }
        }
        out
    }
}

fn unknown_port(port: &PortRef) -> FlowError {
    FlowError::UnknownPort {
        process: port.process.clone(),
        port: port.port.clone(),
    }
}
