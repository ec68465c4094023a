// src/components/param_printer.rs

use std::fmt::Write as _;
use std::path::PathBuf;

use tracing::info;

use crate::errors::Result;
use crate::ip::{AuditInfo, FileIp};
use crate::port::Ports;
use crate::process::{Process, ProcessContext, ProcessFuture, ProcessStats};
use crate::types::ProcessState;

use super::{clear_stale_temp, write_text};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamPrinterPort {
    Out,
}

impl ParamPrinterPort {
    pub fn name(self) -> &'static str {
        match self {
            ParamPrinterPort::Out => "out",
        }
    }
}

/// Writes the values arriving on a set of param in-ports as `name=value`
/// lines.
///
/// Each round reads one value from every port that is still open; a port
/// that closes drops out of later rounds. The file is written once all
/// ports are closed.
pub struct ParamPrinter {
    name: String,
    path: PathBuf,
    ports: Ports,
}

impl ParamPrinter {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Result<Self> {
        let mut ports = Ports::new();
        ports.add_out_file(ParamPrinterPort::Out.name())?;
        Ok(Self {
            name: name.into(),
            path: path.into(),
            ports,
        })
    }

    /// Declare a param in-port named `param`.
    pub fn with_param(mut self, param: &str) -> Result<Self> {
        self.ports.add_in_param(param)?;
        Ok(self)
    }

    async fn run_loop(mut self, ctx: ProcessContext) -> Result<ProcessStats> {
        let mut stats = ProcessStats::default();
        ctx.claim(&self.path, &self.name)?;
        let mut open = self.ports.take_in_params();

        if self.path.exists() {
            info!(process = %self.name, path = ?self.path, "params file exists; draining input");
            for port in open.values_mut() {
                while port.recv().await.is_some() {}
            }
            let existing = FileIp::existing(&self.path, AuditInfo::new(&self.name));
            self.ports
                .send_file(ParamPrinterPort::Out.name(), existing)
                .await?;
            stats.record(ProcessState::Skipped);
            return Ok(stats);
        }

        let mut audit = AuditInfo::new(&self.name);
        let mut lines = String::new();
        while !open.is_empty() {
            let mut closed = Vec::new();
            for (param, port) in open.iter_mut() {
                match port.recv().await {
                    Some(value) => {
                        let _ = writeln!(lines, "{param}={value}");
                        audit.params.insert(param.clone(), value);
                    }
                    None => closed.push(param.clone()),
                }
            }
            for param in closed {
                open.remove(&param);
            }
        }

        let target = FileIp::with_audit(&self.path, audit);
        {
            let _permit = ctx.acquire().await?;
            clear_stale_temp(&self.name, &target)?;
            write_text(&target, &lines)?;
        }
        info!(process = %self.name, path = ?self.path, "params written");
        self.ports
            .send_file(ParamPrinterPort::Out.name(), target)
            .await?;
        stats.record(ProcessState::Computed);
        Ok(stats)
    }
}

impl Process for ParamPrinter {
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
        vec![self.path.clone()]
    }

    fn describe(&self) -> String {
        format!("param_printer -> {}", self.path.display())
    }

    fn run(self: Box<Self>, ctx: ProcessContext) -> ProcessFuture {
        Box::pin((*self).run_loop(ctx))
    }
}
