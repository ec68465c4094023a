// src/components/substream.rs

use tracing::info;

use crate::errors::Result;
use crate::ip::{AuditInfo, FileIp};
use crate::port::Ports;
use crate::process::{Process, ProcessContext, ProcessFuture, ProcessStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubstreamPort {
    In,
    Substream,
}

impl SubstreamPort {
    pub fn name(self) -> &'static str {
        match self {
            SubstreamPort::In => "in",
            SubstreamPort::Substream => "substream",
        }
    }
}

/// Collects an entire stream into a single container IP.
///
/// The container has no file of its own; downstream templates render its
/// members with `{i:port|join:SEP}`.
pub struct StreamToSubstream {
    name: String,
    ports: Ports,
}

impl StreamToSubstream {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let mut ports = Ports::new();
        ports.add_in_file(SubstreamPort::In.name())?;
        ports.add_out_file(SubstreamPort::Substream.name())?;
        Ok(Self {
            name: name.into(),
            ports,
        })
    }

    async fn run_loop(mut self, _ctx: ProcessContext) -> Result<ProcessStats> {
        let Some(mut input) = self.ports.take_in_file(SubstreamPort::In.name()) else {
            return Ok(ProcessStats::default());
        };
        let mut members = Vec::new();
        let mut audit = AuditInfo::new(&self.name);
        while let Some(ip) = input.recv().await {
            audit.add_upstream(&ip.path().to_string_lossy(), ip.audit());
            members.push(ip);
        }
        info!(process = %self.name, members = members.len(), "substream collected");
        self.ports
            .send_file(SubstreamPort::Substream.name(), FileIp::substream(members, audit))
            .await?;
        Ok(ProcessStats::default())
    }
}

impl Process for StreamToSubstream {
    fn name(&self) -> &str {
        &self.name
    }

    fn ports(&self) -> &Ports {
        &self.ports
    }

    fn ports_mut(&mut self) -> &mut Ports {
        &mut self.ports
    }

    fn describe(&self) -> String {
        "substream".to_string()
    }

    fn run(self: Box<Self>, ctx: ProcessContext) -> ProcessFuture {
        Box::pin((*self).run_loop(ctx))
    }
}
