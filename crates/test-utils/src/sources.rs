//! Processes that feed fixed packets into a workflow.

use std::path::Path;

use scidag::errors::Result;
use scidag::ip::{AuditInfo, FileIp};
use scidag::port::Ports;
use scidag::process::{Process, ProcessContext, ProcessFuture, ProcessStats};

/// Emits a fixed list of file IPs on its `out` port, then closes.
pub struct StaticSource {
    name: String,
    ports: Ports,
    ips: Vec<FileIp>,
}

impl StaticSource {
    pub fn new(name: impl Into<String>, ips: Vec<FileIp>) -> Result<Self> {
        let mut ports = Ports::new();
        ports.add_out_file("out")?;
        Ok(Self {
            name: name.into(),
            ports,
            ips,
        })
    }
}

impl Process for StaticSource {
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
        format!("static source ({} packets)", self.ips.len())
    }

    fn run(self: Box<Self>, _ctx: ProcessContext) -> ProcessFuture {
        Box::pin(async move {
            for ip in self.ips.iter().cloned() {
                self.ports.send_file("out", ip).await?;
            }
            Ok(ProcessStats::default())
        })
    }
}

/// Write `contents` to `path` with an audit sidecar carrying `params` and
/// `keys`, and return the packet describing it.
pub fn write_ip(
    path: &Path,
    contents: &str,
    params: &[(&str, &str)],
    keys: &[(&str, &str)],
) -> Result<FileIp> {
    let audit = AuditInfo::new("fixture")
        .with_params(params.iter().copied())
        .with_keys(keys.iter().copied());
    let ip = FileIp::with_audit(path, audit);
    ip.write(contents.as_bytes())?;
    ip.atomize()?;
    Ok(ip)
}
