// src/port/mod.rs

//! Ports: named, typed connection points on a process.
//!
//! An [`OutPort`] holds one channel sender per connected in-port and
//! broadcasts every item to all of them (fan-out). An [`InPort`] owns a single
//! receiver; each upstream out-port gets a clone of its sender, so several
//! producers merge into one stream (fan-in) that closes once every producer
//! has dropped its sender.
//!
//! File ports carry [`FileIp`]s, param ports carry bare `String`s.

use std::collections::BTreeMap;
use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::errors::{FlowError, Result};
use crate::ip::FileIp;
use crate::types::{PortDirection, PortKind};

/// Capacity of every port channel. A full channel blocks the sender.
pub const PORT_BUFFER_SIZE: usize = 128;

/// Fully qualified port address: `process.port`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortRef {
    pub process: String,
    pub port: String,
}

impl PortRef {
    pub fn new(process: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            process: process.into(),
            port: port.into(),
        }
    }

    /// Parse a `process.port` reference. The port is everything after the
    /// last dot, so process names may contain dots.
    pub fn parse(s: &str) -> Result<Self> {
        match s.rsplit_once('.') {
            Some((process, port)) if !process.is_empty() && !port.is_empty() => {
                Ok(Self::new(process, port))
            }
            _ => Err(FlowError::ConfigError(format!(
                "invalid port reference '{s}' (expected \"process.port\")"
            ))),
        }
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.process, self.port)
    }
}

impl From<(&str, &str)> for PortRef {
    fn from((process, port): (&str, &str)) -> Self {
        Self::new(process, port)
    }
}

/// Where an in-port's items come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upstream {
    Port(PortRef),
    Constant(String),
}

/// Static description of a port, for validation and dry-run output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
    pub name: String,
    pub direction: PortDirection,
    pub kind: PortKind,
}

/// Receiving end of a connection.
#[derive(Debug)]
pub struct InPort<T> {
    name: String,
    tx: Option<mpsc::Sender<T>>,
    rx: mpsc::Receiver<T>,
    upstream: Vec<Upstream>,
}

impl<T> InPort<T> {
    pub fn new(name: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::channel(PORT_BUFFER_SIZE);
        Self {
            name: name.into(),
            tx: Some(tx),
            rx,
            upstream: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_connected(&self) -> bool {
        !self.upstream.is_empty()
    }

    pub fn upstream(&self) -> &[Upstream] {
        &self.upstream
    }

    /// Register an upstream out-port and hand back the sender it should use.
    pub fn attach(&mut self, from: PortRef) -> Result<mpsc::Sender<T>> {
        let tx = self.tx.clone().ok_or_else(|| {
            FlowError::ConfigError(format!("in-port '{}' is already sealed", self.name))
        })?;
        self.upstream.push(Upstream::Port(from));
        Ok(tx)
    }

    /// Drop the port's own sender so the channel closes once every upstream
    /// has finished. Called right before the owning process starts.
    pub fn seal(&mut self) {
        self.tx = None;
    }

    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }
}

impl InPort<String> {
    /// Feed a constant parameter value: one item, then closed.
    pub fn feed_constant(&mut self, value: impl Into<String>) -> Result<()> {
        let value = value.into();
        let tx = self.tx.as_ref().ok_or_else(|| {
            FlowError::ConfigError(format!("in-port '{}' is already sealed", self.name))
        })?;
        tx.try_send(value.clone()).map_err(|_| {
            FlowError::ConfigError(format!(
                "too many constant values for param port '{}'",
                self.name
            ))
        })?;
        self.upstream.push(Upstream::Constant(value));
        Ok(())
    }
}

#[derive(Debug)]
struct Peer<T> {
    target: PortRef,
    tx: mpsc::Sender<T>,
}

/// Sending end of one or more connections.
#[derive(Debug)]
pub struct OutPort<T> {
    name: String,
    peers: Vec<Peer<T>>,
}

impl<T: Clone + Send> OutPort<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            peers: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_connected(&self) -> bool {
        !self.peers.is_empty()
    }

    pub fn connect(&mut self, target: PortRef, tx: mpsc::Sender<T>) {
        self.peers.push(Peer { target, tx });
    }

    pub fn targets(&self) -> impl Iterator<Item = &PortRef> {
        self.peers.iter().map(|p| &p.target)
    }

    /// Keep only the peers whose target satisfies `keep`.
    pub fn retain_targets(&mut self, mut keep: impl FnMut(&PortRef) -> bool) {
        self.peers.retain(|p| keep(&p.target));
    }

    /// Broadcast `item` to every connected in-port, waiting for channel space.
    ///
    /// A peer whose receiver is already gone (its process finished) is
    /// skipped with a warning.
    pub async fn send(&self, item: T) {
        for peer in &self.peers {
            debug!(port = %self.name, target = %peer.target, "sending");
            if peer.tx.send(item.clone()).await.is_err() {
                warn!(
                    port = %self.name,
                    target = %peer.target,
                    "downstream port already closed; dropping item"
                );
            }
        }
    }
}

/// One synchronized set of inputs: one item per connected in-port.
#[derive(Debug, Clone, Default)]
pub struct InputTuple {
    pub files: BTreeMap<String, FileIp>,
    pub params: BTreeMap<String, String>,
}

/// The complete set of ports owned by one process.
#[derive(Debug, Default)]
pub struct Ports {
    in_files: BTreeMap<String, InPort<FileIp>>,
    in_params: BTreeMap<String, InPort<String>>,
    out_files: BTreeMap<String, OutPort<FileIp>>,
    out_params: BTreeMap<String, OutPort<String>>,
}

impl Ports {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_unique(&self, direction: PortDirection, name: &str) -> Result<()> {
        let taken = match direction {
            PortDirection::In => {
                self.in_files.contains_key(name) || self.in_params.contains_key(name)
            }
            PortDirection::Out => {
                self.out_files.contains_key(name) || self.out_params.contains_key(name)
            }
        };
        if taken {
            return Err(FlowError::ConfigError(format!(
                "port '{name}' declared twice with different kinds"
            )));
        }
        Ok(())
    }

    /// Declare a file in-port. Re-declaring the same file port is a no-op.
    pub fn add_in_file(&mut self, name: &str) -> Result<()> {
        if self.in_files.contains_key(name) {
            return Ok(());
        }
        self.ensure_unique(PortDirection::In, name)?;
        self.in_files.insert(name.to_string(), InPort::new(name));
        Ok(())
    }

    pub fn add_in_param(&mut self, name: &str) -> Result<()> {
        if self.in_params.contains_key(name) {
            return Ok(());
        }
        self.ensure_unique(PortDirection::In, name)?;
        self.in_params.insert(name.to_string(), InPort::new(name));
        Ok(())
    }

    pub fn add_out_file(&mut self, name: &str) -> Result<()> {
        if self.out_files.contains_key(name) {
            return Ok(());
        }
        self.ensure_unique(PortDirection::Out, name)?;
        self.out_files.insert(name.to_string(), OutPort::new(name));
        Ok(())
    }

    pub fn add_out_param(&mut self, name: &str) -> Result<()> {
        if self.out_params.contains_key(name) {
            return Ok(());
        }
        self.ensure_unique(PortDirection::Out, name)?;
        self.out_params.insert(name.to_string(), OutPort::new(name));
        Ok(())
    }

    pub fn kind_of(&self, direction: PortDirection, name: &str) -> Option<PortKind> {
        let (files, params) = match direction {
            PortDirection::In => (
                self.in_files.contains_key(name),
                self.in_params.contains_key(name),
            ),
            PortDirection::Out => (
                self.out_files.contains_key(name),
                self.out_params.contains_key(name),
            ),
        };
        match (files, params) {
            (true, _) => Some(PortKind::File),
            (_, true) => Some(PortKind::Param),
            _ => None,
        }
    }

    pub fn specs(&self) -> Vec<PortSpec> {
        let spec = |name: &String, direction, kind| PortSpec {
            name: name.clone(),
            direction,
            kind,
        };
        self.in_files
            .keys()
            .map(|n| spec(n, PortDirection::In, PortKind::File))
            .chain(self.in_params.keys().map(|n| spec(n, PortDirection::In, PortKind::Param)))
            .chain(self.out_files.keys().map(|n| spec(n, PortDirection::Out, PortKind::File)))
            .chain(self.out_params.keys().map(|n| spec(n, PortDirection::Out, PortKind::Param)))
            .collect()
    }

    pub fn has_inputs(&self) -> bool {
        !self.in_files.is_empty() || !self.in_params.is_empty()
    }

    pub fn in_file_mut(&mut self, name: &str) -> Option<&mut InPort<FileIp>> {
        self.in_files.get_mut(name)
    }

    pub fn in_param_mut(&mut self, name: &str) -> Option<&mut InPort<String>> {
        self.in_params.get_mut(name)
    }

    pub fn out_file_mut(&mut self, name: &str) -> Option<&mut OutPort<FileIp>> {
        self.out_files.get_mut(name)
    }

    pub fn out_param_mut(&mut self, name: &str) -> Option<&mut OutPort<String>> {
        self.out_params.get_mut(name)
    }

    pub fn in_file(&self, name: &str) -> Option<&InPort<FileIp>> {
        self.in_files.get(name)
    }

    pub fn in_param(&self, name: &str) -> Option<&InPort<String>> {
        self.in_params.get(name)
    }

    pub fn out_file(&self, name: &str) -> Option<&OutPort<FileIp>> {
        self.out_files.get(name)
    }

    pub fn out_param(&self, name: &str) -> Option<&OutPort<String>> {
        self.out_params.get(name)
    }

    pub fn out_file_names(&self) -> impl Iterator<Item = &str> {
        self.out_files.keys().map(String::as_str)
    }

    /// Remove an in-port and return it, for components that consume a port
    /// on their own schedule.
    pub fn take_in_file(&mut self, name: &str) -> Option<InPort<FileIp>> {
        self.in_files.remove(name)
    }

    /// Remove and return every param in-port.
    pub fn take_in_params(&mut self) -> BTreeMap<String, InPort<String>> {
        std::mem::take(&mut self.in_params)
    }

    pub fn unconnected_inputs(&self) -> Vec<String> {
        self.in_files
            .values()
            .filter(|p| !p.is_connected())
            .map(|p| p.name().to_string())
            .chain(
                self.in_params
                    .values()
                    .filter(|p| !p.is_connected())
                    .map(|p| p.name().to_string()),
            )
            .collect()
    }

    /// Names of out-ports with no consumer, as `(name, kind)`.
    pub fn dangling_outputs(&self) -> Vec<(String, PortKind)> {
        self.out_files
            .values()
            .filter(|p| !p.is_connected())
            .map(|p| (p.name().to_string(), PortKind::File))
            .chain(
                self.out_params
                    .values()
                    .filter(|p| !p.is_connected())
                    .map(|p| (p.name().to_string(), PortKind::Param)),
            )
            .collect()
    }

    /// Drop peers whose target process is not kept.
    pub fn retain_targets(&mut self, keep: impl Fn(&PortRef) -> bool) {
        for port in self.out_files.values_mut() {
            port.retain_targets(&keep);
        }
        for port in self.out_params.values_mut() {
            port.retain_targets(&keep);
        }
    }

    pub fn seal(&mut self) {
        for port in self.in_files.values_mut() {
            port.seal();
        }
        for port in self.in_params.values_mut() {
            port.seal();
        }
    }

    /// Receive one item from every in-port.
    ///
    /// Returns `None` as soon as any in-port is closed, or when the process
    /// has no in-ports at all.
    pub async fn receive_tuple(&mut self) -> Option<InputTuple> {
        if !self.has_inputs() {
            return None;
        }
        let mut tuple = InputTuple::default();
        for (name, port) in self.in_files.iter_mut() {
            let ip = port.recv().await?;
            debug!(port = %name, path = ?ip.path(), "received");
            tuple.files.insert(name.clone(), ip);
        }
        for (name, port) in self.in_params.iter_mut() {
            let value = port.recv().await?;
            debug!(port = %name, value = %value, "received param");
            tuple.params.insert(name.clone(), value);
        }
        Some(tuple)
    }

    /// Drain every in-port to the end, discarding the items.
    pub async fn drain_inputs(&mut self) {
        for port in self.in_files.values_mut() {
            while port.recv().await.is_some() {}
        }
        for port in self.in_params.values_mut() {
            while port.recv().await.is_some() {}
        }
    }

    pub async fn send_file(&self, port: &str, ip: FileIp) -> Result<()> {
        let out = self.out_files.get(port).ok_or_else(|| FlowError::UnknownPort {
            process: String::new(),
            port: port.to_string(),
        })?;
        out.send(ip).await;
        Ok(())
    }

    pub async fn send_param(&self, port: &str, value: String) -> Result<()> {
        let out = self.out_params.get(port).ok_or_else(|| FlowError::UnknownPort {
            process: String::new(),
            port: port.to_string(),
        })?;
        out.send(value).await;
        Ok(())
    }
}
