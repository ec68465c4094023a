// src/ip/audit.rs

//! Audit metadata attached to every information packet.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Provenance of one IP: which process made it, with what parameters, and
/// from which upstream IPs.
///
/// Params and keys accumulate monotonically along the DAG: a derived IP holds
/// the union of its inputs' maps, with downstream values overriding upstream
/// ones on conflict.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditInfo {
    #[serde(default)]
    pub process: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub keys: BTreeMap<String, String>,
    #[serde(default)]
    pub exec_time_ms: u64,
    /// Audit info of each input that contributed, keyed by its path.
    #[serde(default)]
    pub upstream: BTreeMap<String, AuditInfo>,
}

impl AuditInfo {
    pub fn new(process: impl Into<String>) -> Self {
        Self {
            process: process.into(),
            ..Self::default()
        }
    }

    /// Fold an upstream IP's audit info into this one.
    ///
    /// Values already present are overwritten: callers merge inputs first and
    /// their own params last.
    pub fn merge_upstream(&mut self, path: &str, upstream: &AuditInfo) {
        for (k, v) in &upstream.params {
            self.params.insert(k.clone(), v.clone());
        }
        for (k, v) in &upstream.keys {
            self.keys.insert(k.clone(), v.clone());
        }
        self.upstream.insert(path.to_string(), upstream.clone());
    }

    /// Record `upstream` as a contributing input without taking over its
    /// params or keys. Reducers over many sibling IPs use this, since the
    /// siblings' values conflict.
    pub fn add_upstream(&mut self, path: &str, upstream: &AuditInfo) {
        self.upstream.insert(path.to_string(), upstream.clone());
    }

    pub fn with_params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in params {
            self.params.insert(k.into(), v.into());
        }
        self
    }

    pub fn with_keys<I, K, V>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in keys {
            self.keys.insert(k.into(), v.into());
        }
        self
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn key(&self, name: &str) -> Option<&str> {
        self.keys.get(name).map(String::as_str)
    }

    /// Look a field up among the keys first, then the params.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.key(name).or_else(|| self.param(name))
    }

    /// Load audit info from a JSON sidecar.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Persist as pretty JSON, through a temp file renamed into place.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}
