// src/ip/packet.rs

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::errors::Result;
use crate::ip::audit::AuditInfo;

/// Suffix appended to a final path while it is being produced.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Suffix of the JSON audit sidecar stored next to each artifact.
pub const AUDIT_SUFFIX: &str = ".audit.json";

/// File-backed information packet.
///
/// The path never changes after construction. Producers write to
/// [`FileIp::temp_path`] and call [`FileIp::atomize`] once the write is
/// complete, so a final path only ever holds a finished artifact.
#[derive(Debug, Clone)]
pub struct FileIp {
    path: PathBuf,
    audit: Arc<AuditInfo>,
    substream: Vec<FileIp>,
}

impl FileIp {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            audit: Arc::new(AuditInfo::default()),
            substream: Vec::new(),
        }
    }

    pub fn with_audit(path: impl Into<PathBuf>, audit: AuditInfo) -> Self {
        Self {
            path: path.into(),
            audit: Arc::new(audit),
            substream: Vec::new(),
        }
    }

    /// Container IP holding a list of member IPs and no file of its own.
    pub fn substream(members: Vec<FileIp>, audit: AuditInfo) -> Self {
        Self {
            path: PathBuf::new(),
            audit: Arc::new(audit),
            substream: members,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn temp_path(&self) -> PathBuf {
        suffixed(&self.path, TEMP_SUFFIX)
    }

    pub fn audit_path(&self) -> PathBuf {
        suffixed(&self.path, AUDIT_SUFFIX)
    }

    pub fn audit(&self) -> &AuditInfo {
        &self.audit
    }

    pub fn members(&self) -> &[FileIp] {
        &self.substream
    }

    pub fn is_substream(&self) -> bool {
        self.path.as_os_str().is_empty()
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.audit.param(name)
    }

    pub fn key(&self, name: &str) -> Option<&str> {
        self.audit.key(name)
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.audit.value(name)
    }

    /// Whether the finalized artifact is present.
    pub fn exists(&self) -> bool {
        !self.is_substream() && self.path.exists()
    }

    pub fn temp_exists(&self) -> bool {
        !self.is_substream() && self.temp_path().exists()
    }

    /// Size of the finalized artifact in bytes, 0 if it does not exist.
    pub fn size(&self) -> u64 {
        fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    /// Create parent directories of the temp path.
    pub fn prepare_temp(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    /// Open the temp path for writing, creating parent directories.
    pub fn open_write_temp(&self) -> Result<File> {
        self.prepare_temp()?;
        Ok(File::create(self.temp_path())?)
    }

    /// Write the full contents to the temp path. Call [`FileIp::atomize`]
    /// afterwards to publish them.
    pub fn write(&self, contents: &[u8]) -> Result<()> {
        let mut file = self.open_write_temp()?;
        file.write_all(contents)?;
        file.sync_all()?;
        Ok(())
    }

    /// Promote the temp file to the final path and persist the audit sidecar.
    pub fn atomize(&self) -> Result<()> {
        let temp = self.temp_path();
        debug!(from = ?temp, to = ?self.path, "atomizing");
        fs::rename(&temp, &self.path)?;
        self.write_audit()
    }

    pub fn write_audit(&self) -> Result<()> {
        self.audit.save(&self.audit_path())
    }

    /// Remove a leftover temp file from an interrupted run.
    pub fn remove_temp(&self) -> Result<()> {
        let temp = self.temp_path();
        if temp.is_dir() {
            fs::remove_dir_all(&temp)?;
        } else if temp.exists() {
            fs::remove_file(&temp)?;
        }
        Ok(())
    }

    pub fn read(&self) -> Result<Vec<u8>> {
        Ok(fs::read(&self.path)?)
    }

    pub fn read_to_string(&self) -> Result<String> {
        Ok(fs::read_to_string(&self.path)?)
    }

    /// Same file with additional audit keys merged in.
    pub fn with_keys<I, K, V>(&self, keys: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let audit = self.audit.as_ref().clone().with_keys(keys);
        Self {
            path: self.path.clone(),
            audit: Arc::new(audit),
            substream: self.substream.clone(),
        }
    }

    /// Handle to an existing artifact, using its sidecar audit info when it
    /// can be read and `fallback` otherwise.
    pub fn existing(path: impl Into<PathBuf>, fallback: AuditInfo) -> Self {
        let ip = Self::new(path);
        let audit = AuditInfo::load(&ip.audit_path()).unwrap_or(fallback);
        Self {
            audit: Arc::new(audit),
            ..ip
        }
    }
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}
