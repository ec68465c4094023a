// src/components/file_glob.rs

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::info;

use crate::errors::Result;
use crate::ip::{AuditInfo, FileIp};
use crate::port::Ports;
use crate::process::{Process, ProcessContext, ProcessFuture, ProcessStats};

/// Source process emitting one IP per existing file under `root` whose
/// relative path matches one of the include globs and none of the excludes.
/// Files are emitted in sorted order.
pub struct FileGlobber {
    name: String,
    root: PathBuf,
    patterns: Vec<String>,
    include: GlobSet,
    exclude: Option<GlobSet>,
    ports: Ports,
}

impl FileGlobber {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>, patterns: &[String]) -> Result<Self> {
        let name = name.into();
        let include = build_globset(patterns)
            .with_context(|| format!("building include globset for '{name}'"))?;
        let mut ports = Ports::new();
        ports.add_out_file("out")?;
        Ok(Self {
            name,
            root: root.into(),
            patterns: patterns.to_vec(),
            include,
            exclude: None,
            ports,
        })
    }

    pub fn with_exclude(mut self, patterns: &[String]) -> Result<Self> {
        if !patterns.is_empty() {
            let set = build_globset(patterns)
                .with_context(|| format!("building exclude globset for '{}'", self.name))?;
            self.exclude = Some(set);
        }
        Ok(self)
    }

    fn matches(&self, rel_path: &str) -> bool {
        self.include.is_match(rel_path)
            && !self.exclude.as_ref().is_some_and(|ex| ex.is_match(rel_path))
    }

    /// Every matching file under the root, sorted.
    pub fn collect(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let entries = fs::read_dir(&dir)
                .with_context(|| format!("reading directory {}", dir.display()))?;
            for entry in entries {
                let path = entry?.path();
                if path.is_dir() {
                    stack.push(path);
                } else if path.is_file() && self.matches(&relative(&self.root, &path)) {
                    files.push(path);
                }
            }
        }
        files.sort();
        Ok(files)
    }

    async fn run_loop(self, _ctx: ProcessContext) -> Result<ProcessStats> {
        let files = self.collect()?;
        info!(process = %self.name, root = ?self.root, count = files.len(), "files matched");
        for path in files {
            let ip = FileIp::existing(path, AuditInfo::new(&self.name));
            self.ports.send_file("out", ip).await?;
        }
        Ok(ProcessStats::default())
    }
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

impl Process for FileGlobber {
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
        format!("file_glob {:?} under {}", self.patterns, self.root.display())
    }

    fn run(self: Box<Self>, ctx: ProcessContext) -> ProcessFuture {
        Box::pin((*self).run_loop(ctx))
    }
}
