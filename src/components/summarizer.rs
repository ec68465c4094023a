// src/components/summarizer.rs

use std::path::PathBuf;

use tracing::{debug, info};

use crate::errors::Result;
use crate::ip::{AuditInfo, FileIp};
use crate::port::Ports;
use crate::process::{Process, ProcessContext, ProcessFuture, ProcessStats};
use crate::types::ProcessState;

use super::{clear_stale_temp, write_tsv};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummarizerPort {
    In,
    Out,
}

impl SummarizerPort {
    pub fn name(self) -> &'static str {
        match self {
            SummarizerPort::In => "in",
            SummarizerPort::Out => "out",
        }
    }
}

/// Table column: header text and the audit field it is filled from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub header: String,
    pub field: String,
}

impl Column {
    pub fn new(header: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            field: field.into(),
        }
    }
}

const DEFAULT_COLUMNS: &[(&str, &str)] = &[
    ("Gene", "gene"),
    ("Efficiency", "efficiency"),
    ("Accuracy", "accuracy"),
    ("Validity", "validity"),
    ("ObsFuzzActive", "obsfuzz_active"),
    ("ObsFuzzNonactive", "obsfuzz_nonactive"),
    ("ObsFuzzOverall", "obsfuzz_overall"),
    ("ClassConfidence", "class_confidence"),
    ("ClassCredibility", "class_credibility"),
    ("Cost", "cost"),
];

/// Streaming reducer: one row per received IP, written as one TSV file.
///
/// Each cell is the IP's audit value (keys first, then params) for the
/// column's field. Rows keep arrival order.
pub struct Summarizer {
    name: String,
    path: PathBuf,
    columns: Vec<Column>,
    ports: Ports,
}

impl Summarizer {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Result<Self> {
        let mut ports = Ports::new();
        ports.add_in_file(SummarizerPort::In.name())?;
        ports.add_out_file(SummarizerPort::Out.name())?;
        Ok(Self {
            name: name.into(),
            path: path.into(),
            columns: DEFAULT_COLUMNS
                .iter()
                .map(|(h, f)| Column::new(*h, *f))
                .collect(),
            ports,
        })
    }

    /// Append a `Gamma` column.
    pub fn with_gamma(mut self) -> Self {
        self.columns.push(Column::new("Gamma", "gamma"));
        self
    }

    pub fn with_columns(mut self, columns: Vec<Column>) -> Self {
        self.columns = columns;
        self
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    fn row(&self, ip: &FileIp) -> Vec<String> {
        self.columns
            .iter()
            .map(|c| ip.value(&c.field).unwrap_or_default().to_string())
            .collect()
    }

    async fn run_loop(mut self, ctx: ProcessContext) -> Result<ProcessStats> {
        let mut stats = ProcessStats::default();
        ctx.claim(&self.path, &self.name)?;
        let Some(mut input) = self.ports.take_in_file(SummarizerPort::In.name()) else {
            return Ok(stats);
        };
        let mut audit = AuditInfo::new(&self.name);

        if self.path.exists() {
            info!(process = %self.name, path = ?self.path, "summary exists; draining input");
            while input.recv().await.is_some() {}
            let existing = FileIp::existing(&self.path, audit);
            self.ports
                .send_file(SummarizerPort::Out.name(), existing)
                .await?;
            stats.record(ProcessState::Skipped);
            return Ok(stats);
        }

        let mut rows = Vec::new();
        while let Some(ip) = input.recv().await {
            debug!(process = %self.name, path = ?ip.path(), "summarizing");
            rows.push(self.row(&ip));
            audit.add_upstream(&ip.path().to_string_lossy(), ip.audit());
        }

        let target = FileIp::with_audit(&self.path, audit);
        {
            let _permit = ctx.acquire().await?;
            clear_stale_temp(&self.name, &target)?;
            let header: Vec<&str> = self.columns.iter().map(|c| c.header.as_str()).collect();
            write_tsv(&target, &header, &rows)?;
        }
        self.ports
            .send_file(SummarizerPort::Out.name(), target)
            .await?;
        stats.record(ProcessState::Computed);
        Ok(stats)
    }
}

impl Process for Summarizer {
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
        format!("summarizer -> {}", self.path.display())
    }

    fn run(self: Box<Self>, ctx: ProcessContext) -> ProcessFuture {
        Box::pin((*self).run_loop(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_reads_keys_then_params_and_blanks_missing() {
        let s = Summarizer::new("sum", "x.tsv").unwrap();
        let audit = AuditInfo::new("p")
            .with_params([("gene", "AR"), ("cost", "10"), ("efficiency", "0.1")])
            .with_keys([("efficiency", "0.250")]);
        let ip = FileIp::with_audit("a", audit);
        let row = s.row(&ip);
        assert_eq!(row[0], "AR");
        assert_eq!(row[1], "0.250");
        assert_eq!(row[2], "");
        assert_eq!(row[9], "10");
    }

    #[test]
    fn gamma_column_is_appended() {
        let s = Summarizer::new("sum", "x.tsv").unwrap().with_gamma();
        assert_eq!(s.columns().last().unwrap().header, "Gamma");
        assert_eq!(s.columns().len(), DEFAULT_COLUMNS.len() + 1);
    }
}
