// src/components/final_model_summarizer.rs

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::errors::{FlowError, Result};
use crate::ip::{AuditInfo, FileIp};
use crate::port::Ports;
use crate::process::{Process, ProcessContext, ProcessFuture, ProcessStats};
use crate::types::ProcessState;

use super::{clear_stale_temp, write_tsv};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalSummaryPort {
    Model,
    TargetDataCount,
    Summary,
}

impl FinalSummaryPort {
    pub fn name(self) -> &'static str {
        match self {
            FinalSummaryPort::Model => "model",
            FinalSummaryPort::TargetDataCount => "target_data_count",
            FinalSummaryPort::Summary => "summary",
        }
    }
}

const HEADER: [&str; 17] = [
    "Gene",
    "Replicate",
    "Runset",
    "Accuracy",
    "Efficiency",
    "ObsFuzzClassAvg",
    "ObsFuzzOverall",
    "ObsFuzzActive",
    "ObsFuzzNonactive",
    "ClassConfidence",
    "ClassCredibility",
    "Cost",
    "ExecTimeMS",
    "SizeBytes",
    "ActiveCnt",
    "NonactiveCnt",
    "TotalCnt",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Counts {
    active: u64,
    nonactive: u64,
}

/// Joins every trained model with the active/nonactive counts of its
/// training data into one summary table.
///
/// Count IPs are drained completely first; models are then matched to them
/// by the values of the join params (`gene` and `runset` by default).
pub struct FinalModelSummarizer {
    name: String,
    path: PathBuf,
    join_params: Vec<String>,
    ports: Ports,
}

impl FinalModelSummarizer {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Result<Self> {
        let mut ports = Ports::new();
        ports.add_in_file(FinalSummaryPort::Model.name())?;
        ports.add_in_file(FinalSummaryPort::TargetDataCount.name())?;
        ports.add_out_file(FinalSummaryPort::Summary.name())?;
        Ok(Self {
            name: name.into(),
            path: path.into(),
            join_params: vec!["gene".to_string(), "runset".to_string()],
            ports,
        })
    }

    pub fn with_join_params(mut self, params: Vec<String>) -> Self {
        self.join_params = params;
        self
    }

    fn join_key(&self, ip: &FileIp) -> String {
        self.join_params
            .iter()
            .map(|p| ip.value(p).unwrap_or_default())
            .collect::<Vec<_>>()
            .join("_")
    }

    fn row(&self, model: &FileIp, counts: Counts) -> Vec<String> {
        let field = |name: &str| model.value(name).unwrap_or_default().to_string();
        let class_avg = match (
            model.value("obsfuzz_active").and_then(|v| v.parse::<f64>().ok()),
            model.value("obsfuzz_nonactive").and_then(|v| v.parse::<f64>().ok()),
        ) {
            (Some(a), Some(n)) => format!("{:.3}", (a + n) / 2.0),
            _ => String::new(),
        };
        vec![
            field("gene"),
            field("replicate"),
            field("runset"),
            field("accuracy"),
            field("efficiency"),
            class_avg,
            field("obsfuzz_overall"),
            field("obsfuzz_active"),
            field("obsfuzz_nonactive"),
            field("class_confidence"),
            field("class_credibility"),
            field("cost"),
            model.audit().exec_time_ms.to_string(),
            model.size().to_string(),
            counts.active.to_string(),
            counts.nonactive.to_string(),
            (counts.active + counts.nonactive).to_string(),
        ]
    }

    async fn run_loop(mut self, ctx: ProcessContext) -> Result<ProcessStats> {
        let mut stats = ProcessStats::default();
        ctx.claim(&self.path, &self.name)?;
        let (Some(mut models), Some(mut count_files)) = (
            self.ports.take_in_file(FinalSummaryPort::Model.name()),
            self.ports.take_in_file(FinalSummaryPort::TargetDataCount.name()),
        ) else {
            return Ok(stats);
        };
        let mut audit = AuditInfo::new(&self.name);

        if self.path.exists() {
            info!(process = %self.name, path = ?self.path, "final summary exists; draining input");
            while count_files.recv().await.is_some() {}
            while models.recv().await.is_some() {}
            let existing = FileIp::existing(&self.path, audit);
            self.ports
                .send_file(FinalSummaryPort::Summary.name(), existing)
                .await?;
            stats.record(ProcessState::Skipped);
            return Ok(stats);
        }

        let mut counts: HashMap<String, Counts> = HashMap::new();
        while let Some(ip) = count_files.recv().await {
            let parsed = parse_counts(&ip.read_to_string()?).ok_or_else(|| {
                FlowError::MalformedTable(format!(
                    "{}: expected '<active>\\t<nonactive>'",
                    ip.path().display()
                ))
            })?;
            let key = self.join_key(&ip);
            debug!(process = %self.name, key = %key, ?parsed, "counts loaded");
            counts.insert(key, parsed);
        }

        let mut rows = Vec::new();
        while let Some(model) = models.recv().await {
            let key = self.join_key(&model);
            let found = counts.get(&key).copied().unwrap_or_else(|| {
                warn!(process = %self.name, key = %key, "no data counts for model; using zeros");
                Counts::default()
            });
            rows.push(self.row(&model, found));
            audit.add_upstream(&model.path().to_string_lossy(), model.audit());
        }

        let target = FileIp::with_audit(&self.path, audit);
        {
            let _permit = ctx.acquire().await?;
            clear_stale_temp(&self.name, &target)?;
            write_tsv(&target, &HEADER, &rows)?;
        }
        self.ports
            .send_file(FinalSummaryPort::Summary.name(), target)
            .await?;
        stats.record(ProcessState::Computed);
        Ok(stats)
    }
}

fn parse_counts(contents: &str) -> Option<Counts> {
    let line = contents.lines().find(|l| !l.trim().is_empty())?;
    let mut fields = line.split('\t');
    let active = fields.next()?.trim().parse().ok()?;
    let nonactive = fields.next()?.trim().parse().ok()?;
    Some(Counts { active, nonactive })
}

impl Process for FinalModelSummarizer {
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
        format!(
            "final_model_summarizer joining on [{}] -> {}",
            self.join_params.join(", "),
            self.path.display()
        )
    }

    fn run(self: Box<Self>, ctx: ProcessContext) -> ProcessFuture {
        Box::pin((*self).run_loop(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_parse_tab_separated_pair() {
        assert_eq!(
            parse_counts("12\t340\n"),
            Some(Counts {
                active: 12,
                nonactive: 340
            })
        );
        assert_eq!(parse_counts("12 340\n"), None);
        assert_eq!(parse_counts(""), None);
    }

    #[test]
    fn row_joins_metrics_and_counts() {
        let s = FinalModelSummarizer::new("fin", "fin.tsv").unwrap();
        let mut audit = AuditInfo::new("train")
            .with_params([("gene", "AR"), ("runset", "orig"), ("replicate", "r1"), ("cost", "10")])
            .with_keys([("obsfuzz_active", "0.2"), ("obsfuzz_nonactive", "0.4")]);
        audit.exec_time_ms = 1500;
        let model = FileIp::with_audit("missing.jar", audit);
        assert_eq!(s.join_key(&model), "AR_orig");

        let row = s.row(
            &model,
            Counts {
                active: 3,
                nonactive: 7,
            },
        );
        assert_eq!(row.len(), HEADER.len());
        assert_eq!(&row[..3], &["AR", "r1", "orig"]);
        assert_eq!(row[5], "0.300");
        assert_eq!(row[11], "10");
        assert_eq!(row[12], "1500");
        assert_eq!(row[13], "0");
        assert_eq!(&row[14..], &["3", "7", "10"]);
    }
}
