// src/components/map_to_keys.rs

//! Attach extracted metrics to passing IPs as audit keys.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use tracing::debug;

use crate::errors::{FlowError, Result};
use crate::ip::FileIp;
use crate::port::Ports;
use crate::process::{Process, ProcessContext, ProcessFuture, ProcessStats};
use crate::types::ProcessState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapToKeysPort {
    In,
    Out,
}

impl MapToKeysPort {
    pub fn name(self) -> &'static str {
        match self {
            MapToKeysPort::In => "in",
            MapToKeysPort::Out => "out",
        }
    }
}

/// Strategy turning an IP's contents into audit keys.
pub trait KeyExtractor: fmt::Debug + Send + Sync {
    fn extract(&self, ip: &FileIp) -> Result<BTreeMap<String, String>>;
}

/// Reads the JSON report of a conformal-prediction crossvalidation run and
/// extracts the metrics of one confidence level.
///
/// The report is either a single object or an array of objects, one per
/// confidence level; the entry whose `confidence` lies within 0.001 of the
/// requested level is used.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossValStatsExtractor {
    pub confidence: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CrossValStats {
    #[serde(default)]
    confidence: Option<f64>,
    efficiency: f64,
    accuracy: f64,
    class_confidence: f64,
    class_credibility: f64,
    observed_fuzziness: ObservedFuzziness,
}

#[derive(Debug, Deserialize)]
struct ObservedFuzziness {
    #[serde(rename = "A")]
    active: f64,
    #[serde(rename = "N")]
    nonactive: f64,
    overall: f64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CrossValReport {
    Many(Vec<CrossValStats>),
    One(CrossValStats),
}

const CONFIDENCE_TOLERANCE: f64 = 0.001;

impl CrossValStatsExtractor {
    pub fn new(confidence: f64) -> Self {
        Self { confidence }
    }

    fn select(&self, report: CrossValReport) -> Option<CrossValStats> {
        let matches = |s: &CrossValStats| {
            s.confidence
                .is_none_or(|c| (c - self.confidence).abs() <= CONFIDENCE_TOLERANCE)
        };
        match report {
            CrossValReport::One(stats) => matches(&stats).then_some(stats),
            CrossValReport::Many(all) => all
                .into_iter()
                .find(|s| s.confidence.is_some() && matches(s)),
        }
    }
}

impl KeyExtractor for CrossValStatsExtractor {
    fn extract(&self, ip: &FileIp) -> Result<BTreeMap<String, String>> {
        let report: CrossValReport = serde_json::from_str(&ip.read_to_string()?)?;
        let stats = self.select(report).ok_or_else(|| {
            FlowError::MalformedTable(format!(
                "{}: no crossvalidation entry for confidence {}",
                ip.path().display(),
                self.confidence
            ))
        })?;
        let f3 = |v: f64| format!("{v:.3}");
        Ok(BTreeMap::from([
            ("confidence".to_string(), f3(stats.confidence.unwrap_or(self.confidence))),
            ("accuracy".to_string(), f3(stats.accuracy)),
            ("validity".to_string(), f3(stats.accuracy)),
            ("efficiency".to_string(), f3(stats.efficiency)),
            ("class_confidence".to_string(), f3(stats.class_confidence)),
            ("class_credibility".to_string(), f3(stats.class_credibility)),
            ("obsfuzz_active".to_string(), f3(stats.observed_fuzziness.active)),
            ("obsfuzz_nonactive".to_string(), f3(stats.observed_fuzziness.nonactive)),
            ("obsfuzz_overall".to_string(), f3(stats.observed_fuzziness.overall)),
        ]))
    }
}

/// Forwards every IP with the keys produced by its extractor merged into its
/// audit info. The rewritten sidecar is persisted next to the file.
pub struct MapToKeys {
    name: String,
    extractor: Box<dyn KeyExtractor>,
    ports: Ports,
}

impl MapToKeys {
    pub fn new(name: impl Into<String>, extractor: impl KeyExtractor + 'static) -> Result<Self> {
        let mut ports = Ports::new();
        ports.add_in_file(MapToKeysPort::In.name())?;
        ports.add_out_file(MapToKeysPort::Out.name())?;
        Ok(Self {
            name: name.into(),
            extractor: Box::new(extractor),
            ports,
        })
    }

    async fn run_loop(mut self, ctx: ProcessContext) -> Result<ProcessStats> {
        let mut stats = ProcessStats::default();
        let Some(mut input) = self.ports.take_in_file(MapToKeysPort::In.name()) else {
            return Ok(stats);
        };
        while let Some(ip) = input.recv().await {
            let keyed = {
                let _permit = ctx.acquire().await?;
                let keys = self.extractor.extract(&ip)?;
                debug!(process = %self.name, path = ?ip.path(), ?keys, "keys extracted");
                let keyed = ip.with_keys(keys);
                keyed.write_audit()?;
                keyed
            };
            self.ports
                .send_file(MapToKeysPort::Out.name(), keyed)
                .await?;
            stats.record(ProcessState::Computed);
        }
        Ok(stats)
    }
}

impl Process for MapToKeys {
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
        format!("map_to_keys using {:?}", self.extractor)
    }

    fn run(self: Box<Self>, ctx: ProcessContext) -> ProcessFuture {
        Box::pin((*self).run_loop(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ip::AuditInfo;

    const REPORT: &str = r#"[
      {"confidence": 0.8, "efficiency": 0.5, "accuracy": 0.81, "classConfidence": 0.7,
       "classCredibility": 0.6, "observedFuzziness": {"A": 0.3, "N": 0.2, "overall": 0.25}},
      {"confidence": 0.9, "efficiency": 0.333, "accuracy": 0.917, "classConfidence": 0.855,
       "classCredibility": 0.631, "observedFuzziness": {"A": 0.253, "N": 0.207, "overall": 0.231}}
    ]"#;

    #[test]
    fn extracts_requested_confidence_level() {
        let dir = tempfile::tempdir().unwrap();
        let ip = FileIp::with_audit(
            dir.path().join("stats.json"),
            AuditInfo::new("crossval").with_params([("gene", "AR")]),
        );
        std::fs::write(ip.path(), REPORT).unwrap();

        let keys = CrossValStatsExtractor::new(0.9).extract(&ip).unwrap();
        assert_eq!(keys["efficiency"], "0.333");
        assert_eq!(keys["validity"], "0.917");
        assert_eq!(keys["obsfuzz_active"], "0.253");
        assert_eq!(keys["class_credibility"], "0.631");

        let keyed = ip.with_keys(keys);
        assert_eq!(keyed.param("gene"), Some("AR"));
        assert_eq!(keyed.key("obsfuzz_overall"), Some("0.231"));
    }

    #[test]
    fn missing_level_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let ip = FileIp::new(dir.path().join("stats.json"));
        std::fs::write(ip.path(), REPORT).unwrap();
        assert!(CrossValStatsExtractor::new(0.95).extract(&ip).is_err());
    }

    #[test]
    fn single_object_without_confidence_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let ip = FileIp::new(dir.path().join("stats.json"));
        std::fs::write(
            ip.path(),
            r#"{"efficiency": 0.4, "accuracy": 0.9, "classConfidence": 0.8,
                "classCredibility": 0.5, "observedFuzziness": {"A": 0.1, "N": 0.2, "overall": 0.15}}"#,
        )
        .unwrap();
        let keys = CrossValStatsExtractor::new(0.8).extract(&ip).unwrap();
        assert_eq!(keys["confidence"], "0.800");
        assert_eq!(keys["efficiency"], "0.400");
    }
}
