// src/components/mod.rs

//! Built-in processes that aggregate, select and reshape the dataflow.
//!
//! - [`summarizer`]: one TSV row per incoming IP.
//! - [`best_cost_gamma`]: picks the best hyperparameter row of a table and
//!   emits its values on param ports.
//! - [`param_printer`]: writes `name=value` lines for a set of param inputs.
//! - [`final_model_summarizer`]: joins model IPs with their data counts.
//! - [`map_to_keys`]: attaches extracted keys to passing IPs.
//! - [`file_glob`]: emits existing files matching a glob.
//! - [`substream`]: gathers a whole stream into one container IP.
//!
//! Each component declares a fixed set of ports through its own port-role
//! enum; only [`param_printer::ParamPrinter`] has a variadic set.

pub mod best_cost_gamma;
pub mod file_glob;
pub mod final_model_summarizer;
pub mod map_to_keys;
pub mod param_printer;
pub mod substream;
pub mod summarizer;

use tracing::{info, warn};

use crate::errors::Result;
use crate::ip::FileIp;

pub use best_cost_gamma::{BestCostGamma, BestPort, Criterion, Selection, select_best};
pub use file_glob::FileGlobber;
pub use final_model_summarizer::{FinalModelSummarizer, FinalSummaryPort};
pub use map_to_keys::{CrossValStatsExtractor, KeyExtractor, MapToKeys, MapToKeysPort};
pub use param_printer::{ParamPrinter, ParamPrinterPort};
pub use substream::{StreamToSubstream, SubstreamPort};
pub use summarizer::{Column, Summarizer, SummarizerPort};

/// Remove a temp file left behind by an interrupted run.
pub(crate) fn clear_stale_temp(process: &str, target: &FileIp) -> Result<()> {
    if target.temp_exists() {
        warn!(
            process = %process,
            path = ?target.temp_path(),
            "removing stale temp output from an earlier run"
        );
        target.remove_temp()?;
    }
    Ok(())
}

/// Write a tab-separated table to the target's temp path and atomize it.
pub(crate) fn write_tsv(target: &FileIp, header: &[&str], rows: &[Vec<String>]) -> Result<()> {
    let file = target.open_write_temp()?;
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(file);
    writer.write_record(header)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    target.atomize()?;
    info!(path = ?target.path(), rows = rows.len(), "table written");
    Ok(())
}

/// Write raw text to the target's temp path and atomize it.
pub(crate) fn write_text(target: &FileIp, contents: &str) -> Result<()> {
    target.write(contents.as_bytes())?;
    target.atomize()
}
