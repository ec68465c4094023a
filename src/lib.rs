// src/lib.rs

//! Dataflow workflows of command-line tools.
//!
//! Processes exchange file-backed information packets over typed ports.
//! Each process runs as its own tokio task; outputs are written to a temp
//! path and renamed into place, and a step whose outputs all exist is
//! skipped, so re-running a workflow resumes where it stopped.

pub mod cli;
pub mod components;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod ip;
pub mod logging;
pub mod port;
pub mod process;
pub mod types;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;

pub use crate::engine::{RunReport, Workflow};
pub use crate::errors::FlowError;

/// High-level entry point used by `main.rs`: load the workflow file, apply
/// the CLI overrides, then either describe or run the workflow.
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)
        .with_context(|| format!("loading workflow file '{}'", args.config))?;
    let mut workflow = cfg.build()?;

    if let Some(max_tasks) = args.max_tasks {
        workflow.set_max_tasks(max_tasks);
    }
    if let Some(pattern) = &args.run_to {
        let re = Regex::new(pattern).with_context(|| format!("invalid --run-to regex '{pattern}'"))?;
        workflow.set_run_to(re);
    }

    if args.dry_run {
        workflow.validate()?;
        print!("{}", workflow.describe());
        debug!("dry-run complete (no execution)");
        return Ok(());
    }

    let report = workflow.run().await?;
    for (name, stats) in &report.processes {
        info!(
            process = %name,
            computed = stats.computed,
            skipped = stats.skipped,
            "summary"
        );
    }
    Ok(())
}
