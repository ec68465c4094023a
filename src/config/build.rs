// src/config/build.rs

//! Turning a validated [`ConfigFile`] into a runnable [`Workflow`].

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::components::{
    BestCostGamma, Column, Criterion, CrossValStatsExtractor, FileGlobber, FinalModelSummarizer,
    MapToKeys, ParamPrinter, StreamToSubstream, Summarizer,
};
use crate::config::model::{ComponentConfig, ConfigFile, ParamSource, PathConfig, ProcessConfig};
use crate::engine::Workflow;
use crate::errors::Result;
use crate::exec::{PathPolicy, PathTemplate};
use crate::port::PortRef;
use crate::process::{Process, ShellProcess};

impl ConfigFile {
    /// Build the workflow: create every node, then connect the ports.
    pub fn build(&self) -> Result<Workflow> {
        build_workflow(self)
    }
}

pub fn build_workflow(cfg: &ConfigFile) -> Result<Workflow> {
    let mut wf = Workflow::new(&cfg.workflow.name, cfg.workflow.max_tasks);

    for (name, process) in &cfg.process {
        wf.add(shell_process(name, process)?)?;
    }
    for (name, component) in &cfg.component {
        wf.add_boxed(component_process(name, component)?)?;
    }

    for (name, process) in &cfg.process {
        for (port, sources) in &process.inputs {
            for reference in sources.refs() {
                wf.connect(PortRef::parse(reference)?, PortRef::new(name, port))?;
            }
        }
        connect_params(&mut wf, name, &process.params)?;
    }
    for (name, component) in &cfg.component {
        for (port, reference) in component.file_inputs() {
            wf.connect(PortRef::parse(reference)?, PortRef::new(name, port))?;
        }
        if let Some(params) = component.params() {
            connect_params(&mut wf, name, params)?;
        }
    }

    debug!(workflow = %wf.name(), "workflow built from config");
    Ok(wf)
}

fn connect_params(
    wf: &mut Workflow,
    name: &str,
    params: &BTreeMap<String, ParamSource>,
) -> Result<()> {
    for (param, source) in params {
        let target = PortRef::new(name, param);
        match source {
            ParamSource::Constant(value) => wf.connect_str(target, value.as_str())?,
            ParamSource::From { from } => wf.connect(PortRef::parse(from)?, target)?,
        }
    }
    Ok(())
}

fn path_policy(config: &PathConfig) -> Result<PathPolicy> {
    Ok(match config {
        PathConfig::Static(path) => PathPolicy::Static(path.clone()),
        PathConfig::Replace { input, old, new } => PathPolicy::Replace {
            input: input.clone(),
            old: old.clone(),
            new: new.clone(),
        },
        PathConfig::Extend { input, suffix } => PathPolicy::Extend {
            input: input.clone(),
            suffix: suffix.clone(),
        },
        PathConfig::Template(template) => {
            PathPolicy::Custom(Arc::new(PathTemplate::new(template)?))
        }
    })
}

fn shell_process(name: &str, config: &ProcessConfig) -> Result<ShellProcess> {
    let mut process = ShellProcess::new(name, &config.cmd)?;
    for (port, path) in &config.out {
        process = process.with_path(port, path_policy(path)?)?;
    }
    Ok(process)
}

fn component_process(name: &str, config: &ComponentConfig) -> Result<Box<dyn Process>> {
    Ok(match config {
        ComponentConfig::Summarizer {
            path,
            include_gamma,
            columns,
            ..
        } => {
            let mut summarizer = Summarizer::new(name, path.clone())?;
            if let Some(columns) = columns {
                summarizer = summarizer.with_columns(
                    columns
                        .iter()
                        .map(|c| Column::new(c.header.clone(), c.field.clone()))
                        .collect(),
                );
            } else if *include_gamma {
                summarizer = summarizer.with_gamma();
            }
            Box::new(summarizer)
        }
        ComponentConfig::BestCostGamma {
            criterion,
            include_gamma,
            ..
        } => {
            let criterion = match criterion.as_deref() {
                None | Some("class_average") => Criterion::ClassAverageFuzziness,
                Some(column) => Criterion::Column(column.to_string()),
            };
            Box::new(BestCostGamma::new(name, criterion, *include_gamma)?)
        }
        ComponentConfig::ParamPrinter { path, params } => {
            let mut printer = ParamPrinter::new(name, path.clone())?;
            for param in params.keys() {
                printer = printer.with_param(param)?;
            }
            Box::new(printer)
        }
        ComponentConfig::FinalModelSummarizer {
            path, join_params, ..
        } => {
            let mut summarizer = FinalModelSummarizer::new(name, path.clone())?;
            if let Some(params) = join_params {
                summarizer = summarizer.with_join_params(params.clone());
            }
            Box::new(summarizer)
        }
        ComponentConfig::CrossvalExtractor { confidence, .. } => Box::new(MapToKeys::new(
            name,
            CrossValStatsExtractor::new(*confidence),
        )?),
        ComponentConfig::FileGlob {
            root,
            patterns,
            exclude,
        } => Box::new(FileGlobber::new(name, root.clone(), patterns)?.with_exclude(exclude)?),
        ComponentConfig::Substream { .. } => Box::new(StreamToSubstream::new(name)?),
    })
}
