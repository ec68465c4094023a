// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, ParamSource, RawConfigFile};
use crate::errors::{FlowError, Result};
use crate::port::PortRef;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = FlowError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(
            raw.workflow,
            raw.process,
            raw.component,
        ))
    }
}

/// Validate an already-built [`ConfigFile`] again, e.g. after editing it in
/// code.
pub fn validate_config(cfg: &ConfigFile) -> Result<()> {
    let raw = RawConfigFile {
        workflow: cfg.workflow.clone(),
        process: cfg.process.clone(),
        component: cfg.component.clone(),
    };
    validate_raw_config(&raw)
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_nodes(cfg)?;
    validate_workflow_section(cfg)?;
    ensure_unique_names(cfg)?;
    validate_references(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_nodes(cfg: &RawConfigFile) -> Result<()> {
    if cfg.process.is_empty() && cfg.component.is_empty() {
        return Err(FlowError::ConfigError(
            "config must contain at least one [process.<name>] or [component.<name>] section"
                .to_string(),
        ));
    }
    Ok(())
}

fn validate_workflow_section(cfg: &RawConfigFile) -> Result<()> {
    if cfg.workflow.max_tasks == 0 {
        return Err(FlowError::ConfigError(
            "[workflow].max_tasks must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.workflow.name.trim().is_empty() {
        return Err(FlowError::ConfigError(
            "[workflow].name must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn ensure_unique_names(cfg: &RawConfigFile) -> Result<()> {
    if let Some(name) = cfg.component.keys().find(|n| cfg.process.contains_key(*n)) {
        return Err(FlowError::ConfigError(format!(
            "'{name}' is declared both as a process and as a component"
        )));
    }
    Ok(())
}

fn is_node(cfg: &RawConfigFile, name: &str) -> bool {
    cfg.process.contains_key(name) || cfg.component.contains_key(name)
}

/// Every `(consumer, upstream reference)` edge declared in the file.
fn edges(cfg: &RawConfigFile) -> Vec<(&str, &str)> {
    let mut edges = Vec::new();
    for (name, process) in &cfg.process {
        for sources in process.inputs.values() {
            edges.extend(sources.refs().into_iter().map(|r| (name.as_str(), r)));
        }
        for source in process.params.values() {
            if let ParamSource::From { from } = source {
                edges.push((name.as_str(), from.as_str()));
            }
        }
    }
    for (name, component) in &cfg.component {
        edges.extend(
            component
                .file_inputs()
                .into_iter()
                .map(|(_, r)| (name.as_str(), r)),
        );
        if let Some(params) = component.params() {
            for source in params.values() {
                if let ParamSource::From { from } = source {
                    edges.push((name.as_str(), from.as_str()));
                }
            }
        }
    }
    edges
}

fn validate_references(cfg: &RawConfigFile) -> Result<()> {
    for (consumer, reference) in edges(cfg) {
        let upstream = PortRef::parse(reference)?;
        if !is_node(cfg, &upstream.process) {
            return Err(FlowError::ConfigError(format!(
                "'{consumer}' refers to unknown process '{}' in '{reference}'",
                upstream.process
            )));
        }
        if upstream.process == consumer {
            return Err(FlowError::ConfigError(format!(
                "'{consumer}' cannot consume its own output '{reference}'"
            )));
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: producer -> consumer.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for name in cfg.process.keys().chain(cfg.component.keys()) {
        graph.add_node(name.as_str());
    }
    for (consumer, reference) in edges(cfg) {
        if let Some((producer, _)) = reference.rsplit_once('.') {
            graph.add_edge(producer, consumer, ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(FlowError::DagCycle(format!(
            "cycle detected in workflow involving '{}'",
            cycle.node_id()
        ))),
    }
}
