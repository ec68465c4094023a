// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

/// Workflow declaration as read from a TOML file, before validation.
///
/// ```toml
/// [workflow]
/// name = "demo"
/// max_tasks = 4
///
/// [process.producer]
/// cmd = "echo hello > {o:out}"
/// out.out = { static = "dat/out.txt" }
///
/// [process.consumer]
/// cmd = "tr a-z A-Z < {i:in} > {o:upper}"
/// in.in = "producer.out"
/// out.upper = { extend = { input = "in", suffix = ".upper" } }
///
/// [component.summary]
/// kind = "summarizer"
/// path = "res/summary.tsv"
/// in = ["consumer.upper"]
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub workflow: WorkflowSection,

    /// Shell processes from `[process.<name>]`.
    #[serde(default)]
    pub process: BTreeMap<String, ProcessConfig>,

    /// Built-in components from `[component.<name>]`.
    #[serde(default)]
    pub component: BTreeMap<String, ComponentConfig>,
}

/// Validated configuration. Only constructed through
/// `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub workflow: WorkflowSection,
    pub process: BTreeMap<String, ProcessConfig>,
    pub component: BTreeMap<String, ComponentConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        workflow: WorkflowSection,
        process: BTreeMap<String, ProcessConfig>,
        component: BTreeMap<String, ComponentConfig>,
    ) -> Self {
        Self {
            workflow,
            process,
            component,
        }
    }
}

/// `[workflow]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowSection {
    #[serde(default = "default_name")]
    pub name: String,

    /// Maximum number of processes computing at the same time.
    #[serde(default = "default_max_tasks")]
    pub max_tasks: usize,
}

fn default_name() -> String {
    "workflow".to_string()
}

fn default_max_tasks() -> usize {
    4
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            name: default_name(),
            max_tasks: default_max_tasks(),
        }
    }
}

/// One or more `process.port` references feeding the same in-port.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Sources {
    One(String),
    Many(Vec<String>),
}

impl Sources {
    pub fn refs(&self) -> Vec<&str> {
        match self {
            Sources::One(s) => vec![s.as_str()],
            Sources::Many(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

/// Value of a param in-port: a constant, or another process' param out-port.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ParamSource {
    Constant(String),
    From { from: String },
}

/// Path policy of a file out-port.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathConfig {
    Static(PathBuf),
    Replace {
        input: String,
        old: String,
        new: String,
    },
    Extend {
        input: String,
        suffix: String,
    },
    /// Placeholder template such as `"{i:in|dir}/model_c{p:cost}.jar"`.
    Template(String),
}

/// `[process.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessConfig {
    /// Command template with `{i:..}`, `{o:..}` and `{p:..}` placeholders.
    pub cmd: String,

    /// File in-port -> upstream out-port(s).
    #[serde(default, rename = "in")]
    pub inputs: BTreeMap<String, Sources>,

    #[serde(default)]
    pub params: BTreeMap<String, ParamSource>,

    /// File out-port -> path policy.
    #[serde(default)]
    pub out: BTreeMap<String, PathConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ColumnConfig {
    pub header: String,
    pub field: String,
}

/// `[component.<name>]` section, selected by `kind`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComponentConfig {
    Summarizer {
        path: PathBuf,
        #[serde(rename = "in")]
        inputs: Sources,
        #[serde(default)]
        include_gamma: bool,
        #[serde(default)]
        columns: Option<Vec<ColumnConfig>>,
    },
    BestCostGamma {
        #[serde(rename = "in")]
        inputs: Sources,
        /// `"class_average"` (default) or the name of a numeric column.
        #[serde(default)]
        criterion: Option<String>,
        #[serde(default)]
        include_gamma: bool,
    },
    ParamPrinter {
        path: PathBuf,
        #[serde(default)]
        params: BTreeMap<String, ParamSource>,
    },
    FinalModelSummarizer {
        path: PathBuf,
        model: Sources,
        target_data_count: Sources,
        #[serde(default)]
        join_params: Option<Vec<String>>,
    },
    CrossvalExtractor {
        #[serde(rename = "in")]
        inputs: Sources,
        confidence: f64,
    },
    FileGlob {
        #[serde(default = "default_root")]
        root: PathBuf,
        patterns: Vec<String>,
        #[serde(default)]
        exclude: Vec<String>,
    },
    Substream {
        #[serde(rename = "in")]
        inputs: Sources,
    },
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

impl ComponentConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            ComponentConfig::Summarizer { .. } => "summarizer",
            ComponentConfig::BestCostGamma { .. } => "best_cost_gamma",
            ComponentConfig::ParamPrinter { .. } => "param_printer",
            ComponentConfig::FinalModelSummarizer { .. } => "final_model_summarizer",
            ComponentConfig::CrossvalExtractor { .. } => "crossval_extractor",
            ComponentConfig::FileGlob { .. } => "file_glob",
            ComponentConfig::Substream { .. } => "substream",
        }
    }

    /// `(in-port, upstream reference)` pairs for file inputs.
    pub fn file_inputs(&self) -> Vec<(&'static str, &str)> {
        match self {
            ComponentConfig::Summarizer { inputs, .. }
            | ComponentConfig::BestCostGamma { inputs, .. }
            | ComponentConfig::CrossvalExtractor { inputs, .. }
            | ComponentConfig::Substream { inputs, .. } => {
                inputs.refs().into_iter().map(|r| ("in", r)).collect()
            }
            ComponentConfig::FinalModelSummarizer {
                model,
                target_data_count,
                ..
            } => model
                .refs()
                .into_iter()
                .map(|r| ("model", r))
                .chain(
                    target_data_count
                        .refs()
                        .into_iter()
                        .map(|r| ("target_data_count", r)),
                )
                .collect(),
            ComponentConfig::ParamPrinter { .. } | ComponentConfig::FileGlob { .. } => Vec::new(),
        }
    }

    pub fn params(&self) -> Option<&BTreeMap<String, ParamSource>> {
        match self {
            ComponentConfig::ParamPrinter { params, .. } => Some(params),
            _ => None,
        }
    }
}
