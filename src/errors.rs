// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Configuration errors are raised while a workflow is being built or
//! validated, before any process starts. Everything else is an execution
//! error and aborts the whole run.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Process not found: {0}")]
    UnknownProcess(String),

    #[error("Process '{process}' has no port named '{port}'")]
    UnknownPort { process: String, port: String },

    #[error("In-port '{port}' of process '{process}' is not connected")]
    UnconnectedPort { process: String, port: String },

    #[error("Cannot connect {from} to {to}: {reason}")]
    PortKindMismatch {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Cycle detected in workflow graph: {0}")]
    DagCycle(String),

    #[error("Output target {path:?} is produced by both '{first}' and '{second}'")]
    DuplicateOutput {
        path: PathBuf,
        first: String,
        second: String,
    },

    #[error("Template error: {0}")]
    TemplateError(String),

    #[error("Process '{process}' failed: command exited with code {code}")]
    CommandFailed { process: String, code: i32 },

    #[error("Process '{process}' did not produce expected output {path:?}")]
    MissingOutput { process: String, path: PathBuf },

    #[error("Malformed table: {0}")]
    MalformedTable(String),

    #[error("Process task panicked: {0}")]
    ProcessPanicked(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FlowError {
    /// Whether this error was detected while building/validating the
    /// workflow, as opposed to while running it.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            FlowError::ConfigError(_)
                | FlowError::UnknownProcess(_)
                | FlowError::UnknownPort { .. }
                | FlowError::UnconnectedPort { .. }
                | FlowError::PortKindMismatch { .. }
                | FlowError::DagCycle(_)
                | FlowError::DuplicateOutput { .. }
                | FlowError::TemplateError(_)
                | FlowError::TomlError(_)
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, FlowError>;
