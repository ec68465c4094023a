// src/config/mod.rs

//! Declarative workflows in TOML.
//!
//! - [`model`] is the serde data model of the file.
//! - [`loader`] reads a file from disk.
//! - [`validate`] checks node references, `[workflow]` sanity and
//!   acyclicity, producing a [`ConfigFile`].
//! - [`build`] turns a [`ConfigFile`] into a runnable
//!   [`Workflow`](crate::engine::Workflow).

pub mod build;
pub mod loader;
pub mod model;
pub mod validate;

pub use build::build_workflow;
pub use loader::{default_config_path, load_and_validate, load_from_path, load_from_str};
pub use model::{ComponentConfig, ConfigFile, ParamSource, PathConfig, ProcessConfig, Sources};
pub use validate::validate_config;
