// src/exec/mod.rs

//! Execution layer.
//!
//! - [`template`] parses `{i:..}`/`{o:..}`/`{p:..}` command templates and
//!   renders them against a set of bindings.
//! - [`path_policy`] decides where each output file goes.
//! - [`command`] holds the `TaskExecutor` strategy trait and the default
//!   `sh -c` implementation built on `tokio::process::Command`.

pub mod command;
pub mod path_policy;
pub mod template;

pub use command::{ShellExecutor, TaskExecutor, TaskFuture, run_shell};
pub use path_policy::{PathFormatter, PathPolicy, PathTemplate};
pub use template::{Bindings, CommandTemplate};
