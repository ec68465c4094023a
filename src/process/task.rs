// src/process/task.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::ip::FileIp;

/// One execution of a process for one input tuple.
///
/// Handed to a [`TaskExecutor`](crate::exec::TaskExecutor), which must write
/// each output to [`Task::out_temp_path`].
#[derive(Debug, Clone)]
pub struct Task {
    process: String,
    command: String,
    inputs: BTreeMap<String, FileIp>,
    outputs: BTreeMap<String, FileIp>,
    params: BTreeMap<String, String>,
}

impl Task {
    pub fn new(
        process: impl Into<String>,
        command: impl Into<String>,
        inputs: BTreeMap<String, FileIp>,
        outputs: BTreeMap<String, FileIp>,
        params: BTreeMap<String, String>,
    ) -> Self {
        Self {
            process: process.into(),
            command: command.into(),
            inputs,
            outputs,
            params,
        }
    }

    pub fn process(&self) -> &str {
        &self.process
    }

    /// The rendered command line, with outputs pointing at temp paths.
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn in_ip(&self, port: &str) -> Option<&FileIp> {
        self.inputs.get(port)
    }

    pub fn in_path(&self, port: &str) -> Option<&Path> {
        self.inputs.get(port).map(FileIp::path)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn out_ip(&self, port: &str) -> Option<&FileIp> {
        self.outputs.get(port)
    }

    pub fn out_path(&self, port: &str) -> Option<&Path> {
        self.outputs.get(port).map(FileIp::path)
    }

    pub fn out_temp_path(&self, port: &str) -> Option<PathBuf> {
        self.outputs.get(port).map(FileIp::temp_path)
    }

    pub fn outputs(&self) -> impl Iterator<Item = (&str, &FileIp)> {
        self.outputs.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn into_outputs(self) -> BTreeMap<String, FileIp> {
        self.outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_expose_bound_ports() {
        let task = Task::new(
            "train",
            "train dat/a.smi > dat/a.jar.tmp",
            BTreeMap::from([("data".to_string(), FileIp::new("dat/a.smi"))]),
            BTreeMap::from([("model".to_string(), FileIp::new("dat/a.jar"))]),
            BTreeMap::from([("cost".to_string(), "10".to_string())]),
        );

        assert_eq!(task.in_path("data"), Some(Path::new("dat/a.smi")));
        assert!(task.in_ip("data").is_some_and(|ip| !ip.is_substream()));
        assert_eq!(task.out_path("model"), Some(Path::new("dat/a.jar")));
        assert_eq!(task.out_temp_path("model"), Some(PathBuf::from("dat/a.jar.tmp")));
        assert_eq!(task.out_ip("model").map(FileIp::path), task.out_path("model"));
        assert_eq!(task.param("cost"), Some("10"));
        assert!(task.in_path("missing").is_none());
        assert_eq!(task.outputs().count(), 1);
    }
}
