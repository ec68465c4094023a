#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;

use scidag::config::model::{
    ComponentConfig, ConfigFile, ParamSource, PathConfig, ProcessConfig, RawConfigFile, Sources,
    WorkflowSection,
};
use scidag::errors::Result;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                workflow: WorkflowSection::default(),
                process: BTreeMap::new(),
                component: BTreeMap::new(),
            },
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.config.workflow.name = name.to_string();
        self
    }

    pub fn max_tasks(mut self, n: usize) -> Self {
        self.config.workflow.max_tasks = n;
        self
    }

    pub fn with_process(mut self, name: &str, process: ProcessConfig) -> Self {
        self.config.process.insert(name.to_string(), process);
        self
    }

    pub fn with_component(mut self, name: &str, component: ComponentConfig) -> Self {
        self.config.component.insert(name.to_string(), component);
        self
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `ProcessConfig`.
pub struct ProcessConfigBuilder {
    process: ProcessConfig,
}

impl ProcessConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            process: ProcessConfig {
                cmd: cmd.to_string(),
                inputs: BTreeMap::new(),
                params: BTreeMap::new(),
                out: BTreeMap::new(),
            },
        }
    }

    /// Feed in-port `port` from `source` (`"process.port"`).
    pub fn input(mut self, port: &str, source: &str) -> Self {
        let sources = match self.process.inputs.remove(port) {
            None => Sources::One(source.to_string()),
            Some(Sources::One(first)) => Sources::Many(vec![first, source.to_string()]),
            Some(Sources::Many(mut all)) => {
                all.push(source.to_string());
                Sources::Many(all)
            }
        };
        self.process.inputs.insert(port.to_string(), sources);
        self
    }

    pub fn param(mut self, name: &str, value: &str) -> Self {
        self.process
            .params
            .insert(name.to_string(), ParamSource::Constant(value.to_string()));
        self
    }

    pub fn param_from(mut self, name: &str, source: &str) -> Self {
        self.process.params.insert(
            name.to_string(),
            ParamSource::From {
                from: source.to_string(),
            },
        );
        self
    }

    pub fn out_static(mut self, port: &str, path: impl AsRef<Path>) -> Self {
        self.process.out.insert(
            port.to_string(),
            PathConfig::Static(path.as_ref().to_path_buf()),
        );
        self
    }

    pub fn out_extend(mut self, port: &str, input: &str, suffix: &str) -> Self {
        self.process.out.insert(
            port.to_string(),
            PathConfig::Extend {
                input: input.to_string(),
                suffix: suffix.to_string(),
            },
        );
        self
    }

    pub fn out_template(mut self, port: &str, template: &str) -> Self {
        self.process
            .out
            .insert(port.to_string(), PathConfig::Template(template.to_string()));
        self
    }

    pub fn build(self) -> ProcessConfig {
        self.process
    }
}
