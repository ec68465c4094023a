// src/exec/path_policy.rs

//! How each file out-port names its output for a given input tuple.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::errors::{FlowError, Result};
use crate::exec::template::{Bindings, CommandTemplate};

/// Strategy computing an output path from the current input tuple.
pub trait PathFormatter: fmt::Debug + Send + Sync {
    fn format(&self, ctx: &Bindings) -> Result<PathBuf>;

    /// File in-ports the formatter reads, declared on the owning process.
    fn inputs(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }

    /// Param in-ports the formatter reads.
    fn params(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }
}

/// Formatter rendering `{i:..}` and `{p:..}` placeholders into a path.
#[derive(Debug, Clone)]
pub struct PathTemplate {
    template: CommandTemplate,
}

impl PathTemplate {
    pub fn new(source: &str) -> Result<Self> {
        let template = CommandTemplate::parse(source)?;
        if !template.outputs().is_empty() {
            return Err(FlowError::TemplateError(format!(
                "path template '{source}' cannot reference outputs"
            )));
        }
        Ok(Self { template })
    }
}

impl PathFormatter for PathTemplate {
    fn format(&self, ctx: &Bindings) -> Result<PathBuf> {
        Ok(PathBuf::from(self.template.render(ctx)?))
    }

    fn inputs(&self) -> BTreeSet<String> {
        self.template.inputs()
    }

    fn params(&self) -> BTreeSet<String> {
        self.template.params()
    }
}

#[derive(Debug, Clone)]
pub enum PathPolicy {
    /// A fixed path, the same for every input tuple.
    Static(PathBuf),
    /// The path of in-port `input` with the last occurrence of `old`
    /// replaced by `new`.
    Replace {
        input: String,
        old: String,
        new: String,
    },
    /// The path of in-port `input` with `suffix` appended.
    Extend { input: String, suffix: String },
    Custom(Arc<dyn PathFormatter>),
}

impl PathPolicy {
    pub fn resolve(&self, ctx: &Bindings) -> Result<PathBuf> {
        match self {
            PathPolicy::Static(path) => Ok(path.clone()),
            PathPolicy::Replace { input, old, new } => {
                let base = input_path(ctx, input)?;
                let base = base.to_string_lossy();
                let Some(idx) = base.rfind(old.as_str()) else {
                    return Err(FlowError::TemplateError(format!(
                        "'{old}' does not occur in input path '{base}'"
                    )));
                };
                let mut replaced = String::with_capacity(base.len());
                replaced.push_str(&base[..idx]);
                replaced.push_str(new);
                replaced.push_str(&base[idx + old.len()..]);
                Ok(PathBuf::from(replaced))
            }
            PathPolicy::Extend { input, suffix } => {
                let mut s = input_path(ctx, input)?.as_os_str().to_owned();
                s.push(suffix);
                Ok(PathBuf::from(s))
            }
            PathPolicy::Custom(formatter) => formatter.format(ctx),
        }
    }

    pub fn static_path(&self) -> Option<&Path> {
        match self {
            PathPolicy::Static(path) => Some(path),
            _ => None,
        }
    }

    pub fn inputs(&self) -> BTreeSet<String> {
        match self {
            PathPolicy::Static(_) => BTreeSet::new(),
            PathPolicy::Replace { input, .. } | PathPolicy::Extend { input, .. } => {
                BTreeSet::from([input.clone()])
            }
            PathPolicy::Custom(formatter) => formatter.inputs(),
        }
    }

    pub fn params(&self) -> BTreeSet<String> {
        match self {
            PathPolicy::Custom(formatter) => formatter.params(),
            _ => BTreeSet::new(),
        }
    }
}

impl fmt::Display for PathPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathPolicy::Static(path) => write!(f, "static {}", path.display()),
            PathPolicy::Replace { input, old, new } => {
                write!(f, "replace '{old}' -> '{new}' in {{i:{input}}}")
            }
            PathPolicy::Extend { input, suffix } => write!(f, "{{i:{input}}}{suffix}"),
            PathPolicy::Custom(formatter) => write!(f, "custom {formatter:?}"),
        }
    }
}

fn input_path<'a>(ctx: &'a Bindings, input: &str) -> Result<&'a Path> {
    let ip = ctx.inputs.get(input).ok_or_else(|| {
        FlowError::TemplateError(format!("path policy refers to unbound input '{input}'"))
    })?;
    if ip.is_substream() {
        return Err(FlowError::TemplateError(format!(
            "path policy cannot derive a path from substream input '{input}'"
        )));
    }
    Ok(ip.path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ip::FileIp;

    fn ctx() -> Bindings {
        let mut b = Bindings::default();
        b.inputs
            .insert("in".into(), FileIp::new("dat/gene/gene.train.smi"));
        b.params.insert("cost".into(), "10".into());
        b
    }

    #[test]
    fn replace_targets_last_occurrence() {
        let policy = PathPolicy::Replace {
            input: "in".into(),
            old: "gene".into(),
            new: "AR".into(),
        };
        assert_eq!(
            policy.resolve(&ctx()).unwrap(),
            PathBuf::from("dat/gene/AR.train.smi")
        );
    }

    #[test]
    fn replace_without_match_is_an_error() {
        let policy = PathPolicy::Replace {
            input: "in".into(),
            old: ".csv".into(),
            new: ".tsv".into(),
        };
        assert!(policy.resolve(&ctx()).is_err());
    }

    #[test]
    fn extend_appends_suffix() {
        let policy = PathPolicy::Extend {
            input: "in".into(),
            suffix: ".counts".into(),
        };
        assert_eq!(
            policy.resolve(&ctx()).unwrap(),
            PathBuf::from("dat/gene/gene.train.smi.counts")
        );
        assert_eq!(policy.inputs(), BTreeSet::from(["in".to_string()]));
    }

    #[test]
    fn custom_template_uses_inputs_and_params() {
        let tpl = PathTemplate::new("{i:in|dir}/model_c{p:cost}.jar").unwrap();
        let policy = PathPolicy::Custom(Arc::new(tpl));
        assert_eq!(
            policy.resolve(&ctx()).unwrap(),
            PathBuf::from("dat/gene/model_c10.jar")
        );
        assert_eq!(policy.params(), BTreeSet::from(["cost".to_string()]));
    }

    #[test]
    fn path_template_rejects_outputs() {
        assert!(PathTemplate::new("{o:x}.bak").is_err());
    }
}
