// src/exec/template.rs

//! Command-template parsing and rendering.
//!
//! Placeholders:
//! - `{i:port}` path of the IP received on file in-port `port`
//! - `{o:port}` temp path of the output on file out-port `port`
//! - `{p:name}` value received on param in-port `name`
//!
//! A placeholder may carry one modifier after `|`: `join:SEP`, `basename`,
//! `dir`, `lower` or `upper`. Braces that do not form a placeholder are kept
//! as literal text, so shell constructs like `${HOME}` or awk blocks survive.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::errors::{FlowError, Result};
use crate::ip::FileIp;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{(i|o|p):([A-Za-z0-9_\-]+)(?:\|([^}]*))?\}").expect("invalid placeholder regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Input,
    Output,
    Param,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modifier {
    Join(String),
    Basename,
    Dir,
    Lower,
    Upper,
}

impl Modifier {
    fn parse(s: &str) -> Result<Self> {
        if let Some(sep) = s.strip_prefix("join:") {
            return Ok(Modifier::Join(sep.to_string()));
        }
        match s {
            "basename" => Ok(Modifier::Basename),
            "dir" => Ok(Modifier::Dir),
            "lower" => Ok(Modifier::Lower),
            "upper" => Ok(Modifier::Upper),
            other => Err(FlowError::TemplateError(format!(
                "unknown placeholder modifier '{other}'"
            ))),
        }
    }

    fn apply(&self, value: String) -> String {
        match self {
            Modifier::Basename => Path::new(&value)
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Modifier::Dir => Path::new(&value)
                .parent()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Modifier::Lower => value.to_lowercase(),
            Modifier::Upper => value.to_uppercase(),
            // Join is applied while collecting substream members.
            Modifier::Join(_) => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Slot {
        kind: SlotKind,
        name: String,
        modifier: Option<Modifier>,
    },
}

/// Values a template is rendered against.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    pub inputs: BTreeMap<String, FileIp>,
    pub outputs: BTreeMap<String, PathBuf>,
    pub params: BTreeMap<String, String>,
}

/// A parsed command (or path) template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl CommandTemplate {
    pub fn parse(source: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut last = 0;
        for caps in PLACEHOLDER.captures_iter(source) {
            let Some(whole) = caps.get(0) else { continue };
            if whole.start() > last {
                segments.push(Segment::Literal(source[last..whole.start()].to_string()));
            }
            let kind = match &caps[1] {
                "i" => SlotKind::Input,
                "o" => SlotKind::Output,
                _ => SlotKind::Param,
            };
            let modifier = caps.get(3).map(|m| Modifier::parse(m.as_str())).transpose()?;
            segments.push(Segment::Slot {
                kind,
                name: caps[2].to_string(),
                modifier,
            });
            last = whole.end();
        }
        if last < source.len() {
            segments.push(Segment::Literal(source[last..].to_string()));
        }
        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    fn names(&self, wanted: SlotKind) -> BTreeSet<String> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Slot { kind, name, .. } if *kind == wanted => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// File in-ports referenced by `{i:..}`.
    pub fn inputs(&self) -> BTreeSet<String> {
        self.names(SlotKind::Input)
    }

    /// File out-ports referenced by `{o:..}`.
    pub fn outputs(&self) -> BTreeSet<String> {
        self.names(SlotKind::Output)
    }

    /// Param in-ports referenced by `{p:..}`.
    pub fn params(&self) -> BTreeSet<String> {
        self.names(SlotKind::Param)
    }

    pub fn render(&self, bindings: &Bindings) -> Result<String> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Slot {
                    kind,
                    name,
                    modifier,
                } => {
                    let value = resolve(*kind, name, modifier.as_ref(), bindings)?;
                    let value = match modifier {
                        Some(m) => m.apply(value),
                        None => value,
                    };
                    out.push_str(&value);
                }
            }
        }
        Ok(out)
    }
}

fn resolve(
    kind: SlotKind,
    name: &str,
    modifier: Option<&Modifier>,
    bindings: &Bindings,
) -> Result<String> {
    let missing = |what: &str| {
        FlowError::TemplateError(format!("no {what} bound for placeholder '{name}'"))
    };
    match kind {
        SlotKind::Input => {
            let ip = bindings.inputs.get(name).ok_or_else(|| missing("input"))?;
            if ip.is_substream() {
                let sep = match modifier {
                    Some(Modifier::Join(sep)) => sep.as_str(),
                    _ => " ",
                };
                let paths: Vec<String> = ip
                    .members()
                    .iter()
                    .map(|m| m.path().to_string_lossy().into_owned())
                    .collect();
                Ok(paths.join(sep))
            } else {
                Ok(ip.path().to_string_lossy().into_owned())
            }
        }
        SlotKind::Output => bindings
            .outputs
            .get(name)
            .map(|p| p.to_string_lossy().into_owned())
            .ok_or_else(|| missing("output")),
        SlotKind::Param => bindings
            .params
            .get(name)
            .cloned()
            .ok_or_else(|| missing("param")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ip::AuditInfo;

    fn bindings() -> Bindings {
        let mut b = Bindings::default();
        b.inputs.insert("data".into(), FileIp::new("dat/train.smi"));
        b.outputs.insert("model".into(), PathBuf::from("dat/model.jar.tmp"));
        b.params.insert("cost".into(), "10".into());
        b.params.insert("gene".into(), "PDE3A".into());
        b
    }

    #[test]
    fn declares_ports_from_placeholders() {
        let t = CommandTemplate::parse("train -i {i:data} -o {o:model} -c {p:cost} {p:cost}")
            .unwrap();
        assert_eq!(t.inputs().into_iter().collect::<Vec<_>>(), vec!["data"]);
        assert_eq!(t.outputs().into_iter().collect::<Vec<_>>(), vec!["model"]);
        assert_eq!(t.params().into_iter().collect::<Vec<_>>(), vec!["cost"]);
    }

    #[test]
    fn renders_paths_and_params() {
        let t = CommandTemplate::parse("train -i {i:data} -o {o:model} -c {p:cost}").unwrap();
        assert_eq!(
            t.render(&bindings()).unwrap(),
            "train -i dat/train.smi -o dat/model.jar.tmp -c 10"
        );
    }

    #[test]
    fn non_placeholder_braces_are_literal() {
        let t = CommandTemplate::parse("awk '{ print $1 }' {i:data} > ${HOME}/x").unwrap();
        assert_eq!(
            t.render(&bindings()).unwrap(),
            "awk '{ print $1 }' dat/train.smi > ${HOME}/x"
        );
    }

    #[test]
    fn modifiers() {
        let t = CommandTemplate::parse("{i:data|basename} {i:data|dir} {p:gene|lower} {p:gene|upper}")
            .unwrap();
        assert_eq!(t.render(&bindings()).unwrap(), "train.smi dat pde3a PDE3A");
    }

    #[test]
    fn join_renders_substream_members() {
        let mut b = Bindings::default();
        b.inputs.insert(
            "plots".into(),
            FileIp::substream(
                vec![FileIp::new("a.png"), FileIp::new("b.png")],
                AuditInfo::default(),
            ),
        );
        let joined = CommandTemplate::parse("merge {i:plots|join:,}").unwrap();
        assert_eq!(joined.render(&b).unwrap(), "merge a.png,b.png");
        let spaced = CommandTemplate::parse("merge {i:plots}").unwrap();
        assert_eq!(spaced.render(&b).unwrap(), "merge a.png b.png");
    }

    #[test]
    fn missing_binding_is_an_error() {
        let t = CommandTemplate::parse("echo {p:gamma}").unwrap();
        assert!(matches!(
            t.render(&bindings()),
            Err(FlowError::TemplateError(_))
        ));
    }

    #[test]
    fn unknown_modifier_is_rejected_at_parse() {
        assert!(CommandTemplate::parse("{i:x|reverse}").is_err());
    }
}
