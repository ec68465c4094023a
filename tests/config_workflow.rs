// tests/config_workflow.rs

mod common;
use crate::common::builders::{ConfigFileBuilder, ProcessConfigBuilder};
use crate::common::init_tracing;

use std::error::Error;
use std::fs;
use std::path::Path;

use scidag::cli::CliArgs;
use scidag::config::load_and_validate;
use scidag::errors::FlowError;

type TestResult = Result<(), Box<dyn Error>>;

fn write_workflow(dir: &Path, body: &str) -> Result<String, Box<dyn Error>> {
    let path = dir.join("Workflow.toml");
    fs::write(&path, body)?;
    Ok(path.to_string_lossy().into_owned())
}

fn shell_workflow(dir: &Path) -> String {
    let d = dir.display();
    format!(
        r#"
[workflow]
name = "toml-demo"
max_tasks = 2

[process.hello]
cmd = "printf hello > {{o:out}}"
out.out = {{ static = '{d}/hello.txt' }}

[process.shout]
cmd = "tr a-z A-Z < {{i:in}} > {{o:up}}"
in.in = "hello.out"
out.up = {{ extend = {{ input = "in", suffix = ".up" }} }}

[component.params]
kind = "param_printer"
path = '{d}/params.txt'
params.cost = "10"
params.gamma = "0.5"

[component.summary]
kind = "summarizer"
path = '{d}/summary.tsv'
in = "shout.up"
"#
    )
}

#[cfg(unix)]
#[tokio::test]
async fn toml_workflow_runs_end_to_end() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let path = write_workflow(dir.path(), &shell_workflow(dir.path()))?;

    let report = load_and_validate(&path)?.build()?.run().await?;
    assert_eq!(report.stats("hello").map(|s| s.computed), Some(1));
    assert_eq!(fs::read_to_string(dir.path().join("hello.txt.up"))?, "HELLO");
    assert_eq!(
        fs::read_to_string(dir.path().join("params.txt"))?,
        "cost=10\ngamma=0.5\n"
    );
    assert!(dir.path().join("summary.tsv").exists());

    let again = load_and_validate(&path)?.build()?.run().await?;
    assert_eq!(again.total_computed(), 0);
    Ok(())
}

#[tokio::test]
async fn dry_run_only_describes() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let path = write_workflow(dir.path(), &shell_workflow(dir.path()))?;

    let wf = load_and_validate(&path)?.build()?;
    wf.validate()?;
    let listing = wf.describe();
    assert!(listing.contains("workflow 'toml-demo' (max_tasks = 2)"));
    for name in ["hello", "shout", "params", "summary"] {
        assert!(listing.contains(&format!("- {name}")), "missing {name}");
    }
    assert!(listing.contains("hello.out"));

    let args = CliArgs {
        config: path,
        max_tasks: None,
        run_to: None,
        log_level: None,
        dry_run: true,
    };
    scidag::run(args).await?;
    assert!(!dir.path().join("hello.txt").exists());
    Ok(())
}

#[tokio::test]
async fn invalid_run_to_pattern_is_reported() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = write_workflow(dir.path(), &shell_workflow(dir.path()))?;
    let args = CliArgs {
        config: path,
        max_tasks: None,
        run_to: Some("(".into()),
        log_level: None,
        dry_run: true,
    };
    assert!(scidag::run(args).await.is_err());
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() {
    let err = load_and_validate("/definitely/not/here/Workflow.toml").unwrap_err();
    assert!(matches!(err, FlowError::IoError(_)));
}

#[test]
fn unknown_keys_are_rejected() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = write_workflow(
        dir.path(),
        r#"
[process.a]
cmd = "true"
colour = "blue"
"#,
    )?;
    let err = load_and_validate(&path).unwrap_err();
    assert!(matches!(err, FlowError::TomlError(_)));
    Ok(())
}

#[test]
fn unconnected_in_port_is_rejected_before_running() -> TestResult {
    let cfg = ConfigFileBuilder::new()
        .with_process(
            "lonely",
            ProcessConfigBuilder::new("cat {i:in} > {o:out}")
                .out_static("out", "lonely.txt")
                .build(),
        )
        .build();
    let err = cfg.build()?.validate().unwrap_err();
    assert!(matches!(
        err,
        FlowError::UnconnectedPort { ref process, ref port } if process == "lonely" && port == "in"
    ));
    assert!(err.is_config_error());
    Ok(())
}

#[test]
fn cycles_are_rejected() {
    let err = ConfigFileBuilder::new()
        .with_process(
            "a",
            ProcessConfigBuilder::new("cat {i:in} > {o:out}")
                .input("in", "b.out")
                .out_static("out", "a.txt")
                .build(),
        )
        .with_process(
            "b",
            ProcessConfigBuilder::new("cat {i:in} > {o:out}")
                .input("in", "a.out")
                .out_static("out", "b.txt")
                .build(),
        )
        .try_build()
        .unwrap_err();
    assert!(matches!(err, FlowError::DagCycle(_)));
}

#[test]
fn param_port_cannot_feed_file_port() {
    let cfg = ConfigFileBuilder::new()
        .with_process(
            "train",
            ProcessConfigBuilder::new("train -c {p:cost} > {o:model}")
                .param("cost", "1")
                .out_static("model", "model.jar")
                .build(),
        )
        .with_component(
            "best",
            scidag::config::ComponentConfig::BestCostGamma {
                inputs: scidag::config::Sources::One("train.model".into()),
                criterion: None,
                include_gamma: false,
            },
        )
        .with_process(
            "report",
            ProcessConfigBuilder::new("cat {i:in} > {o:out}")
                .input("in", "best.best_cost")
                .out_static("out", "report.txt")
                .build(),
        )
        .build();
    let err = cfg.build().err().unwrap();
    assert!(matches!(err, FlowError::PortKindMismatch { .. }));
}

#[test]
fn duplicate_static_outputs_are_rejected() -> TestResult {
    let cfg = ConfigFileBuilder::new()
        .with_process(
            "a",
            ProcessConfigBuilder::new("echo a > {o:out}")
                .out_static("out", "same.txt")
                .build(),
        )
        .with_process(
            "b",
            ProcessConfigBuilder::new("echo b > {o:out}")
                .out_static("out", "same.txt")
                .build(),
        )
        .build();
    let err = cfg.build()?.validate().unwrap_err();
    assert!(matches!(err, FlowError::DuplicateOutput { .. }));
    Ok(())
}

#[test]
fn param_from_upstream_port_is_wired() -> TestResult {
    let cfg = ConfigFileBuilder::new()
        .name("wired")
        .max_tasks(1)
        .with_process(
            "train",
            ProcessConfigBuilder::new("train > {o:model}")
                .out_static("model", "model.jar")
                .build(),
        )
        .with_component(
            "best",
            scidag::config::ComponentConfig::BestCostGamma {
                inputs: scidag::config::Sources::One("train.model".into()),
                criterion: Some("Efficiency".into()),
                include_gamma: false,
            },
        )
        .with_process(
            "final",
            ProcessConfigBuilder::new("train -c {p:cost} > {o:model}")
                .param_from("cost", "best.best_cost")
                .out_template("model", "final_c{p:cost}.jar")
                .build(),
        )
        .build();
    let wf = cfg.build()?;
    wf.validate()?;
    assert_eq!(wf.graph().dependencies_of("final"), vec!["best"]);
    Ok(())
}
