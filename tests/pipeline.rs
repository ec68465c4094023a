// tests/pipeline.rs

mod common;
use crate::common::counting_executor::CountingExecutor;
use crate::common::{init_tracing, with_timeout};

use std::error::Error;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use regex::Regex;
use scidag::errors::FlowError;
use scidag::exec::{PathPolicy, TaskExecutor, TaskFuture};
use scidag::process::{ShellProcess, Task};
use scidag::Workflow;

type TestResult = Result<(), Box<dyn Error>>;

fn producer(dir: &Path, name: &str, exec: Arc<dyn TaskExecutor>) -> Result<ShellProcess, FlowError> {
    Ok(ShellProcess::new(name, "make-data > {o:out}")?
        .with_path("out", PathPolicy::Static(dir.join(format!("{name}.txt"))))?
        .with_executor(exec))
}

fn consumer(name: &str, suffix: &str, exec: Arc<dyn TaskExecutor>) -> Result<ShellProcess, FlowError> {
    Ok(ShellProcess::new(name, "upper < {i:in} > {o:up}")?
        .with_path(
            "up",
            PathPolicy::Extend {
                input: "in".into(),
                suffix: suffix.into(),
            },
        )?
        .with_executor(exec))
}

fn chain(
    dir: &Path,
    produce: Arc<CountingExecutor>,
    consume: Arc<CountingExecutor>,
) -> Result<Workflow, FlowError> {
    let mut wf = Workflow::new("chain", 2);
    wf.add(producer(dir, "producer", produce)?)?;
    wf.add(consumer("consumer", ".up", consume)?)?;
    wf.connect(("producer", "out"), ("consumer", "in"))?;
    Ok(wf)
}

#[tokio::test]
async fn rerun_skips_existing_outputs() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let produce = Arc::new(CountingExecutor::new());
    let consume = Arc::new(CountingExecutor::new());

    let first = with_timeout(chain(dir.path(), produce.clone(), consume.clone())?.run()).await?;
    assert_eq!(first.total_computed(), 2);
    assert_eq!(first.total_skipped(), 0);
    assert_eq!(fs::read_to_string(dir.path().join("producer.txt.up"))?, "consumer:up\n");

    let second = with_timeout(chain(dir.path(), produce.clone(), consume.clone())?.run()).await?;
    assert_eq!(second.total_computed(), 0);
    assert_eq!(second.total_skipped(), 2);
    assert_eq!(produce.calls(), 1);
    assert_eq!(consume.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn consumer_recomputes_when_its_target_is_gone() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let produce = Arc::new(CountingExecutor::new());
    let consume = Arc::new(CountingExecutor::new());

    chain(dir.path(), produce.clone(), consume.clone())?.run().await?;
    fs::remove_file(dir.path().join("producer.txt.up"))?;
    let report = chain(dir.path(), produce.clone(), consume.clone())?.run().await?;

    let p = report.stats("producer").ok_or("no producer stats")?;
    let c = report.stats("consumer").ok_or("no consumer stats")?;
    assert_eq!((p.computed, p.skipped), (0, 1));
    assert_eq!((c.computed, c.skipped), (1, 0));
    assert_eq!(produce.calls(), 1);
    assert_eq!(consume.calls(), 2);
    Ok(())
}

#[tokio::test]
async fn failed_task_leaves_only_temp_and_next_run_recomputes() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let target = dir.path().join("producer.txt");
    let temp = dir.path().join("producer.txt.tmp");

    let mut wf = Workflow::new("atomic", 1);
    wf.add(producer(dir.path(), "producer", Arc::new(CountingExecutor::failing()))?)?;
    let err = wf.run().await.err().ok_or("run should fail")?;
    assert!(matches!(err, FlowError::CommandFailed { code: 1, .. }));
    assert!(!target.exists());
    assert!(temp.exists());

    let mut wf = Workflow::new("atomic", 1);
    wf.add(producer(dir.path(), "producer", Arc::new(CountingExecutor::new()))?)?;
    let report = wf.run().await?;
    assert_eq!(report.total_computed(), 1);
    assert!(target.exists());
    assert!(!temp.exists());
    assert!(dir.path().join("producer.txt.audit.json").exists());
    Ok(())
}

#[tokio::test]
async fn fan_out_delivers_every_packet_to_each_consumer() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let exec = Arc::new(CountingExecutor::new());

    let mut wf = Workflow::new("fan-out", 4);
    wf.add(producer(dir.path(), "producer", exec.clone())?)?;
    wf.add(consumer("left", ".left", exec.clone())?)?;
    wf.add(consumer("right", ".right", exec.clone())?)?;
    wf.connect(("producer", "out"), ("left", "in"))?;
    wf.connect(("producer", "out"), ("right", "in"))?;

    let report = wf.run().await?;
    assert_eq!(report.total_computed(), 3);
    assert!(dir.path().join("producer.txt.left").exists());
    assert!(dir.path().join("producer.txt.right").exists());
    assert_eq!(report.outputs["left.up"].len(), 1);
    assert_eq!(report.outputs["right.up"].len(), 1);
    Ok(())
}

#[tokio::test]
async fn fan_in_merges_streams_into_one_port() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let exec = Arc::new(CountingExecutor::new());

    let mut wf = Workflow::new("fan-in", 4);
    wf.add(producer(dir.path(), "a", exec.clone())?)?;
    wf.add(producer(dir.path(), "b", exec.clone())?)?;
    wf.add(consumer("merge", ".up", exec.clone())?)?;
    wf.connect(("a", "out"), ("merge", "in"))?;
    wf.connect(("b", "out"), ("merge", "in"))?;

    let report = wf.run().await?;
    assert_eq!(report.stats("merge").map(|s| s.computed), Some(2));
    let mut produced: Vec<_> = report.outputs["merge.up"]
        .iter()
        .map(|ip| ip.path().to_path_buf())
        .collect();
    produced.sort();
    assert_eq!(
        produced,
        vec![dir.path().join("a.txt.up"), dir.path().join("b.txt.up")]
    );
    Ok(())
}

#[tokio::test]
async fn run_to_limits_execution_to_upstream_closure() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let exec = Arc::new(CountingExecutor::new());

    let mut wf = Workflow::new("partial", 2);
    wf.add(producer(dir.path(), "a", exec.clone())?)?;
    wf.add(producer(dir.path(), "b", exec.clone())?)?;
    wf.add(consumer("a_up", ".up", exec.clone())?)?;
    wf.add(consumer("b_up", ".up", exec.clone())?)?;
    wf.connect(("a", "out"), ("a_up", "in"))?;
    wf.connect(("b", "out"), ("b_up", "in"))?;
    wf.set_run_to(Regex::new("^a_up$")?);

    let report = wf.run().await?;
    assert_eq!(exec.calls(), 2);
    assert!(report.stats("a").is_some());
    assert!(report.stats("b").is_none());
    assert!(report.stats("b_up").is_none());
    assert!(!dir.path().join("b.txt").exists());
    Ok(())
}

/// Tracks the highest number of tasks executing at once.
#[derive(Default)]
struct ConcurrencyGauge {
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl TaskExecutor for ConcurrencyGauge {
    fn execute<'a>(&'a self, task: &'a Task) -> TaskFuture<'a> {
        Box::pin(async move {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            for (_, ip) in task.outputs() {
                ip.write(b"done\n")?;
            }
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

#[tokio::test]
async fn max_tasks_bounds_concurrent_execution() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let gauge = Arc::new(ConcurrencyGauge::default());

    let mut wf = Workflow::new("bounded", 2);
    for name in ["p1", "p2", "p3", "p4", "p5"] {
        wf.add(producer(dir.path(), name, gauge.clone())?)?;
    }
    let report = with_timeout(wf.run()).await?;
    assert_eq!(report.total_computed(), 5);
    assert!(gauge.peak.load(Ordering::SeqCst) <= 2);
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn shell_pipeline_runs_real_commands() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let build = |dir: &Path| -> Result<Workflow, FlowError> {
        let mut wf = Workflow::new("shell", 2);
        wf.add(
            ShellProcess::new("hello", "printf hello > {o:out}")?
                .with_path("out", PathPolicy::Static(dir.join("hello.txt")))?,
        )?;
        wf.add(
            ShellProcess::new("shout", "tr a-z A-Z < {i:in} > {o:up}")?.with_path(
                "up",
                PathPolicy::Replace {
                    input: "in".into(),
                    old: ".txt".into(),
                    new: ".upper.txt".into(),
                },
            )?,
        )?;
        wf.connect(("hello", "out"), ("shout", "in"))?;
        Ok(wf)
    };

    let report = build(dir.path())?.run().await?;
    assert_eq!(report.total_computed(), 2);
    assert_eq!(fs::read_to_string(dir.path().join("hello.upper.txt"))?, "HELLO");

    let report = build(dir.path())?.run().await?;
    assert_eq!(report.total_skipped(), 2);
    Ok(())
}
