// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `scidag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "scidag",
    version,
    about = "Run a dataflow workflow of command-line tools, skipping finished steps.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the workflow file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Workflow.toml")]
    pub config: String,

    /// Override `[workflow].max_tasks`.
    #[arg(long, value_name = "N")]
    pub max_tasks: Option<usize>,

    /// Only run processes whose name matches this regex, plus everything
    /// they depend on.
    #[arg(long, value_name = "REGEX")]
    pub run_to: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SCIDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse, validate and print the workflow without executing anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = CliArgs::try_parse_from(["scidag"]).unwrap();
        assert_eq!(args.config, "Workflow.toml");
        assert!(args.max_tasks.is_none());
        assert!(!args.dry_run);
    }

    #[test]
    fn all_flags() {
        let args = CliArgs::try_parse_from([
            "scidag",
            "--config",
            "wf.toml",
            "--max-tasks",
            "8",
            "--run-to",
            "summary.*",
            "--log-level",
            "debug",
            "--dry-run",
        ])
        .unwrap();
        assert_eq!(args.config, "wf.toml");
        assert_eq!(args.max_tasks, Some(8));
        assert_eq!(args.run_to.as_deref(), Some("summary.*"));
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
        assert!(args.dry_run);
    }
}
