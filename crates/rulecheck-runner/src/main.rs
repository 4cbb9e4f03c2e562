use anyhow::Result;
use clap::{Parser, Subcommand};
use rulecheck_common::duration::ModelDuration;
use rulecheck_query::engine::DEFAULT_LOOKBACK;
use rulecheck_runner::{RunOptions, Runner};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Unit tests for alerting and recording rules")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run unit tests for rules
    Test {
        /// Only run test groups whose name matches; may be repeated
        #[arg(long = "run", value_name = "REGEX")]
        run: Vec<String>,
        /// Print a structured diff for failed alert tests
        #[arg(long)]
        diff: bool,
        /// Print test timings and dump all data at the end of each test
        #[arg(long)]
        debug: bool,
        /// Accept unknown keys in rule files
        #[arg(long)]
        ignore_unknown_fields: bool,
        /// Write a JUnit XML report to this path
        #[arg(long, value_name = "PATH")]
        junit: Option<PathBuf>,
        /// How far back an instant selector looks for a sample
        #[arg(long, value_name = "DURATION", default_value_t = DEFAULT_LOOKBACK)]
        lookback_delta: ModelDuration,
        /// Unit-test files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let Command::Test {
        run,
        diff,
        debug,
        ignore_unknown_fields,
        junit,
        lookback_delta,
        files,
    } = cli.cmd;

    let directive = if debug { "rulecheck=debug" } else { "rulecheck=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive.parse()?))
        .with_writer(std::io::stderr)
        .init();

    let runner = Runner::new(RunOptions {
        run,
        diff,
        debug,
        ignore_unknown_fields,
        lookback_delta,
        junit,
    })?;
    let passed = runner.run(&files)?;
    if !passed {
        std::process::exit(1);
    }
    Ok(())
}
