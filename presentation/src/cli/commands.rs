//! CLI command definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Colored, human-readable text
    Text,
    /// JSON output
    Json,
}

impl From<OutputFormat> for ralph_domain::OutputFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Text => ralph_domain::OutputFormat::Text,
            OutputFormat::Json => ralph_domain::OutputFormat::Json,
        }
    }
}

/// CLI arguments for ralph-loop
#[derive(Parser, Debug)]
#[command(name = "ralph-loop")]
#[command(author, version, about = "Plan, execute, verify, iterate: a supervised task loop")]
#[command(long_about = r#"
Ralph Loop drives a task through plan -> execute -> verify, iterating until
verification passes or the iteration budget runs out. Every transition is
saved so an interrupted run can be resumed.

Configuration files are loaded from (in priority order):
1. RALPH_* environment variables (e.g. RALPH_SUPERVISOR__MAX_ITERATIONS=5)
2. --config <path>     Explicit config file
3. ./ralph.toml        Project-level config
4. ~/.config/ralph-loop/config.toml   Global config

Example:
  ralph-loop run "Add input validation to the signup form"
  ralph-loop run --failing-verifications 2 --max-iterations 3 "Fix the flaky test"
  ralph-loop status
  ralph-loop run --resume "Add input validation to the signup form"
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Output format (defaults to the config file setting, then text)
    #[arg(short, long, value_enum, global = true)]
    pub output: Option<OutputFormat>,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Disable loading of configuration files
    #[arg(long, global = true)]
    pub no_config: bool,

    /// Write diagnostic logs to this file
    #[arg(long, value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Override the snapshot file location
    #[arg(long, value_name = "PATH", global = true)]
    pub state_file: Option<PathBuf>,

    /// Show configuration file locations and exit
    #[arg(long)]
    pub show_config: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Drive a task through the loop
    Run(RunArgs),
    /// Describe the persisted snapshot, if any
    Status,
    /// Print the persisted transition history
    History,
    /// Delete the persisted snapshot
    Discard,
}

/// Arguments for `ralph-loop run`
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// The task to accomplish
    pub task: String,

    /// Iteration budget (overrides config)
    #[arg(long, value_name = "N")]
    pub max_iterations: Option<u32>,

    /// Continue the persisted task instead of starting a new one
    #[arg(long)]
    pub resume: bool,

    /// Number of verification rounds the simulated verifier fails
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub failing_verifications: u32,

    /// Make the simulated executor fail this step (0-based) on every pass
    #[arg(long, value_name = "STEP")]
    pub fail_step: Option<usize>,

    /// Number of steps the simulated planner produces
    #[arg(long, value_name = "N", default_value_t = 3)]
    pub steps: usize,

    /// Simulated work per step, in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 200)]
    pub step_delay_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_global_flags() {
        let cli = Cli::try_parse_from([
            "ralph-loop",
            "run",
            "Add input validation",
            "--failing-verifications",
            "2",
            "-vv",
            "--output",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.output, Some(OutputFormat::Json));
        match cli.command {
            Some(Command::Run(args)) => {
                assert_eq!(args.task, "Add input validation");
                assert_eq!(args.failing_verifications, 2);
                assert_eq!(args.steps, 3);
                assert!(args.fail_step.is_none());
                assert!(!args.resume);
            }
            other => panic!("expected run, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_status() {
        let cli = Cli::try_parse_from(["ralph-loop", "status", "--state-file", "s.json"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Status)));
        assert_eq!(cli.state_file, Some(PathBuf::from("s.json")));
    }

    #[test]
    fn test_run_requires_task() {
        assert!(Cli::try_parse_from(["ralph-loop", "run"]).is_err());
    }
}
