//! CLI entrypoint for ralph-loop
//!
//! This is the main binary that wires together all layers using
//! dependency injection.

mod simulate;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use ralph_application::{
    AuditLog, NoAuditLog, PhaseHandlers, RecoveryInfo, StatePersistence, SupervisorLoop,
};
use ralph_domain::{Metadata, MetadataValue, SupervisorState};
use ralph_infrastructure::{
    ConfigLoader, FileConfig, FileLoggingConfig, FileStatePersistence, JsonlAuditLog,
};
use ralph_presentation::{
    Cli, Command, ConsoleFormatter, NoProgress, OutputConfig, ProgressDisplay, ProgressReporter,
    RunArgs,
};
use simulate::{SimulatedHandlers, Simulation};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if cli.show_config {
        ConfigLoader::print_config_sources(cli.config.as_deref());
        return Ok(ExitCode::SUCCESS);
    }

    let config = if cli.no_config {
        ConfigLoader::load_defaults()
    } else {
        ConfigLoader::load(cli.config.as_deref())
            .map_err(|e| anyhow!("Failed to load configuration: {}", e))?
    };

    let _log_guard = init_logging(&cli, &config.logging)?;

    let issues = config.validate();
    if !issues.is_empty() {
        for issue in &issues {
            eprintln!("config error: {}", issue);
        }
        bail!("Invalid configuration ({} issue(s))", issues.len());
    }

    let output = OutputConfig::resolve(cli.output, config.output.format, config.output.color, cli.quiet);
    output.apply_color();

    info!("Starting ralph-loop");

    // === Dependency Injection ===
    let state_file = cli
        .state_file
        .clone()
        .unwrap_or_else(|| config.supervisor.state_file.clone());
    let persistence = Arc::new(FileStatePersistence::new(state_file));

    let Some(command) = cli.command else {
        bail!("No command given. Try `ralph-loop run <task>` or `ralph-loop --help`.");
    };

    match command {
        Command::Run(args) => run_task(&args, &config, &output, persistence).await,
        Command::Status => {
            let max_age = config.supervisor.to_loop_config().max_recovery_age;
            let info = persistence
                .load()
                .map(|snapshot| RecoveryInfo::from_snapshot(&snapshot, max_age));
            match (&info, output.is_json()) {
                (_, true) => println!("{}", ConsoleFormatter::format_json(&info)),
                (Some(info), false) => print!("{}", ConsoleFormatter::format_recovery(info)),
                (None, false) => println!("No persisted task at {}", persistence.path().display()),
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::History => {
            let history = persistence
                .load()
                .map(|snapshot| snapshot.state_history)
                .unwrap_or_default();
            if output.is_json() {
                println!("{}", ConsoleFormatter::format_json(&history));
            } else {
                print!("{}", ConsoleFormatter::format_history(&history));
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Discard => {
            persistence
                .clear()
                .with_context(|| format!("Failed to delete {}", persistence.path().display()))?;
            if !output.is_json() {
                println!("Discarded {}", persistence.path().display());
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Initialize logging based on verbosity level and the `[logging]` section.
///
/// The returned guard flushes the log file when dropped.
fn init_logging(cli: &Cli, logging: &FileLoggingConfig) -> Result<Option<WorkerGuard>> {
    let level = match cli.verbose {
        0 => logging.level.as_deref().unwrap_or("warn").to_lowercase(),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(), // -vvv or more
    };

    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let (file_layer, guard) = match cli.log_file.as_ref().or(logging.file.as_ref()) {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow!("Log file path has no file name: {}", path.display()))?;
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(level))
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn run_task(
    args: &RunArgs,
    config: &FileConfig,
    output: &OutputConfig,
    persistence: Arc<FileStatePersistence>,
) -> Result<ExitCode> {
    let mut loop_config = config.supervisor.to_loop_config();
    if let Some(max) = args.max_iterations {
        loop_config = loop_config.with_max_iterations(max);
    }

    let audit: Arc<dyn AuditLog> = match &config.logging.audit_file {
        Some(path) => match JsonlAuditLog::new(path) {
            Some(log) => Arc::new(log),
            None => Arc::new(NoAuditLog),
        },
        None => Arc::new(NoAuditLog),
    };

    let simulation = Simulation {
        steps: args.steps,
        step_delay: Duration::from_millis(args.step_delay_ms),
        failing_verifications: args.failing_verifications,
        fail_step: args.fail_step,
    };
    let handlers = Arc::new(SimulatedHandlers::new(
        simulation,
        config.decision.clone(),
        audit.clone(),
    ));
    let supervisor = SupervisorLoop::new(
        PhaseHandlers::from_shared(handlers),
        persistence.clone(),
        loop_config,
    )
    .with_audit_log(audit);

    if args.resume {
        let Some(info) = supervisor.recover()? else {
            bail!(
                "Nothing to resume in {} (see `ralph-loop status`)",
                persistence.path().display()
            );
        };
        if !output.is_json() {
            println!("{}\n", info.summary());
        }
        if info.state == SupervisorState::Paused {
            supervisor.resume()?;
        }
    } else if supervisor.has_recoverable_state() && !supervisor.config().auto_recover {
        warn!(
            path = %persistence.path().display(),
            "An unfinished task is persisted; starting a new task replaces it (use --resume to continue it)"
        );
    }

    let display: Arc<dyn ProgressDisplay> = if output.show_progress {
        Arc::new(ProgressReporter::new())
    } else {
        Arc::new(NoProgress)
    };
    let progress = {
        let display = display.clone();
        supervisor.on_progress(move |report| display.on_progress(report))
    };

    let mut metadata = Metadata::new();
    metadata.insert("origin".to_string(), MetadataValue::from("ralph-loop"));

    let outcome = tokio::select! {
        result = supervisor.run(&args.task, metadata) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    progress.cancel();
    let Some(result) = outcome else {
        eprintln!(
            "\nInterrupted. Progress is saved in {}; continue with `ralph-loop run --resume`.",
            persistence.path().display()
        );
        return Ok(ExitCode::from(130));
    };
    let result = result?;
    display.on_finish(&result);

    if output.is_json() {
        println!("{}", ConsoleFormatter::format_json(&result));
    } else {
        println!("{}", ConsoleFormatter::format(&result));
    }

    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
