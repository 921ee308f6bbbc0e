//! Console output formatter for supervisor results

use crate::output::formatter::OutputFormatter;
use colored::{ColoredString, Colorize};
use ralph_application::{LoopResult, RecoveryInfo};
use ralph_domain::{StateTransition, SupervisorState};
use serde::Serialize;

/// Formats loop results, recovery info and history for console display
pub struct ConsoleFormatter;

impl ConsoleFormatter {
    /// Format the complete run result
    pub fn format(result: &LoopResult) -> String {
        let mut output = String::new();

        output.push_str(&Self::header("Ralph Loop Result"));
        output.push('\n');

        let outcome = if result.success {
            "SUCCESS".green().bold()
        } else {
            "FAILED".red().bold()
        };
        output.push_str(&format!("{} {}\n", "Outcome:".cyan().bold(), outcome));
        output.push_str(&format!(
            "{} {}\n",
            "Final state:".cyan().bold(),
            Self::state(result.final_state)
        ));
        if let Some(task_id) = &result.task_id {
            output.push_str(&format!("{} {}\n", "Task:".cyan().bold(), task_id));
        }
        output.push_str(&format!(
            "{} {}  {} {:.1}s\n",
            "Iterations:".cyan().bold(),
            result.iterations,
            "Duration:".cyan().bold(),
            result.duration_ms as f64 / 1000.0
        ));

        if let Some(plan) = &result.plan {
            output.push_str(&Self::section_header("Plan"));
            for step in &plan.steps {
                output.push_str(&format!(
                    "  {}. [{}] {}\n",
                    step.index + 1,
                    step.step_type.as_str().dimmed(),
                    step.description
                ));
            }
        }

        if let Some(results) = &result.execution_results {
            output.push_str(&Self::section_header("Execution"));
            for step in results {
                let line = match (&step.output, &step.error) {
                    (_, Some(error)) if !step.success => {
                        format!("  {} step {}: {}\n", "x".red(), step.step_index + 1, error)
                    }
                    (Some(out), _) => {
                        format!("  {} step {}: {}\n", "v".green(), step.step_index + 1, out)
                    }
                    _ => format!(
                        "  {} step {}\n",
                        if step.success { "v".green() } else { "x".red() },
                        step.step_index + 1
                    ),
                };
                output.push_str(&line);
            }
        }

        if let Some(verification) = &result.verification {
            output.push_str(&Self::section_header("Verification"));
            for criterion in &verification.criteria {
                let mark = if criterion.passed {
                    "v".green()
                } else {
                    "x".red()
                };
                match &criterion.details {
                    Some(details) => output.push_str(&format!(
                        "  {} {} ({})\n",
                        mark,
                        criterion.criterion,
                        details.dimmed()
                    )),
                    None => output.push_str(&format!("  {} {}\n", mark, criterion.criterion)),
                }
            }
            if !verification.suggestions.is_empty() {
                output.push_str(&format!("\n{}\n", "Suggestions:".yellow().bold()));
                for suggestion in &verification.suggestions {
                    output.push_str(&format!("  * {}\n", suggestion));
                }
            }
        }

        if let Some(error) = &result.error {
            output.push_str(&format!("\n{} {}\n", "Error:".red().bold(), error));
        }

        output.push_str(&Self::footer());

        output
    }

    /// Format any serializable value as JSON
    pub fn format_json<T: Serialize>(value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
    }

    /// Describe a persisted snapshot
    pub fn format_recovery(info: &RecoveryInfo) -> String {
        let mut output = String::new();

        output.push_str(&format!("{}\n\n", info.summary()));
        output.push_str(&format!("  {:<12} {}\n", "Task:".cyan(), info.task_id));
        output.push_str(&format!("  {:<12} {}\n", "State:".cyan(), Self::state(info.state)));
        output.push_str(&format!(
            "  {:<12} {}/{}\n",
            "Iteration:".cyan(),
            info.iteration,
            info.max_iterations
        ));
        output.push_str(&format!(
            "  {:<12} {}\n",
            "Saved at:".cyan(),
            info.persisted_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));

        let verdict = if info.resumable {
            "resumable (ralph-loop run --resume <task>)".green()
        } else if info.stale {
            "stale, will not be resumed".yellow()
        } else {
            "finished, nothing to resume".dimmed()
        };
        output.push_str(&format!("  {:<12} {}\n", "Status:".cyan(), verdict));

        output
    }

    /// Format the transition history, one line per transition
    pub fn format_history(history: &[StateTransition]) -> String {
        if history.is_empty() {
            return format!("{}\n", "No transitions recorded.".dimmed());
        }

        let mut output = String::new();
        output.push_str(&Self::section_header("Transition History"));
        for (i, transition) in history.iter().enumerate() {
            output.push_str(&format!(
                "{:>3}. {} {:<8} -> {:<8} {}\n",
                i + 1,
                transition.timestamp.format("%H:%M:%S%.3f").to_string().dimmed(),
                transition.from.as_str(),
                Self::state(transition.to),
                transition.reason
            ));
        }
        output
    }

    fn state(state: SupervisorState) -> ColoredString {
        match state {
            SupervisorState::Complete => state.as_str().green().bold(),
            SupervisorState::Failed => state.as_str().red().bold(),
            SupervisorState::Paused => state.as_str().yellow(),
            _ => state.as_str().normal(),
        }
    }

    fn header(title: &str) -> String {
        let line = "=".repeat(60);
        format!("{}\n{:^60}\n{}", line.cyan(), title.bold(), line.cyan())
    }

    fn section_header(title: &str) -> String {
        format!("\n{}\n{}\n", title.cyan().bold(), "-".repeat(40))
    }

    fn footer() -> String {
        format!("\n{}\n", "=".repeat(60).cyan())
    }
}

impl OutputFormatter for ConsoleFormatter {
    fn format(&self, result: &LoopResult) -> String {
        Self::format(result)
    }

    fn format_json(&self, result: &LoopResult) -> String {
        Self::format_json(result)
    }
}
