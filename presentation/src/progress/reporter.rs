//! Progress reporting for supervisor runs

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use ralph_application::{LoopResult, ProgressReport};
use ralph_domain::SupervisorState;
use std::sync::Mutex;

/// Receives progress reports from a running loop.
pub trait ProgressDisplay: Send + Sync {
    fn on_progress(&self, report: &ProgressReport);

    /// Called once after the run returns.
    fn on_finish(&self, result: &LoopResult);
}

/// Reports progress with a single percentage bar
pub struct ProgressReporter {
    bar: ProgressBar,
    last_state: Mutex<Option<SupervisorState>>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(Self::bar_style());
        Self {
            bar,
            last_state: Mutex::new(None),
        }
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix:.bold.cyan} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-")
    }

    /// Short label shown in front of the bar.
    pub fn state_label(state: SupervisorState, iteration: u32) -> String {
        if iteration > 0 && !state.is_terminal() {
            format!("{} #{}", state.display_name(), iteration + 1)
        } else {
            state.display_name().to_string()
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressDisplay for ProgressReporter {
    fn on_progress(&self, report: &ProgressReport) {
        let mut last = self.last_state.lock().unwrap_or_else(|e| e.into_inner());
        if *last != Some(report.state) {
            self.bar
                .set_prefix(Self::state_label(report.state, report.iteration));
            *last = Some(report.state);
        }
        self.bar.set_position(u64::from(report.percentage));
        match &report.details {
            Some(details) => self
                .bar
                .set_message(format!("{} ({})", report.message, details.dimmed())),
            None => self.bar.set_message(report.message.clone()),
        }
        self.bar.tick();
    }

    fn on_finish(&self, result: &LoopResult) {
        let message = if result.success {
            "done".green().to_string()
        } else {
            format!("{}", result.final_state).red().to_string()
        };
        self.bar.finish_with_message(message);
    }
}

/// Simple text-based progress (no fancy UI)
pub struct SimpleProgress {
    last_state: Mutex<Option<SupervisorState>>,
}

impl SimpleProgress {
    pub fn new() -> Self {
        Self {
            last_state: Mutex::new(None),
        }
    }
}

impl Default for SimpleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressDisplay for SimpleProgress {
    fn on_progress(&self, report: &ProgressReport) {
        // Periodic reports repeat the current state; print changes only
        let mut last = self.last_state.lock().unwrap_or_else(|e| e.into_inner());
        if *last == Some(report.state) {
            return;
        }
        *last = Some(report.state);
        println!(
            "{} {} {:>3}% {}",
            "->".cyan(),
            ProgressReporter::state_label(report.state, report.iteration).bold(),
            report.percentage,
            report.message
        );
    }

    fn on_finish(&self, _result: &LoopResult) {
        println!();
    }
}

/// Discards every report (`--quiet` and JSON output)
pub struct NoProgress;

impl ProgressDisplay for NoProgress {
    fn on_progress(&self, _report: &ProgressReport) {}

    fn on_finish(&self, _result: &LoopResult) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_label_shows_iteration_round() {
        assert_eq!(ProgressReporter::state_label(SupervisorState::Plan, 0), "Planning");
        assert_eq!(
            ProgressReporter::state_label(SupervisorState::Execute, 1),
            "Executing #2"
        );
        assert_eq!(
            ProgressReporter::state_label(SupervisorState::Complete, 3),
            "Complete"
        );
    }
}
