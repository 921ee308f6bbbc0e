//! Output formatter trait

use ralph_application::LoopResult;

/// Trait for formatting run results
pub trait OutputFormatter {
    /// Format the complete run result
    fn format(&self, result: &LoopResult) -> String;

    /// Format as JSON
    fn format_json(&self, result: &LoopResult) -> String;
}
