//! Presentation-level configuration
//!
//! Resolves how results and progress are shown from CLI flags and the
//! `[output]` section of the config file.

use crate::cli::commands::OutputFormat as CliOutputFormat;
use ralph_domain::OutputFormat;

/// Output configuration for the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    pub format: OutputFormat,
    /// Enable colored terminal output
    pub color: bool,
    /// Show progress indicators
    pub show_progress: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            color: true,
            show_progress: true,
        }
    }
}

impl OutputConfig {
    /// CLI flags win over the config file. JSON output never shows progress.
    pub fn resolve(
        cli_format: Option<CliOutputFormat>,
        file_format: Option<OutputFormat>,
        color: bool,
        quiet: bool,
    ) -> Self {
        let format = cli_format
            .map(OutputFormat::from)
            .or(file_format)
            .unwrap_or_default();
        Self {
            format,
            color,
            show_progress: !quiet && format == OutputFormat::Text,
        }
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Turn terminal colors off globally when disabled or writing JSON.
    pub fn apply_color(&self) {
        if !self.color || self.is_json() {
            colored::control::set_override(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_format_overrides_file() {
        let config = OutputConfig::resolve(Some(CliOutputFormat::Json), Some(OutputFormat::Text), true, false);
        assert!(config.is_json());
        assert!(!config.show_progress);
    }

    #[test]
    fn test_falls_back_to_file_then_text() {
        let from_file = OutputConfig::resolve(None, Some(OutputFormat::Json), true, false);
        assert!(from_file.is_json());

        let default = OutputConfig::resolve(None, None, false, false);
        assert_eq!(default.format, OutputFormat::Text);
        assert!(default.show_progress);
        assert!(!default.color);
    }

    #[test]
    fn test_quiet_hides_progress() {
        assert!(!OutputConfig::resolve(None, None, true, true).show_progress);
    }
}
