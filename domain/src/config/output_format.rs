//! Output format value object

use serde::{Deserialize, Serialize};

/// How command results are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable, colored output (default)
    #[default]
    Text,
    /// Machine-readable JSON
    Json,
}
