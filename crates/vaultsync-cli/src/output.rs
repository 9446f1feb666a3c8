//! Output formatting helpers

use serde_json::Value;

/// How command results are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Print a result either as prose lines or as one JSON document.
pub fn emit(format: OutputFormat, json: Value, human: impl FnOnce()) {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
        }
        OutputFormat::Human => human(),
    }
}
