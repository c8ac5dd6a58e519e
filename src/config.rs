// src/config.rs
use crate::error::AnalyzerError;
use crate::stats::bots::BotSignature;
use serde::Deserialize;
use std::path::Path;

/// Top-level configuration, loadable from YAML.
///
/// Every section falls back to its defaults, so a config file only needs the
/// keys it changes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub parser: ParserConfig,
    pub stats: StatsConfig,
    pub export: ExportConfig,
}

impl AnalyzerConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, AnalyzerError> {
        serde_yaml::from_str(text).map_err(|e| AnalyzerError::ConfigError(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, AnalyzerError> {
        let text = std::fs::read_to_string(path).map_err(|e| AnalyzerError::from_io(path, e))?;
        Self::from_yaml_str(&text)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Parse error samples kept in full; the total is always counted.
    pub max_error_samples: usize,
    pub max_line_length: usize,
    pub buffer_size: usize,
    /// Lines between progress callbacks (0 disables them)
    pub progress_interval: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        ParserConfig {
            max_error_samples: 10,
            max_line_length: 1048576, // 1MB
            buffer_size: 65536,       // 64KB
            progress_interval: 10000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub top_k: usize,
    /// Signatures tried before the built-in list
    pub bot_signatures: Vec<BotSignature>,
    /// Use only `bot_signatures`, dropping the built-in list
    pub replace_default_signatures: bool,
}

impl Default for StatsConfig {
    fn default() -> Self {
        StatsConfig {
            top_k: 10,
            bot_signatures: Vec::new(),
            replace_default_signatures: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Rows per sheet including the header row
    pub max_rows: u32,
    pub max_cell_chars: usize,
    pub include_summary: bool,
    /// Rows between progress callbacks
    pub progress_interval: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            max_rows: crate::export::XLSX_MAX_ROWS,
            max_cell_chars: crate::export::XLSX_MAX_CELL_CHARS,
            include_summary: true,
            progress_interval: 5000,
        }
    }
}
