// src/output.rs
use std::io::Write;

use crate::error::AnalyzerError;
use crate::export::sheets::ENTRY_HEADERS;
use crate::model::LogEntry;
use crate::search::highlight_match;

#[derive(Debug, Clone, Copy, PartialEq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    #[value(name = "text", help = "Original log lines")]
    Text,
    #[value(name = "jsonl", help = "JSON Lines format (one JSON object per entry)")]
    Jsonl,
    #[value(name = "csv", help = "Comma-separated values with a header row")]
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "jsonl" => Ok(OutputFormat::Jsonl),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

/// Writes entry listings for the `filter` and `search` commands.
pub struct EntryWriter {
    format: OutputFormat,
    csv_headers_written: bool,
    // (term, case_sensitive) marked in text output
    highlight: Option<(String, bool)>,
}

impl EntryWriter {
    pub fn new(format: OutputFormat) -> Self {
        EntryWriter {
            format,
            csv_headers_written: false,
            highlight: None,
        }
    }

    /// Wrap matches of `term` in `<mark>` tags when writing text.
    pub fn with_highlight(mut self, term: impl Into<String>, case_sensitive: bool) -> Self {
        let term = term.into();
        if !term.is_empty() {
            self.highlight = Some((term, case_sensitive));
        }
        self
    }

    pub fn write_entry<W: Write>(&mut self, output: &mut W, entry: &LogEntry) -> Result<(), AnalyzerError> {
        match self.format {
            OutputFormat::Text => self.write_text(output, entry),
            OutputFormat::Jsonl => self.write_jsonl(output, entry),
            OutputFormat::Csv => self.write_csv(output, entry),
        }
    }

    pub fn write_all<'a, W: Write>(
        &mut self,
        output: &mut W,
        entries: impl IntoIterator<Item = &'a LogEntry>,
    ) -> Result<usize, AnalyzerError> {
        let mut written = 0;
        for entry in entries {
            self.write_entry(output, entry)?;
            written += 1;
        }
        Ok(written)
    }

    fn write_text<W: Write>(&mut self, output: &mut W, entry: &LogEntry) -> Result<(), AnalyzerError> {
        match &self.highlight {
            Some((term, case_sensitive)) => {
                writeln!(output, "{}", highlight_match(&entry.raw_line, term, *case_sensitive))?
            }
            None => writeln!(output, "{}", entry.raw_line)?,
        }
        Ok(())
    }

    fn write_jsonl<W: Write>(&mut self, output: &mut W, entry: &LogEntry) -> Result<(), AnalyzerError> {
        let json_line = serde_json::to_string(entry)
            .map_err(|e| AnalyzerError::OutputError(format!("JSON encoding error: {}", e)))?;
        writeln!(output, "{}", json_line)?;
        Ok(())
    }

    fn write_csv<W: Write>(&mut self, output: &mut W, entry: &LogEntry) -> Result<(), AnalyzerError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        let csv_error = |e: csv::Error| AnalyzerError::OutputError(format!("CSV encoding error: {}", e));

        if !self.csv_headers_written {
            writer.write_record(ENTRY_HEADERS).map_err(csv_error)?;
            self.csv_headers_written = true;
        }

        let line_number = entry.line_number.to_string();
        let timestamp = entry.timestamp.to_rfc3339();
        let status = entry.status_code.to_string();
        let bytes = entry.response_bytes.to_string();
        writer
            .write_record([
                line_number.as_str(),
                entry.ip.as_str(),
                entry.user.as_str(),
                timestamp.as_str(),
                entry.method.as_str(),
                entry.url.as_str(),
                entry.protocol.as_str(),
                status.as_str(),
                bytes.as_str(),
                entry.referer.as_str(),
                entry.user_agent.as_str(),
                entry.raw_line.as_str(),
            ])
            .map_err(csv_error)?;

        let data = writer
            .into_inner()
            .map_err(|e| AnalyzerError::OutputError(format!("CSV flush error: {}", e)))?;
        output.write_all(&data)?;
        Ok(())
    }
}
