// src/parser.rs
pub mod line;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::ParserConfig;
use crate::error::AnalyzerError;
use crate::model::{LogEntry, ParseError};
use crate::progress::{CancelToken, ParseProgress};
pub use line::{CombinedLogParser, LineParser};

/// Everything one pass over a log produces.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseOutcome {
    pub entries: Vec<LogEntry>,
    pub total_lines: usize,
    pub parsed_lines: usize,
    pub error_lines: usize,
    /// First `max_error_samples` failures, in line order
    pub error_samples: Vec<ParseError>,
    #[serde(serialize_with = "serialize_millis", rename = "parseTimeMs")]
    pub parse_time: Duration,
    pub bytes_read: u64,
    pub memory_bytes: u64,
    pub throughput_mbps: f64,
    /// Set when the cancel token fired before end of input
    pub cancelled: bool,
}

pub(crate) fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Streams access-log lines into [`LogEntry`] values.
pub struct LogParser {
    config: ParserConfig,
    line_parser: Box<dyn LineParser + Send + Sync>,
}

impl Default for LogParser {
    fn default() -> Self {
        Self::new(ParserConfig::default())
    }
}

impl LogParser {
    pub fn new(config: ParserConfig) -> Self {
        Self::with_line_parser(config, Box::new(CombinedLogParser::new()))
    }

    pub fn with_line_parser(config: ParserConfig, line_parser: Box<dyn LineParser + Send + Sync>) -> Self {
        LogParser { config, line_parser }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn parse_path(&self, path: &Path) -> Result<ParseOutcome, AnalyzerError> {
        self.parse_path_with_progress(path, &mut |_| {}, &CancelToken::new())
    }

    pub fn parse_path_with_progress(
        &self,
        path: &Path,
        progress: &mut dyn FnMut(&ParseProgress),
        cancel: &CancelToken,
    ) -> Result<ParseOutcome, AnalyzerError> {
        let file = File::open(path).map_err(|e| AnalyzerError::from_io(path, e))?;
        let total_bytes = file.metadata().ok().map(|m| m.len());

        tracing::info!(file = %path.display(), size = ?total_bytes, "parsing access log");

        let reader = BufReader::with_capacity(self.config.buffer_size, file);
        self.parse_reader(reader, total_bytes, progress, cancel)
            .map_err(|e| match e {
                AnalyzerError::Stream(source) => AnalyzerError::Io {
                    path: path.to_path_buf(),
                    source,
                },
                other => other,
            })
    }

    /// Parse any buffered source. `total_bytes` only feeds progress percentages.
    pub fn parse_reader<R: BufRead>(
        &self,
        mut reader: R,
        total_bytes: Option<u64>,
        progress: &mut dyn FnMut(&ParseProgress),
        cancel: &CancelToken,
    ) -> Result<ParseOutcome, AnalyzerError> {
        let start_time = Instant::now();
        let mut outcome = ParseOutcome::default();
        let mut buf = Vec::with_capacity(1024);
        let mut line_number = 0;

        loop {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                tracing::debug!(line = line_number, "parse cancelled");
                break;
            }

            buf.clear();
            let read = reader.read_until(b'\n', &mut buf)?;
            if read == 0 {
                break;
            }
            outcome.bytes_read += read as u64;
            line_number += 1;
            outcome.total_lines += 1;

            let content = trim_line_ending(&buf);
            let result = if content.len() > self.config.max_line_length {
                Err(format!(
                    "line too long: {} > {}",
                    content.len(),
                    self.config.max_line_length
                ))
            } else {
                let text = String::from_utf8_lossy(content);
                self.line_parser.parse_line(line_number, &text)
            };

            match result {
                Ok(entry) => {
                    outcome.parsed_lines += 1;
                    outcome.entries.push(entry);
                }
                Err(reason) => {
                    outcome.error_lines += 1;
                    if outcome.error_samples.len() < self.config.max_error_samples {
                        outcome.error_samples.push(ParseError {
                            line_number,
                            line: String::from_utf8_lossy(content).into_owned(),
                            reason,
                        });
                    }
                }
            }

            if self.config.progress_interval > 0 && line_number % self.config.progress_interval == 0 {
                progress(&ParseProgress {
                    lines_read: line_number,
                    bytes_read: outcome.bytes_read,
                    total_bytes,
                });
            }
        }

        progress(&ParseProgress {
            lines_read: line_number,
            bytes_read: outcome.bytes_read,
            total_bytes,
        });

        outcome.parse_time = start_time.elapsed();
        outcome.memory_bytes = estimate_memory(&outcome.entries, outcome.entries.capacity());
        let secs = outcome.parse_time.as_secs_f64();
        if secs > 0.0 {
            outcome.throughput_mbps = outcome.bytes_read as f64 / (1024.0 * 1024.0) / secs;
        }

        tracing::info!(
            total = outcome.total_lines,
            parsed = outcome.parsed_lines,
            errors = outcome.error_lines,
            time_ms = outcome.parse_time.as_millis() as u64,
            throughput_mb_s = outcome.throughput_mbps,
            cancelled = outcome.cancelled,
            "parse finished"
        );

        Ok(outcome)
    }

    /// Check that the first line of `path` is an access-log line.
    pub fn validate_first_line(&self, path: &Path) -> Result<(), AnalyzerError> {
        let file = File::open(path).map_err(|e| AnalyzerError::from_io(path, e))?;
        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();
        reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| AnalyzerError::from_io(path, e))?;

        if buf.is_empty() {
            return Err(AnalyzerError::InvalidFormat("file is empty".to_string()));
        }

        let text = String::from_utf8_lossy(trim_line_ending(&buf));
        match self.line_parser.parse_line(1, &text) {
            Ok(_) => Ok(()),
            Err(reason) => Err(AnalyzerError::InvalidFormat(format!(
                "first line is not an Apache Combined or Common Log Format line: {}",
                reason
            ))),
        }
    }

    /// Sample up to `sample_lines` lines; true when at least 80% of them match.
    pub fn validate_format(&self, path: &Path, sample_lines: usize) -> Result<bool, AnalyzerError> {
        let file = File::open(path).map_err(|e| AnalyzerError::from_io(path, e))?;
        let reader = BufReader::new(file);

        let mut total = 0usize;
        let mut valid = 0usize;
        for line in reader.split(b'\n').take(sample_lines) {
            let line = line.map_err(|e| AnalyzerError::from_io(path, e))?;
            total += 1;
            if self.line_parser.matches(&String::from_utf8_lossy(trim_line_ending(&line))) {
                valid += 1;
            }
        }

        if total == 0 {
            return Err(AnalyzerError::InvalidFormat("file is empty".to_string()));
        }
        Ok(valid as f64 / total as f64 >= 0.8)
    }
}

fn trim_line_ending(buf: &[u8]) -> &[u8] {
    let mut end = buf.len();
    if end > 0 && buf[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && buf[end - 1] == b'\r' {
        end -= 1;
    }
    &buf[..end]
}

// `capacity` is the owning vector's, so slack slots are counted too.
fn estimate_memory(entries: &[LogEntry], capacity: usize) -> u64 {
    let inline = capacity * std::mem::size_of::<LogEntry>();
    let heap: usize = entries.iter().map(LogEntry::heap_size).sum();
    (inline + heap) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn line(ip: &str, status: u16) -> String {
        format!(
            r#"{} - - [01/Jan/2024:10:00:00 +0000] "GET /a HTTP/1.1" {} 100 "-" "Mozilla/5.0""#,
            ip, status
        )
    }

    fn parse(input: &str, config: ParserConfig) -> ParseOutcome {
        LogParser::new(config)
            .parse_reader(Cursor::new(input.to_string()), None, &mut |_| {}, &CancelToken::new())
            .unwrap()
    }

    #[test]
    fn test_counts_and_line_numbers() {
        let input = format!("{}\ngarbage\n{}\r\n\n{}", line("1.1.1.1", 200), line("2.2.2.2", 404), line("3.3.3.3", 500));
        let outcome = parse(&input, ParserConfig::default());

        assert_eq!(outcome.total_lines, 5);
        assert_eq!(outcome.parsed_lines, 3);
        assert_eq!(outcome.error_lines, 2);
        let numbers: Vec<usize> = outcome.entries.iter().map(|e| e.line_number).collect();
        assert_eq!(numbers, vec![1, 3, 5]);
        assert_eq!(outcome.entries[1].raw_line, line("2.2.2.2", 404));
        assert_eq!(outcome.error_samples[0].line_number, 2);
        assert_eq!(outcome.error_samples[0].line, "garbage");
        assert_eq!(outcome.error_samples[1].reason, "empty line");
    }

    #[test]
    fn test_error_samples_are_capped() {
        let input = "bad\n".repeat(25);
        let outcome = parse(&input, ParserConfig::default());
        assert_eq!(outcome.error_lines, 25);
        assert_eq!(outcome.error_samples.len(), 10);

        let config = ParserConfig {
            max_error_samples: 2,
            ..ParserConfig::default()
        };
        assert_eq!(parse(&input, config).error_samples.len(), 2);
    }

    #[test]
    fn test_long_line_is_an_error() {
        let config = ParserConfig {
            max_line_length: 20,
            ..ParserConfig::default()
        };
        let outcome = parse(&line("1.1.1.1", 200), config);
        assert_eq!(outcome.error_lines, 1);
        assert!(outcome.error_samples[0].reason.starts_with("line too long"));
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let mut bytes = line("1.1.1.1", 200).into_bytes();
        let ua_pos = bytes.len() - 2;
        bytes.insert(ua_pos, 0xff);
        let outcome = LogParser::default()
            .parse_reader(Cursor::new(bytes), None, &mut |_| {}, &CancelToken::new())
            .unwrap();
        assert_eq!(outcome.parsed_lines, 1);
        assert!(outcome.entries[0].user_agent.contains('\u{fffd}'));
    }

    #[test]
    fn test_progress_and_cancel() {
        let input: String = (0..100).map(|i| line(&format!("10.0.0.{}", i), 200) + "\n").collect();
        let config = ParserConfig {
            progress_interval: 10,
            ..ParserConfig::default()
        };
        let parser = LogParser::new(config);
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let mut calls = Vec::new();

        let outcome = parser
            .parse_reader(
                Cursor::new(input),
                None,
                &mut |p: &ParseProgress| {
                    calls.push(p.lines_read);
                    if p.lines_read == 30 {
                        trigger.cancel();
                    }
                },
                &cancel,
            )
            .unwrap();

        assert!(outcome.cancelled);
        assert_eq!(outcome.parsed_lines, 30);
        assert_eq!(calls, vec![10, 20, 30, 30]);
    }

    #[test]
    fn test_memory_estimate_counts_vector_slack() {
        let input = format!("{}\n{}\n", line("1.1.1.1", 200), line("2.2.2.2", 200));
        let outcome = parse(&input, ParserConfig::default());
        let slots = outcome.entries.capacity() * std::mem::size_of::<LogEntry>();
        let heap: usize = outcome.entries.iter().map(LogEntry::heap_size).sum();
        assert_eq!(outcome.memory_bytes, (slots + heap) as u64);
        assert_eq!(estimate_memory(&[], 0), 0);
    }

    #[test]
    fn test_missing_file() {
        let result = LogParser::default().parse_path(Path::new("/definitely/not/here.log"));
        assert!(matches!(result, Err(AnalyzerError::NotFound { .. })));
    }
}
