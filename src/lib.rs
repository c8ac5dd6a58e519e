// src/lib.rs
pub mod config;
pub mod error;
pub mod export;
pub mod filter;
pub mod model;
pub mod output;
pub mod parser;
pub mod progress;
pub mod search;
pub mod stats;

#[cfg(test)]
mod test_support;

pub use config::{AnalyzerConfig, ExportConfig, ParserConfig, StatsConfig};
pub use error::{AnalyzerError, ExportError, ValidationError};
pub use export::{estimate_file_size, ExportProgress, ExportReport, ExportState, Exporter};
pub use filter::{
    filter_and_search, filter_with_stats, FilterCriteria, FilterOutcome, ResponseSizeRange, StatusCodeRange,
    TimeRange, ViewStats,
};
pub use model::{LogEntry, ParseError, StatusClass};
pub use output::{EntryWriter, OutputFormat};
pub use parser::{CombinedLogParser, LineParser, LogParser, ParseOutcome};
pub use progress::{CancelToken, ParseProgress};
pub use search::{highlight_match, match_spans, search_stats, SearchCriteria, SearchField, SearchMatcher};
pub use stats::{Aggregator, BotClassifier, BotSignature, Statistics};

use std::borrow::Borrow;
use std::path::Path;

/// Parse a log file with the default configuration.
pub fn parse(path: impl AsRef<Path>) -> Result<ParseOutcome, AnalyzerError> {
    LogParser::default().parse_path(path.as_ref())
}

/// Statistics with the default top-10 lists. `signatures` replaces the
/// built-in bot list when given.
pub fn aggregate<E: Borrow<LogEntry>>(entries: &[E], signatures: Option<&BotClassifier>) -> Statistics {
    stats::aggregate(entries, signatures)
}

pub fn filter<'a, E: Borrow<LogEntry>>(entries: &'a [E], criteria: &FilterCriteria) -> FilterOutcome<'a> {
    filter::filter_with_stats(entries, criteria)
}

pub fn search<'a, E: Borrow<LogEntry>>(entries: &'a [E], criteria: &SearchCriteria) -> Vec<&'a LogEntry> {
    search::search(entries, criteria)
}

pub fn export<E: Borrow<LogEntry>>(
    entries: &[E],
    statistics: Option<&Statistics>,
    destination: impl AsRef<Path>,
    progress: &mut dyn FnMut(&ExportProgress),
    cancel: &CancelToken,
) -> Result<ExportReport, ExportError> {
    export::export(entries, statistics, destination.as_ref(), progress, cancel)
}
