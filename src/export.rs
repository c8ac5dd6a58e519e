// src/export.rs
pub mod sheets;

use std::borrow::Borrow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rust_xlsxwriter::{Format, Workbook};
use serde::Serialize;

use crate::config::ExportConfig;
use crate::error::ExportError;
use crate::model::LogEntry;
use crate::progress::CancelToken;
use crate::stats::Statistics;
use sheets::{Limits, SheetWriter};

/// Rows per worksheet, header included.
pub const XLSX_MAX_ROWS: u32 = 1_048_576;
/// Characters per cell.
pub const XLSX_MAX_CELL_CHARS: usize = 32_767;

// Writing covers 0..SAVE_PERCENT; saving the workbook takes the rest.
const SAVE_PERCENT: f64 = 95.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExportState {
    Idle,
    Preparing,
    Writing,
    Completed,
    Cancelled,
    Failed,
}

impl ExportState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExportState::Completed | ExportState::Cancelled | ExportState::Failed)
    }
}

impl fmt::Display for ExportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportState::Idle => "idle",
            ExportState::Preparing => "preparing",
            ExportState::Writing => "writing",
            ExportState::Completed => "completed",
            ExportState::Cancelled => "cancelled",
            ExportState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportProgress {
    /// 0..=100, never decreasing within one export
    pub percent: f64,
    pub phase: ExportState,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetSummary {
    pub name: String,
    /// Header included
    pub rows: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportReport {
    pub state: ExportState,
    pub success: bool,
    pub written_path: Option<PathBuf>,
    pub file_size_bytes: u64,
    /// Entry rows on the Entries sheet
    pub rows_written: u64,
    pub sheets: Vec<SheetSummary>,
    pub warnings: Vec<String>,
    #[serde(serialize_with = "crate::parser::serialize_millis", rename = "durationMs")]
    pub duration: Duration,
}

/// Rough output size for `entry_count` rows, for callers that want to warn
/// before a large export.
pub fn estimate_file_size(entry_count: usize) -> u64 {
    const BYTES_PER_ENTRY: u64 = 250;
    const BASE_OVERHEAD: u64 = 50 * 1024;
    // xlsx is zipped XML
    const COMPRESSION: f64 = 0.3;

    let raw = BASE_OVERHEAD + entry_count as u64 * BYTES_PER_ENTRY;
    (raw as f64 * COMPRESSION) as u64
}

/// Check the destination and create its parent directory if needed.
pub fn validate_destination(path: &Path) -> Result<(), ExportError> {
    let invalid = |reason: &str| ExportError::InvalidDestination {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    if path.as_os_str().is_empty() {
        return Err(invalid("path is empty"));
    }
    if path.is_dir() {
        return Err(invalid("path is a directory"));
    }
    let is_xlsx = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("xlsx"));
    if !is_xlsx {
        return Err(invalid("file name must end in .xlsx"));
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ExportError::Destination {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

// Cumulative progress over every row of every sheet.
struct ProgressTracker<'p> {
    callback: &'p mut dyn FnMut(&ExportProgress),
    total_units: u64,
    done_units: u64,
    interval: u64,
    last_percent: f64,
}

impl<'p> ProgressTracker<'p> {
    fn new(callback: &'p mut dyn FnMut(&ExportProgress), total_units: u64, interval: usize) -> Self {
        ProgressTracker {
            callback,
            total_units,
            done_units: 0,
            interval: interval.max(1) as u64,
            last_percent: 0.0,
        }
    }

    fn emit(&mut self, percent: f64, phase: ExportState, message: impl Into<String>) {
        // Monotonic even if a caller-visible phase reports a lower figure
        let percent = percent.clamp(self.last_percent, 100.0);
        self.last_percent = percent;
        (self.callback)(&ExportProgress {
            percent,
            phase,
            message: message.into(),
        });
    }

    fn writing_percent(&self) -> f64 {
        if self.total_units == 0 {
            SAVE_PERCENT
        } else {
            self.done_units as f64 / self.total_units as f64 * SAVE_PERCENT
        }
    }

    fn advance(&mut self, sheet: &str) {
        self.done_units += 1;
        if self.done_units % self.interval == 0 {
            let percent = self.writing_percent();
            self.emit(percent, ExportState::Writing, format!("Writing {}", sheet));
        }
    }

    fn sheet_done(&mut self, sheet: &str) {
        let percent = self.writing_percent();
        self.emit(percent, ExportState::Writing, format!("Finished {}", sheet));
    }
}

/// Writes entries and statistics into an `.xlsx` workbook.
///
/// An exporter runs once: `Idle → Preparing → Writing` and then one of
/// `Completed`, `Cancelled` or `Failed`.
#[derive(Debug)]
pub struct Exporter {
    config: ExportConfig,
    state: ExportState,
}

impl Default for Exporter {
    fn default() -> Self {
        Self::new(ExportConfig::default())
    }
}

impl Exporter {
    pub fn new(config: ExportConfig) -> Self {
        Exporter {
            config,
            state: ExportState::Idle,
        }
    }

    pub fn state(&self) -> ExportState {
        self.state
    }

    fn limits(&self) -> Limits {
        Limits {
            max_rows: self.config.max_rows.clamp(1, XLSX_MAX_ROWS),
            max_cell_chars: self.config.max_cell_chars.clamp(1, XLSX_MAX_CELL_CHARS),
        }
    }

    /// Cancellation is reported through the returned report, not as an
    /// error. On `Cancelled` nothing is saved.
    pub fn export<E: Borrow<LogEntry>>(
        &mut self,
        entries: &[E],
        stats: Option<&Statistics>,
        destination: &Path,
        progress: &mut dyn FnMut(&ExportProgress),
        cancel: &CancelToken,
    ) -> Result<ExportReport, ExportError> {
        if self.state != ExportState::Idle {
            return Err(ExportError::AlreadyRun(self.state));
        }
        let start = Instant::now();
        let result = self.run(entries, stats, destination, progress, cancel, start);
        if let Err(e) = &result {
            self.state = ExportState::Failed;
            tracing::warn!(destination = %destination.display(), error = %e, "export failed");
        }
        result
    }

    fn run<E: Borrow<LogEntry>>(
        &mut self,
        entries: &[E],
        stats: Option<&Statistics>,
        destination: &Path,
        progress: &mut dyn FnMut(&ExportProgress),
        cancel: &CancelToken,
        start: Instant,
    ) -> Result<ExportReport, ExportError> {
        self.state = ExportState::Preparing;
        let limits = self.limits();
        let stats_sheets = match stats {
            Some(stats) if self.config.include_summary => sheets::stats_sheets(stats),
            _ => Vec::new(),
        };

        let entry_capacity = (limits.max_rows - 1) as usize;
        let entry_rows = entries.len().min(entry_capacity);
        let stats_rows: usize = stats_sheets
            .iter()
            .map(|s| s.rows.len().min(entry_capacity))
            .sum();

        let mut tracker = ProgressTracker::new(
            progress,
            (entry_rows + stats_rows) as u64,
            self.config.progress_interval,
        );
        tracker.emit(0.0, ExportState::Preparing, "Checking destination");
        validate_destination(destination)?;

        tracing::info!(
            destination = %destination.display(),
            entries = entries.len(),
            sheets = 1 + stats_sheets.len(),
            "starting export"
        );

        self.state = ExportState::Writing;
        let header_format = Format::new().set_bold();
        let mut workbook = Workbook::new();
        let mut warnings = Vec::new();
        let mut summaries = Vec::new();

        let mut writer = SheetWriter::new(
            workbook.add_worksheet_with_constant_memory(),
            sheets::ENTRIES,
            sheets::ENTRY_HEADERS,
            &header_format,
            limits,
        )?;
        for entry in &entries[..entry_rows] {
            if cancel.is_cancelled() {
                return Ok(self.cancelled(warnings, summaries, start));
            }
            writer.write_row(&sheets::entry_row(entry.borrow()))?;
            tracker.advance(sheets::ENTRIES);
        }
        writer.note_overflow((entries.len() - entry_rows) as u64);
        let rows_written = (writer.rows() - 1) as u64;
        Self::finish_sheet(writer, &mut warnings, &mut summaries)?;
        tracker.sheet_done(sheets::ENTRIES);

        for sheet in &stats_sheets {
            if cancel.is_cancelled() {
                return Ok(self.cancelled(warnings, summaries, start));
            }
            let mut writer = SheetWriter::new(
                workbook.add_worksheet_with_constant_memory(),
                sheet.name,
                sheet.headers,
                &header_format,
                limits,
            )?;
            for row in &sheet.rows {
                if writer.write_row(row)? {
                    tracker.advance(sheet.name);
                }
            }
            Self::finish_sheet(writer, &mut warnings, &mut summaries)?;
            tracker.sheet_done(sheet.name);
        }

        if cancel.is_cancelled() {
            return Ok(self.cancelled(warnings, summaries, start));
        }

        tracker.emit(SAVE_PERCENT, ExportState::Writing, "Saving workbook");
        workbook.save(destination)?;
        let file_size_bytes = std::fs::metadata(destination)
            .map_err(|source| ExportError::Destination {
                path: destination.to_path_buf(),
                source,
            })?
            .len();

        self.state = ExportState::Completed;
        tracker.emit(100.0, ExportState::Completed, "Export complete");

        let report = ExportReport {
            state: self.state,
            success: true,
            written_path: Some(destination.to_path_buf()),
            file_size_bytes,
            rows_written,
            sheets: summaries,
            warnings,
            duration: start.elapsed(),
        };
        tracing::info!(
            destination = %destination.display(),
            rows = report.rows_written,
            bytes = report.file_size_bytes,
            warnings = report.warnings.len(),
            time = %humantime::format_duration(Duration::from_millis(report.duration.as_millis() as u64)),
            "export completed"
        );
        Ok(report)
    }

    fn finish_sheet(
        writer: SheetWriter<'_>,
        warnings: &mut Vec<String>,
        summaries: &mut Vec<SheetSummary>,
    ) -> Result<(), ExportError> {
        let name = writer.name();
        let (rows, sheet_warnings) = writer.finish()?;
        summaries.push(SheetSummary {
            name: name.to_string(),
            rows,
        });
        for warning in &sheet_warnings {
            tracing::warn!("{}", warning);
        }
        warnings.extend(sheet_warnings);
        tracing::debug!(sheets = summaries.len(), rows, "sheet written");
        Ok(())
    }

    fn cancelled(&mut self, warnings: Vec<String>, sheets: Vec<SheetSummary>, start: Instant) -> ExportReport {
        self.state = ExportState::Cancelled;
        tracing::info!(sheets = sheets.len(), "export cancelled; nothing saved");
        ExportReport {
            state: self.state,
            success: false,
            written_path: None,
            file_size_bytes: 0,
            rows_written: 0,
            sheets,
            warnings,
            duration: start.elapsed(),
        }
    }
}

/// One-shot export with the default configuration.
pub fn export<E: Borrow<LogEntry>>(
    entries: &[E],
    stats: Option<&Statistics>,
    destination: &Path,
    progress: &mut dyn FnMut(&ExportProgress),
    cancel: &CancelToken,
) -> Result<ExportReport, ExportError> {
    Exporter::default().export(entries, stats, destination, progress, cancel)
}
