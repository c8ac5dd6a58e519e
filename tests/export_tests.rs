// tests/export_tests.rs

use accesslog::{
    aggregate, export, filter, parse, CancelToken, ExportConfig, ExportError, ExportProgress, ExportState,
    Exporter, FilterCriteria, LogEntry, StatusCodeRange,
};
use calamine::{open_workbook, Data, Range, Reader, Xlsx};
use std::io::Write;
use std::path::Path;
use tempfile::{NamedTempFile, TempDir};

fn synthetic_log(lines: usize) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for i in 0..lines {
        let status = if i % 4 == 0 { 404 } else { 200 };
        writeln!(
            file,
            "10.0.{}.{} - - [01/Feb/2024:12:{:02}:{:02} +0000] \"GET /page/{} HTTP/1.1\" {} {} \"-\" \"Mozilla/5.0\"",
            i / 250,
            i % 250,
            (i / 60) % 60,
            i % 60,
            i % 7,
            status,
            100 + i
        )
        .unwrap();
    }
    file.flush().unwrap();
    file
}

fn read_sheet(path: &Path, name: &str) -> Range<Data> {
    let mut workbook: Xlsx<_> = open_workbook(path).unwrap();
    workbook.worksheet_range(name).unwrap()
}

fn cell(range: &Range<Data>, row: u32, col: u32) -> String {
    range.get_value((row, col)).map(|d| d.to_string()).unwrap_or_default()
}

fn load(lines: usize) -> Vec<LogEntry> {
    let file = synthetic_log(lines);
    parse(file.path()).unwrap().entries
}

#[test]
fn test_full_export() {
    let entries = load(200);
    let stats = aggregate(&entries, None);
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("report.xlsx");

    let mut progress: Vec<ExportProgress> = Vec::new();
    let report = export(&entries, Some(&stats), &path, &mut |p| progress.push(p.clone()), &CancelToken::new()).unwrap();

    assert!(report.success);
    assert_eq!(report.state, ExportState::Completed);
    assert_eq!(report.rows_written, 200);
    assert!(path.exists());
    assert_eq!(report.file_size_bytes, std::fs::metadata(&path).unwrap().len());
    assert_eq!(report.sheets.len(), 7);
    assert_eq!(report.sheets[0].name, "Entries");
    assert_eq!(report.sheets[0].rows, 201);
    assert!(report.warnings.is_empty());

    assert!(progress.windows(2).all(|w| w[0].percent <= w[1].percent));
    assert_eq!(progress.last().unwrap().phase, ExportState::Completed);

    let sheet = read_sheet(&path, "Entries");
    assert_eq!(sheet.height(), 201);
    assert_eq!(cell(&sheet, 0, 0), "Line");
    assert_eq!(cell(&sheet, 1, 1), "10.0.0.0");
    assert_eq!(cell(&sheet, 1, 3), entries[0].timestamp.to_rfc3339());
    assert_eq!(cell(&sheet, 200, 1), "10.0.0.199");

    let summary = read_sheet(&path, "Summary");
    assert_eq!(cell(&summary, 0, 0), "Metric");
}

#[test]
fn test_export_over_row_limit() {
    let entries = load(120);
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("limited.xlsx");
    let mut exporter = Exporter::new(ExportConfig {
        max_rows: 101,
        ..ExportConfig::default()
    });

    let report = exporter
        .export(&entries, None, &path, &mut |_| {}, &CancelToken::new())
        .unwrap();

    assert!(report.success);
    assert_eq!(report.sheets[0].rows, 101);
    assert_eq!(report.rows_written, 100);
    assert!(report.warnings.iter().any(|w| w.contains("20 rows were not written")));

    // Header plus exactly max_rows - 1 entries in the saved file
    let sheet = read_sheet(&path, "Entries");
    assert_eq!(sheet.height(), 101);
    assert_eq!(cell(&sheet, 100, 0), "100");
}

#[test]
fn test_cancelled_export() {
    let entries = load(100);
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("never.xlsx");
    let cancel = CancelToken::new();
    cancel.cancel();

    let mut exporter = Exporter::default();
    let report = exporter
        .export(&entries, None, &path, &mut |_| {}, &cancel)
        .unwrap();

    assert_ne!(report.state, ExportState::Completed);
    assert!(!report.success);
    assert!(!path.exists());
}

#[test]
fn test_export_filtered_view() {
    let entries = load(40);
    let view = filter(
        &entries,
        &FilterCriteria {
            status_code_range: Some(StatusCodeRange::CLIENT_ERROR),
            ..Default::default()
        },
    )
    .matched;
    let stats = aggregate(&view, None);
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("errors.xlsx");

    let report = export(&view, Some(&stats), &path, &mut |_| {}, &CancelToken::new()).unwrap();
    assert_eq!(report.rows_written, 10);
}

#[test]
fn test_export_rejects_bad_destination() {
    let entries = load(1);
    let dir = TempDir::new().unwrap();

    let wrong_ext = export(&entries, None, dir.path().join("report.txt"), &mut |_| {}, &CancelToken::new());
    assert!(matches!(wrong_ext, Err(ExportError::InvalidDestination { .. })));

    let directory = export(&entries, None, dir.path(), &mut |_| {}, &CancelToken::new());
    assert!(matches!(directory, Err(ExportError::InvalidDestination { .. })));
}
