// src/export/sheets.rs
use std::borrow::Cow;
use std::collections::BTreeSet;

use rust_xlsxwriter::{Format, Worksheet, XlsxError};

use crate::model::{LogEntry, StatusClass};
use crate::stats::Statistics;

pub const ENTRIES: &str = "Entries";
pub const SUMMARY: &str = "Summary";
pub const TOP_IPS: &str = "Top IPs";
pub const TOP_PATHS: &str = "Top Paths";
pub const STATUS_CODES: &str = "Status Codes";
pub const METHODS: &str = "Methods";
pub const BOTS: &str = "Bots";

pub const ENTRY_HEADERS: &[&str] = &[
    "Line",
    "IP",
    "User",
    "Timestamp",
    "Method",
    "Path",
    "Protocol",
    "Status",
    "Bytes",
    "Referer",
    "User-Agent",
    "Raw Line",
];

const SUMMARY_HEADERS: &[&str] = &["Metric", "Value"];
const TOP_IP_HEADERS: &[&str] = &["Rank", "IP", "Requests", "Total Bytes", "Unique Paths"];
const TOP_PATH_HEADERS: &[&str] = &["Rank", "Path", "Requests", "Average Bytes", "Error Rate (%)"];
const STATUS_HEADERS: &[&str] = &["Status", "Requests", "Share (%)"];
const METHOD_HEADERS: &[&str] = &["Method", "Requests", "Share (%)"];
const BOT_HEADERS: &[&str] = &["Rank", "User-Agent", "Requests", "Share of Bot Traffic (%)"];

const MIN_COLUMN_WIDTH: f64 = 8.0;
const MAX_COLUMN_WIDTH: f64 = 60.0;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Cell<'a> {
    Empty,
    Text(Cow<'a, str>),
    Number(f64),
}

impl<'a> Cell<'a> {
    fn text(value: &'a str) -> Self {
        Cell::Text(Cow::Borrowed(value))
    }

    fn owned(value: String) -> Self {
        Cell::Text(Cow::Owned(value))
    }

    // Approximate display width in characters
    fn width(&self) -> usize {
        match self {
            Cell::Empty => 0,
            Cell::Text(text) => text.chars().count(),
            Cell::Number(n) => format!("{}", n).len(),
        }
    }
}

fn count(value: u64) -> Cell<'static> {
    Cell::Number(value as f64)
}

fn round2(value: f64) -> Cell<'static> {
    Cell::Number((value * 100.0).round() / 100.0)
}

fn share(part: u64, whole: u64) -> Cell<'static> {
    if whole == 0 {
        round2(0.0)
    } else {
        round2(part as f64 / whole as f64 * 100.0)
    }
}

pub(crate) fn entry_row(entry: &LogEntry) -> Vec<Cell<'_>> {
    vec![
        Cell::Number(entry.line_number as f64),
        Cell::text(&entry.ip),
        Cell::text(&entry.user),
        Cell::owned(entry.timestamp.to_rfc3339()),
        Cell::text(&entry.method),
        Cell::text(&entry.url),
        Cell::text(&entry.protocol),
        Cell::Number(entry.status_code as f64),
        count(entry.response_bytes),
        Cell::text(&entry.referer),
        Cell::text(&entry.user_agent),
        Cell::text(&entry.raw_line),
    ]
}

/// A fully materialised statistics sheet. These are small, so their row
/// counts are known before writing starts.
pub(crate) struct StatsSheet<'a> {
    pub name: &'static str,
    pub headers: &'static [&'static str],
    pub rows: Vec<Vec<Cell<'a>>>,
}

pub(crate) fn stats_sheets(stats: &Statistics) -> Vec<StatsSheet<'_>> {
    vec![
        summary_sheet(stats),
        top_ips_sheet(stats),
        top_paths_sheet(stats),
        status_codes_sheet(stats),
        methods_sheet(stats),
        bots_sheet(stats),
    ]
}

fn summary_sheet(stats: &Statistics) -> StatsSheet<'_> {
    let timestamp = |t: Option<chrono::DateTime<chrono::FixedOffset>>| match t {
        Some(t) => Cell::owned(t.to_rfc3339()),
        None => Cell::text("-"),
    };
    let bots = &stats.bot_stats;
    let metrics: Vec<(&str, Cell)> = vec![
        ("Total Requests", count(stats.total_requests)),
        ("Unique IPs", count(stats.unique_ips as u64)),
        ("Unique Paths", count(stats.unique_paths as u64)),
        ("Total Bytes", count(stats.total_bytes)),
        ("Average Response Size", round2(stats.average_response_size)),
        ("Min Response Bytes", count(stats.min_response_bytes)),
        ("Max Response Bytes", count(stats.max_response_bytes)),
        ("Error Requests", count(stats.error_requests)),
        ("Error Rate (%)", round2(stats.error_rate)),
        ("First Request", timestamp(stats.first_timestamp)),
        ("Last Request", timestamp(stats.last_timestamp)),
        ("Bot Requests", count(bots.bot_requests)),
        ("Human Requests", count(bots.human_requests)),
        ("Bot Traffic (%)", round2(bots.bot_percentage)),
    ];
    StatsSheet {
        name: SUMMARY,
        headers: SUMMARY_HEADERS,
        rows: metrics
            .into_iter()
            .map(|(metric, value)| vec![Cell::text(metric), value])
            .collect(),
    }
}

fn top_ips_sheet(stats: &Statistics) -> StatsSheet<'_> {
    StatsSheet {
        name: TOP_IPS,
        headers: TOP_IP_HEADERS,
        rows: stats
            .top_ips
            .iter()
            .enumerate()
            .map(|(i, ip)| {
                vec![
                    count(i as u64 + 1),
                    Cell::text(&ip.ip),
                    count(ip.request_count),
                    count(ip.total_bytes),
                    count(ip.unique_path_count as u64),
                ]
            })
            .collect(),
    }
}

fn top_paths_sheet(stats: &Statistics) -> StatsSheet<'_> {
    StatsSheet {
        name: TOP_PATHS,
        headers: TOP_PATH_HEADERS,
        rows: stats
            .top_paths
            .iter()
            .enumerate()
            .map(|(i, path)| {
                vec![
                    count(i as u64 + 1),
                    Cell::text(&path.path),
                    count(path.request_count),
                    round2(path.average_bytes),
                    round2(path.error_rate),
                ]
            })
            .collect(),
    }
}

fn status_codes_sheet(stats: &Statistics) -> StatsSheet<'_> {
    let dist = &stats.status_code_distribution;
    let total = stats.total_requests;
    let classes = [
        StatusClass::Success,
        StatusClass::Redirection,
        StatusClass::ClientError,
        StatusClass::ServerError,
        StatusClass::Other,
    ];

    let mut rows: Vec<Vec<Cell>> = classes
        .iter()
        .map(|class| {
            let n = dist.class_count(*class);
            vec![Cell::text(class.label()), count(n), share(n, total)]
        })
        .collect();
    rows.extend(
        dist.details
            .iter()
            .map(|(code, n)| vec![Cell::owned(code.to_string()), count(*n), share(*n, total)]),
    );

    StatsSheet {
        name: STATUS_CODES,
        headers: STATUS_HEADERS,
        rows,
    }
}

fn methods_sheet(stats: &Statistics) -> StatsSheet<'_> {
    let mut methods: Vec<(&String, &u64)> = stats.method_distribution.iter().collect();
    methods.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    StatsSheet {
        name: METHODS,
        headers: METHOD_HEADERS,
        rows: methods
            .into_iter()
            .map(|(method, n)| vec![Cell::text(method), count(*n), share(*n, stats.total_requests)])
            .collect(),
    }
}

fn bots_sheet(stats: &Statistics) -> StatsSheet<'_> {
    let bots = &stats.bot_stats;
    let mut rows: Vec<Vec<Cell>> = bots
        .top_bots
        .iter()
        .enumerate()
        .map(|(i, bot)| {
            vec![
                count(i as u64 + 1),
                Cell::text(&bot.user_agent),
                count(bot.count),
                round2(bot.percentage),
            ]
        })
        .collect();
    rows.extend(bots.bot_categories.iter().map(|(category, n)| {
        vec![
            Cell::Empty,
            Cell::owned(format!("Category: {}", category)),
            count(*n),
            share(*n, bots.bot_requests),
        ]
    }));
    StatsSheet {
        name: BOTS,
        headers: BOT_HEADERS,
        rows,
    }
}

/// Row and cell limits applied while writing one sheet.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Limits {
    /// Including the header row
    pub max_rows: u32,
    pub max_cell_chars: usize,
}

/// Writes rows in order into one workbook sheet under [`Limits`], tracking
/// the warnings the limits produce.
///
/// The sheet is expected to be in constant-memory mode, so each row is
/// flushed once the next one starts and must never be revisited.
pub(crate) struct SheetWriter<'w> {
    sheet: &'w mut Worksheet,
    name: &'static str,
    headers: &'static [&'static str],
    limits: Limits,
    next_row: u32,
    widths: Vec<usize>,
    truncated_columns: BTreeSet<u16>,
    overflow: u64,
}

impl<'w> SheetWriter<'w> {
    pub fn new(
        sheet: &'w mut Worksheet,
        name: &'static str,
        headers: &'static [&'static str],
        header_format: &Format,
        limits: Limits,
    ) -> Result<Self, XlsxError> {
        sheet.set_name(name)?;
        for (col, header) in headers.iter().enumerate() {
            sheet.write_string_with_format(0, col as u16, *header, header_format)?;
        }
        sheet.set_freeze_panes(1, 0)?;

        Ok(SheetWriter {
            sheet,
            name,
            headers,
            limits,
            next_row: 1,
            widths: headers.iter().map(|h| h.chars().count()).collect(),
            truncated_columns: BTreeSet::new(),
            overflow: 0,
        })
    }

    /// Data rows that still fit below the header.
    pub fn capacity(&self) -> u32 {
        self.limits.max_rows.saturating_sub(self.next_row)
    }

    /// Returns `false`, and counts the row as overflow, when the sheet is full.
    pub fn write_row(&mut self, cells: &[Cell]) -> Result<bool, XlsxError> {
        if self.capacity() == 0 {
            self.overflow += 1;
            return Ok(false);
        }
        let row = self.next_row;
        for (col, cell) in cells.iter().enumerate() {
            let col = col as u16;
            match cell {
                Cell::Empty => {}
                Cell::Number(n) => {
                    self.sheet.write_number(row, col, *n)?;
                }
                Cell::Text(text) => {
                    let text = self.clip(col, text);
                    self.sheet.write_string(row, col, text)?;
                }
            }
            if let Some(width) = self.widths.get_mut(col as usize) {
                *width = (*width).max(cell.width());
            }
        }
        self.next_row += 1;
        Ok(true)
    }

    /// Record rows that were never offered because they were known not to fit.
    pub fn note_overflow(&mut self, rows: u64) {
        self.overflow += rows;
    }

    fn clip<'t>(&mut self, col: u16, text: &'t str) -> &'t str {
        match text.char_indices().nth(self.limits.max_cell_chars) {
            Some((cut, _)) => {
                self.truncated_columns.insert(col);
                &text[..cut]
            }
            None => text,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Total rows on the sheet, header included.
    pub fn rows(&self) -> u32 {
        self.next_row
    }

    /// Apply column widths and report the row count with any warnings.
    pub fn finish(self) -> Result<(u32, Vec<String>), XlsxError> {
        for (col, width) in self.widths.iter().enumerate() {
            let width = (*width as f64 + 2.0).clamp(MIN_COLUMN_WIDTH, MAX_COLUMN_WIDTH);
            self.sheet.set_column_width(col as u16, width)?;
        }

        let mut warnings = Vec::new();
        if self.overflow > 0 {
            warnings.push(format!(
                "Sheet '{}' reached the limit of {} rows; {} rows were not written",
                self.name, self.limits.max_rows, self.overflow
            ));
        }
        for col in &self.truncated_columns {
            let header = self.headers.get(*col as usize).copied().unwrap_or("?");
            warnings.push(format!(
                "Sheet '{}' column '{}': values longer than {} characters were truncated",
                self.name, header, self.limits.max_cell_chars
            ));
        }
        Ok((self.next_row, warnings))
    }
}
