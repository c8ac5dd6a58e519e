use anyhow::{bail, Context};
use chrono::{DateTime, FixedOffset};
use clap::{Args, Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use accesslog::parser::line::APACHE_TIME_FORMAT;
use accesslog::{
    filter_and_search, AnalyzerConfig, Aggregator, CancelToken, EntryWriter, ExportState, Exporter,
    FilterCriteria, LogEntry, LogParser, OutputFormat, ParseOutcome, ResponseSizeRange, SearchCriteria,
    Statistics, StatusCodeRange, TimeRange, ViewStats,
};

#[derive(Parser)]
#[command(name = "accesslog")]
#[command(about = "Analyze Apache access logs: parse, summarize, filter, search and export to Excel")]
#[command(version)]
struct Cli {
    /// YAML configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Debug mode - verbose logging on stderr
    #[arg(long, global = true)]
    debug: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a log and report line counts, errors and throughput
    Parse {
        file: PathBuf,

        /// Maximum parse error samples to keep
        #[arg(long, value_name = "N")]
        max_errors: Option<usize>,
    },

    /// Compute traffic statistics
    Stats {
        file: PathBuf,

        /// Length of the top IP / path / bot lists
        #[arg(long, value_name = "N")]
        top: Option<usize>,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// List entries matching structured criteria
    Filter {
        file: PathBuf,

        #[command(flatten)]
        filter: FilterArgs,

        #[command(flatten)]
        listing: ListingArgs,
    },

    /// List entries matching free-text criteria
    Search {
        file: PathBuf,

        #[command(flatten)]
        search: SearchArgs,

        #[command(flatten)]
        filter: FilterArgs,

        #[command(flatten)]
        listing: ListingArgs,

        /// Mark matches of --keyword with <mark> tags in text output
        #[arg(long)]
        highlight: bool,
    },

    /// Write entries and statistics to an .xlsx workbook
    Export {
        file: PathBuf,

        /// Destination workbook
        #[arg(short = 'o', long = "output", value_name = "FILE.xlsx")]
        output: PathBuf,

        /// Only write the Entries sheet
        #[arg(long)]
        no_stats: bool,

        /// Rows per sheet, header included
        #[arg(long, value_name = "N")]
        max_rows: Option<u32>,

        #[command(flatten)]
        filter: FilterArgs,

        #[command(flatten)]
        search: SearchArgs,
    },
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// Exact status codes (comma separated)
    #[arg(long = "status", value_delimiter = ',', value_name = "CODE")]
    status: Vec<u16>,

    /// Status range: MIN-MAX, or a class like 4xx / errors
    #[arg(long = "status-range", value_name = "RANGE")]
    status_range: Option<String>,

    /// HTTP methods (comma separated)
    #[arg(long = "method", value_delimiter = ',', value_name = "METHOD")]
    methods: Vec<String>,

    /// Earliest timestamp (inclusive)
    #[arg(long, value_name = "TIME")]
    since: Option<String>,

    /// Latest timestamp (inclusive)
    #[arg(long, value_name = "TIME")]
    until: Option<String>,

    /// Minimum response size in bytes
    #[arg(long, value_name = "BYTES", allow_negative_numbers = true)]
    min_size: Option<i64>,

    /// Maximum response size in bytes
    #[arg(long, value_name = "BYTES", allow_negative_numbers = true)]
    max_size: Option<i64>,
}

#[derive(Args, Debug, Default)]
struct SearchArgs {
    #[arg(long)]
    ip: Option<String>,

    #[arg(long)]
    url: Option<String>,

    #[arg(long = "user-agent")]
    user_agent: Option<String>,

    /// Method substring
    #[arg(long = "method-contains")]
    method: Option<String>,

    #[arg(long)]
    user: Option<String>,

    /// Match in any field
    #[arg(short = 'k', long)]
    keyword: Option<String>,

    #[arg(long)]
    case_sensitive: bool,
}

#[derive(Args, Debug)]
struct ListingArgs {
    /// Output format for matched entries
    #[arg(short = 'F', long = "format", value_enum, default_value = "text")]
    format: OutputFormat,

    /// Only print the match counts
    #[arg(long)]
    count: bool,

    /// Print at most N entries
    #[arg(long, value_name = "N")]
    limit: Option<usize>,
}

impl FilterArgs {
    fn to_criteria(&self) -> anyhow::Result<FilterCriteria> {
        let time_range = if self.since.is_some() || self.until.is_some() {
            Some(TimeRange {
                start: self.since.as_deref().map(parse_time).transpose()?,
                end: self.until.as_deref().map(parse_time).transpose()?,
            })
        } else {
            None
        };

        let response_size_range = if self.min_size.is_some() || self.max_size.is_some() {
            Some(ResponseSizeRange {
                min: self.min_size,
                max: self.max_size,
            })
        } else {
            None
        };

        let criteria = FilterCriteria {
            status_codes: (!self.status.is_empty()).then(|| self.status.clone()),
            status_code_range: self.status_range.as_deref().map(parse_status_range).transpose()?,
            time_range,
            methods: (!self.methods.is_empty()).then(|| self.methods.clone()),
            response_size_range,
        };

        let problems = criteria.validate();
        if !problems.is_empty() {
            let listing: Vec<String> = problems.iter().map(|p| format!("  - {}", p)).collect();
            bail!("invalid filter criteria:\n{}", listing.join("\n"));
        }
        Ok(criteria)
    }
}

impl SearchArgs {
    fn to_criteria(&self) -> SearchCriteria {
        SearchCriteria {
            ip: self.ip.clone(),
            url: self.url.clone(),
            user_agent: self.user_agent.clone(),
            method: self.method.clone(),
            user: self.user.clone(),
            keyword: self.keyword.clone(),
            case_sensitive: self.case_sensitive,
        }
    }
}

/// Apache form (`10/Oct/2023:13:55:36 +0000`) first, then anything
/// dateparser understands.
fn parse_time(text: &str) -> anyhow::Result<DateTime<FixedOffset>> {
    if let Ok(t) = DateTime::parse_from_str(text, APACHE_TIME_FORMAT) {
        return Ok(t);
    }
    let utc = dateparser::parse(text).with_context(|| format!("Cannot parse time '{}'", text))?;
    Ok(utc.into())
}

fn parse_status_range(text: &str) -> anyhow::Result<StatusCodeRange> {
    let range = match text.to_lowercase().as_str() {
        "2xx" | "success" => StatusCodeRange::SUCCESS,
        "3xx" | "redirect" => StatusCodeRange::REDIRECT,
        "4xx" => StatusCodeRange::CLIENT_ERROR,
        "5xx" => StatusCodeRange::SERVER_ERROR,
        "errors" => StatusCodeRange::ALL_ERRORS,
        other => {
            let (min, max) = other
                .split_once('-')
                .with_context(|| format!("Invalid status range '{}': expected MIN-MAX or a class like 4xx", text))?;
            StatusCodeRange {
                min: min.trim().parse().with_context(|| format!("Invalid status code '{}'", min))?,
                max: max.trim().parse().with_context(|| format!("Invalid status code '{}'", max))?,
            }
        }
    };
    Ok(range)
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => AnalyzerConfig::load(path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        None => AnalyzerConfig::default(),
    };

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel()).context("Failed to install Ctrl-C handler")?;

    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());

    match &cli.command {
        Command::Parse { file, max_errors } => {
            let mut config = config;
            if let Some(n) = max_errors {
                config.parser.max_error_samples = *n;
            }
            let outcome = parse_file(&config, file, &cancel)?;
            if cli.json {
                let summary = serde_json::json!({
                    "totalLines": outcome.total_lines,
                    "parsedLines": outcome.parsed_lines,
                    "errorLines": outcome.error_lines,
                    "errorSamples": outcome.error_samples,
                    "parseTimeMs": outcome.parse_time.as_millis() as u64,
                    "bytesRead": outcome.bytes_read,
                    "memoryBytes": outcome.memory_bytes,
                    "throughputMbps": outcome.throughput_mbps,
                    "cancelled": outcome.cancelled,
                });
                writeln!(out, "{}", serde_json::to_string_pretty(&summary)?)?;
            } else {
                print_parse_summary(&mut out, &outcome)?;
            }
        }

        Command::Stats { file, top, filter } => {
            let mut config = config;
            if let Some(n) = top {
                config.stats.top_k = *n;
            }
            let criteria = filter.to_criteria()?;
            let outcome = parse_file(&config, file, &cancel)?;
            let view = accesslog::filter::filter(&outcome.entries, &criteria);
            let stats = Aggregator::from_config(&config.stats).aggregate(&view);
            if cli.json {
                writeln!(out, "{}", serde_json::to_string_pretty(&stats)?)?;
            } else {
                print_stats(&mut out, &stats)?;
            }
        }

        Command::Filter { file, filter, listing } => {
            let criteria = filter.to_criteria()?;
            let outcome = parse_file(&config, file, &cancel)?;
            let matched = accesslog::filter::filter(&outcome.entries, &criteria);
            write_listing(&mut out, &matched, outcome.entries.len(), listing, None, cli.json)?;
        }

        Command::Search {
            file,
            search,
            filter,
            listing,
            highlight,
        } => {
            let filter_criteria = filter.to_criteria()?;
            let search_criteria = search.to_criteria();
            let outcome = parse_file(&config, file, &cancel)?;
            let matched = filter_and_search(&outcome.entries, &filter_criteria, &search_criteria);
            let mark = highlight
                .then(|| search_criteria.keyword.clone())
                .flatten()
                .map(|k| (k, search_criteria.case_sensitive));
            write_listing(&mut out, &matched, outcome.entries.len(), listing, mark, cli.json)?;
        }

        Command::Export {
            file,
            output,
            no_stats,
            max_rows,
            filter,
            search,
        } => {
            let mut config = config;
            if let Some(n) = max_rows {
                config.export.max_rows = *n;
            }
            let filter_criteria = filter.to_criteria()?;
            let search_criteria = search.to_criteria();
            let outcome = parse_file(&config, file, &cancel)?;
            let view = filter_and_search(&outcome.entries, &filter_criteria, &search_criteria);
            let stats = (!no_stats).then(|| Aggregator::from_config(&config.stats).aggregate(&view));

            let estimate = accesslog::estimate_file_size(view.len());
            tracing::debug!(entries = view.len(), estimated_bytes = estimate, "exporting");

            let mut exporter = Exporter::new(config.export.clone());
            let report = exporter
                .export(
                    &view,
                    stats.as_ref(),
                    output,
                    &mut |p| tracing::debug!(percent = p.percent, phase = %p.phase, "{}", p.message),
                    &cancel,
                )
                .with_context(|| format!("Export to '{}' failed", output.display()))?;

            for warning in &report.warnings {
                eprintln!("Warning: {}", warning);
            }
            if cli.json {
                writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
            } else if report.state == ExportState::Cancelled {
                writeln!(out, "Export cancelled; no file written")?;
            } else {
                writeln!(
                    out,
                    "Wrote {} entries to {} ({} bytes, {})",
                    report.rows_written,
                    output.display(),
                    report.file_size_bytes,
                    format_duration(report.duration)
                )?;
            }
            if !report.success {
                out.flush()?;
                bail!("export did not complete (state: {})", report.state);
            }
        }
    }

    out.flush()?;
    Ok(())
}

fn parse_file(config: &AnalyzerConfig, path: &Path, cancel: &CancelToken) -> anyhow::Result<ParseOutcome> {
    let parser = LogParser::new(config.parser.clone());
    let outcome = parser
        .parse_path_with_progress(
            path,
            &mut |p| {
                tracing::debug!(
                    lines = p.lines_read,
                    percent = p.percentage().unwrap_or(0.0),
                    "parse progress"
                )
            },
            cancel,
        )
        .with_context(|| format!("Failed to parse '{}'", path.display()))?;

    if outcome.cancelled {
        eprintln!(
            "Warning: parsing cancelled after {} lines; results are partial",
            outcome.total_lines
        );
    }
    if outcome.error_lines > 0 {
        tracing::warn!(
            errors = outcome.error_lines,
            total = outcome.total_lines,
            "some lines could not be parsed"
        );
    }
    Ok(outcome)
}

fn write_listing<W: Write>(
    out: &mut W,
    matched: &[&LogEntry],
    total: usize,
    listing: &ListingArgs,
    highlight: Option<(String, bool)>,
    json: bool,
) -> anyhow::Result<()> {
    let stats = ViewStats::new(total, matched.len());
    if listing.count {
        if json {
            writeln!(out, "{}", serde_json::to_string(&stats)?)?;
        } else {
            writeln!(out, "{} of {} entries ({:.2}%)", stats.filtered, stats.total, stats.percentage)?;
        }
        return Ok(());
    }

    // --json implies JSON Lines for listings
    let format = if json { OutputFormat::Jsonl } else { listing.format };
    let mut writer = EntryWriter::new(format);
    if let Some((term, case_sensitive)) = highlight {
        writer = writer.with_highlight(term, case_sensitive);
    }
    let limit = listing.limit.unwrap_or(usize::MAX);
    writer.write_all(out, matched.iter().take(limit).copied())?;
    tracing::info!(matched = stats.filtered, total = stats.total, "listing written");
    Ok(())
}

fn format_duration(d: Duration) -> String {
    humantime::format_duration(Duration::from_millis(d.as_millis() as u64)).to_string()
}

fn print_parse_summary<W: Write>(out: &mut W, outcome: &ParseOutcome) -> io::Result<()> {
    writeln!(out, "Total lines:   {}", outcome.total_lines)?;
    writeln!(out, "Parsed lines:  {}", outcome.parsed_lines)?;
    writeln!(out, "Error lines:   {}", outcome.error_lines)?;
    writeln!(out, "Parse time:    {}", format_duration(outcome.parse_time))?;
    writeln!(out, "Throughput:    {:.2} MB/s", outcome.throughput_mbps)?;
    writeln!(out, "Memory (est.): {} bytes", outcome.memory_bytes)?;
    if outcome.cancelled {
        writeln!(out, "Cancelled:     yes")?;
    }
    if !outcome.error_samples.is_empty() {
        writeln!(out, "Error samples:")?;
        for sample in &outcome.error_samples {
            writeln!(out, "  line {}: {} ({})", sample.line_number, sample.reason, sample.line)?;
        }
    }
    Ok(())
}

fn print_stats<W: Write>(out: &mut W, stats: &Statistics) -> io::Result<()> {
    writeln!(out, "Total requests:  {}", stats.total_requests)?;
    writeln!(out, "Unique IPs:      {}", stats.unique_ips)?;
    writeln!(out, "Unique paths:    {}", stats.unique_paths)?;
    writeln!(out, "Total bytes:     {}", stats.total_bytes)?;
    writeln!(out, "Average size:    {:.2}", stats.average_response_size)?;
    writeln!(out, "Error rate:      {:.2}%", stats.error_rate)?;
    if let (Some(first), Some(last)) = (stats.first_timestamp, stats.last_timestamp) {
        writeln!(out, "Time span:       {} .. {}", first.to_rfc3339(), last.to_rfc3339())?;
    }

    let dist = &stats.status_code_distribution;
    writeln!(
        out,
        "Status classes:  2xx={} 3xx={} 4xx={} 5xx={} other={}",
        dist.success, dist.redirection, dist.client_error, dist.server_error, dist.other
    )?;

    if !stats.top_ips.is_empty() {
        writeln!(out, "\nTop IPs:")?;
        for ip in &stats.top_ips {
            writeln!(out, "  {:<40} {:>8}  {} bytes", ip.ip, ip.request_count, ip.total_bytes)?;
        }
    }
    if !stats.top_paths.is_empty() {
        writeln!(out, "\nTop paths:")?;
        for path in &stats.top_paths {
            writeln!(
                out,
                "  {:<40} {:>8}  {:.2}% errors",
                path.path, path.request_count, path.error_rate
            )?;
        }
    }

    let bots = &stats.bot_stats;
    writeln!(
        out,
        "\nBots: {} of {} requests ({:.2}%)",
        bots.bot_requests, bots.total_requests, bots.bot_percentage
    )?;
    for bot in &bots.top_bots {
        writeln!(out, "  {:<60} {:>8}  {:.2}%", bot.user_agent, bot.count, bot.percentage)?;
    }
    Ok(())
}
