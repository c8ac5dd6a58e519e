// tests/parser_tests.rs

use accesslog::{parse, AnalyzerError, CancelToken, LogParser, ParserConfig};
use chrono::{Datelike, Timelike};
use std::io::Write;
use tempfile::NamedTempFile;

const SAMPLE_LOG: &str = r#"192.168.1.100 - - [01/Jan/2024:10:00:00 +0000] "GET /index.html HTTP/1.1" 200 1024 "-" "Mozilla/5.0"
192.168.1.101 - alice [01/Jan/2024:10:00:05 +0000] "POST /api/login HTTP/1.1" 401 512 "https://example.com/" "curl/7.68.0"
10.0.0.1 - - [01/Jan/2024:10:01:00 +0000] "GET /admin HTTP/1.1" 403 0 "-" "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)"
10.0.0.1 - - [01/Jan/2024:10:02:00 +0000] "GET /missing HTTP/1.1" 404 - "-" "Mozilla/5.0"
192.168.1.100 - - [01/Jan/2024:10:03:00 +0000] "GET /index.html HTTP/1.1" 500 2048 "-" "Mozilla/5.0"
not a log line
192.168.1.102 - - [01/Jan/2024:11:00:00 +0100] "DELETE /api/item/7 HTTP/1.1" 204 0 "-" "python-requests/2.31"
"#;

fn log_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_parse_sample_file() {
    let file = log_file(SAMPLE_LOG);
    let outcome = parse(file.path()).unwrap();

    assert_eq!(outcome.total_lines, 7);
    assert_eq!(outcome.parsed_lines, 6);
    assert_eq!(outcome.error_lines, 1);
    assert_eq!(outcome.entries.len(), 6);
    assert!(!outcome.cancelled);
    assert_eq!(outcome.bytes_read, SAMPLE_LOG.len() as u64);
    assert!(outcome.memory_bytes > 0);

    let first = &outcome.entries[0];
    assert_eq!(first.ip, "192.168.1.100");
    assert_eq!(first.method, "GET");
    assert_eq!(first.url, "/index.html");
    assert_eq!(first.status_code, 200);
    assert_eq!(first.response_bytes, 1024);
    assert_eq!(first.referer, "");
    assert_eq!(first.user_agent, "Mozilla/5.0");
    assert_eq!(first.timestamp.year(), 2024);
    assert_eq!(first.timestamp.hour(), 10);
}

#[test]
fn test_absent_fields() {
    let file = log_file(SAMPLE_LOG);
    let outcome = parse(file.path()).unwrap();

    assert_eq!(outcome.entries[1].user, "alice");
    assert_eq!(outcome.entries[1].referer, "https://example.com/");
    assert_eq!(outcome.entries[0].user, "");
    // "-" size
    assert_eq!(outcome.entries[3].response_bytes, 0);
}

#[test]
fn test_error_sample_reports_line() {
    let file = log_file(SAMPLE_LOG);
    let outcome = parse(file.path()).unwrap();

    assert_eq!(outcome.error_samples.len(), 1);
    assert_eq!(outcome.error_samples[0].line_number, 6);
    assert_eq!(outcome.error_samples[0].line, "not a log line");
    // The entry after the bad line keeps its physical line number
    assert_eq!(outcome.entries[5].line_number, 7);
}

#[test]
fn test_timestamp_keeps_offset() {
    let file = log_file(SAMPLE_LOG);
    let outcome = parse(file.path()).unwrap();
    let last = &outcome.entries[5];
    assert_eq!(last.timestamp.offset().local_minus_utc(), 3600);
    assert_eq!(last.timestamp.to_rfc3339(), "2024-01-01T11:00:00+01:00");
}

#[test]
fn test_common_log_format_fallback() {
    let file = log_file("127.0.0.1 - frank [10/Oct/2000:13:55:36 -0700] \"GET /apache_pb.gif HTTP/1.0\" 200 2326\n");
    let outcome = parse(file.path()).unwrap();
    assert_eq!(outcome.parsed_lines, 1);
    let entry = &outcome.entries[0];
    assert_eq!(entry.user, "frank");
    assert_eq!(entry.referer, "");
    assert_eq!(entry.user_agent, "");
}

#[test]
fn test_empty_file() {
    let file = log_file("");
    let outcome = parse(file.path()).unwrap();
    assert_eq!(outcome.total_lines, 0);
    assert!(outcome.entries.is_empty());
}

#[test]
fn test_not_found() {
    let result = parse("/no/such/access.log");
    match result {
        Err(AnalyzerError::NotFound { path }) => assert!(path.ends_with("access.log")),
        other => panic!("expected NotFound, got {:?}", other.map(|o| o.total_lines)),
    }
}

#[test]
fn test_validate_first_line_and_format() {
    let parser = LogParser::default();

    let good = log_file(SAMPLE_LOG);
    assert!(parser.validate_first_line(good.path()).is_ok());
    // 6 of 7 lines match
    assert!(parser.validate_format(good.path(), 100).unwrap());

    let bad = log_file("hello\nworld\n");
    assert!(matches!(
        parser.validate_first_line(bad.path()),
        Err(AnalyzerError::InvalidFormat(_))
    ));
    assert!(!parser.validate_format(bad.path(), 100).unwrap());
}

#[test]
fn test_cancel_before_start_returns_partial() {
    let file = log_file(SAMPLE_LOG);
    let cancel = CancelToken::new();
    cancel.cancel();
    let outcome = LogParser::new(ParserConfig::default())
        .parse_path_with_progress(file.path(), &mut |_| {}, &cancel)
        .unwrap();
    assert!(outcome.cancelled);
    assert_eq!(outcome.total_lines, 0);
}

#[test]
fn test_synthetic_lines_round_trip() {
    let cases = [("GET", "/a", 200u16, 10u64), ("POST", "/b?x=1", 302, 0), ("PUT", "/c", 503, 99999)];
    let content: String = cases
        .iter()
        .map(|(method, path, status, bytes)| {
            format!(
                "10.1.1.1 - - [15/Mar/2024:08:30:00 +0000] \"{} {} HTTP/1.1\" {} {} \"-\" \"test\"\n",
                method, path, status, bytes
            )
        })
        .collect();
    let file = log_file(&content);
    let outcome = parse(file.path()).unwrap();

    assert_eq!(outcome.parsed_lines, cases.len());
    for (entry, (method, path, status, bytes)) in outcome.entries.iter().zip(cases.iter()) {
        assert_eq!(entry.method, *method);
        assert_eq!(entry.url, *path);
        assert_eq!(entry.status_code, *status);
        assert_eq!(entry.response_bytes, *bytes);
    }
}
