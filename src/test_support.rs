// Shared fixtures for unit tests
use crate::model::LogEntry;
use chrono::DateTime;

pub fn entry(
    line_number: usize,
    ip: &str,
    method: &str,
    url: &str,
    status_code: u16,
    response_bytes: u64,
    user_agent: &str,
) -> LogEntry {
    let timestamp = DateTime::parse_from_rfc3339("2024-01-01T10:00:00+00:00").unwrap()
        + chrono::Duration::seconds(line_number as i64);
    LogEntry {
        line_number,
        ip: ip.to_string(),
        user: String::new(),
        timestamp,
        method: method.to_string(),
        url: url.to_string(),
        protocol: "HTTP/1.1".to_string(),
        status_code,
        response_bytes,
        referer: String::new(),
        user_agent: user_agent.to_string(),
        raw_line: format!("{} {} {} {}", ip, method, url, status_code),
    }
}
