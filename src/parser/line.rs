// src/parser/line.rs - Single-line Apache access log parsing

use crate::model::LogEntry;
use chrono::DateTime;
use once_cell::sync::Lazy;
use regex::Regex;

pub const APACHE_TIME_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

// %h %l %u %t "%r" %>s %b, optionally followed by "%{Referer}i" "%{User-agent}i".
// The user agent runs to the last quote on the line, so a bare `"` inside it
// stays in the field. Unquoted trailing tokens (e.g. %D) are ignored; any
// other quoted tail is a mismatch rather than a Common Log Format line.
static ACCESS_LOG_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r#"^(\S+) (\S+) (\S+) \[([^\]]+)\] "((?:[^"\\]|\\.)*)" (\S+) (\S+)"#,
        r#"(?: "((?:[^"\\]|\\.)*)" "(.*)")?"#,
        r#"(?:\s+[^"]*)?$"#,
    ))
    .expect("access log pattern is valid")
});

pub trait LineParser {
    fn parse_line(&self, line_number: usize, line: &str) -> Result<LogEntry, String>;

    /// Cheap format check without building an entry
    fn matches(&self, line: &str) -> bool {
        self.parse_line(0, line).is_ok()
    }
}

/// Combined Log Format parser with a Common Log Format fallback.
#[derive(Debug, Default, Clone, Copy)]
pub struct CombinedLogParser;

impl CombinedLogParser {
    pub fn new() -> Self {
        Self
    }
}

impl LineParser for CombinedLogParser {
    fn parse_line(&self, line_number: usize, line: &str) -> Result<LogEntry, String> {
        if line.trim().is_empty() {
            return Err("empty line".to_string());
        }

        let caps = ACCESS_LOG_PATTERN
            .captures(line)
            .ok_or_else(|| "line does not match the Combined Log Format".to_string())?;

        let field = |i: usize| caps.get(i).map(|m| m.as_str()).unwrap_or("");

        let timestamp = DateTime::parse_from_str(field(4), APACHE_TIME_FORMAT)
            .map_err(|e| format!("invalid timestamp '{}': {}", field(4), e))?;

        let request = unescape(field(5));
        let mut tokens = request.split_whitespace();
        let (method, url, protocol) = match (tokens.next(), tokens.next(), tokens.next(), tokens.next()) {
            (Some(method), Some(url), Some(protocol), None) => (method, url, protocol),
            _ => return Err(format!("malformed request line '{}'", request)),
        };

        let status_code = parse_status(field(6))?;
        let response_bytes = parse_size(field(7))?;

        Ok(LogEntry {
            line_number,
            ip: field(1).to_string(),
            user: absent_as_empty(field(3)),
            timestamp,
            method: method.to_string(),
            url: url.to_string(),
            protocol: protocol.to_string(),
            status_code,
            response_bytes,
            referer: absent_as_empty(&unescape(field(8))),
            user_agent: absent_as_empty(&unescape(field(9))),
            raw_line: line.to_string(),
        })
    }

    fn matches(&self, line: &str) -> bool {
        ACCESS_LOG_PATTERN.is_match(line)
    }
}

fn parse_status(text: &str) -> Result<u16, String> {
    match text.parse::<u16>() {
        Ok(code) if (100..=999).contains(&code) => Ok(code),
        _ => Err(format!("invalid status code '{}'", text)),
    }
}

fn parse_size(text: &str) -> Result<u64, String> {
    if text == "-" {
        return Ok(0);
    }
    text.parse::<u64>()
        .map_err(|_| format!("invalid response size '{}'", text))
}

fn absent_as_empty(value: &str) -> String {
    if value == "-" {
        String::new()
    } else {
        value.to_string()
    }
}

// Apache escapes `"` and `\` inside quoted fields.
fn unescape(value: &str) -> std::borrow::Cow<'_, str> {
    if !value.contains('\\') {
        return std::borrow::Cow::Borrowed(value);
    }

    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some(escaped @ ('"' | '\\')) => out.push(escaped),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(ch);
        }
    }
    std::borrow::Cow::Owned(out)
}
