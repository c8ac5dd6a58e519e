// src/model.rs
use chrono::{DateTime, FixedOffset};
use serde::Serialize;

/// One parsed access-log request.
///
/// Absent (`-`) textual fields are empty strings and an absent size is zero.
/// The timestamp keeps the offset written in the log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub line_number: usize,
    pub ip: String,
    pub user: String,
    #[serde(serialize_with = "serialize_rfc3339")]
    pub timestamp: DateTime<FixedOffset>,
    pub method: String,
    pub url: String,
    pub protocol: String,
    pub status_code: u16,
    pub response_bytes: u64,
    pub referer: String,
    pub user_agent: String,
    pub raw_line: String,
}

// Same text as the CSV and workbook columns: RFC 3339 with the logged offset,
// `+00:00` rather than `Z`.
pub(crate) fn serialize_rfc3339<S: serde::Serializer>(t: &DateTime<FixedOffset>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&t.to_rfc3339())
}

pub(crate) fn serialize_rfc3339_opt<S: serde::Serializer>(
    t: &Option<DateTime<FixedOffset>>,
    s: S,
) -> Result<S::Ok, S::Error> {
    match t {
        Some(t) => serialize_rfc3339(t, s),
        None => s.serialize_none(),
    }
}

/// Status code bucket used by the statistics and the export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum StatusClass {
    #[serde(rename = "2xx")]
    Success,
    #[serde(rename = "3xx")]
    Redirection,
    #[serde(rename = "4xx")]
    ClientError,
    #[serde(rename = "5xx")]
    ServerError,
    #[serde(rename = "other")]
    Other,
}

impl StatusClass {
    pub fn of(status_code: u16) -> Self {
        match status_code {
            200..=299 => StatusClass::Success,
            300..=399 => StatusClass::Redirection,
            400..=499 => StatusClass::ClientError,
            500..=599 => StatusClass::ServerError,
            _ => StatusClass::Other,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StatusClass::Success => "2xx",
            StatusClass::Redirection => "3xx",
            StatusClass::ClientError => "4xx",
            StatusClass::ServerError => "5xx",
            StatusClass::Other => "other",
        }
    }
}

impl LogEntry {
    /// Status 400 and above
    pub fn is_error(&self) -> bool {
        self.status_code >= 400
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code)
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status_code)
    }

    /// 2xx and 3xx both count as success
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status_code)
    }

    pub fn status_class(&self) -> StatusClass {
        StatusClass::of(self.status_code)
    }

    /// Approximate heap footprint, used for the parse memory diagnostic.
    pub(crate) fn heap_size(&self) -> usize {
        self.ip.capacity()
            + self.user.capacity()
            + self.method.capacity()
            + self.url.capacity()
            + self.protocol.capacity()
            + self.referer.capacity()
            + self.user_agent.capacity()
            + self.raw_line.capacity()
    }
}

/// A line that could not be turned into a [`LogEntry`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseError {
    pub line_number: usize,
    pub line: String,
    pub reason: String,
}
