use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("File not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("IO error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Stream(#[from] std::io::Error),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Output error: {0}")]
    OutputError(String),
}

impl AnalyzerError {
    /// Map an open/read failure on `path`, splitting out the not-found case.
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            AnalyzerError::NotFound { path }
        } else {
            AnalyzerError::Io { path, source }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Invalid destination '{}': {reason}", path.display())]
    InvalidDestination { path: PathBuf, reason: String },

    #[error("Destination '{}' is not writable: {source}", path.display())]
    Destination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Workbook error: {0}")]
    Workbook(#[from] rust_xlsxwriter::XlsxError),

    #[error("Export already run: exporter is in state {0}")]
    AlreadyRun(crate::export::ExportState),
}

/// A structurally invalid criterion, reported before filtering.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("status code {field} {value} must be between 100 and 599")]
    StatusCodeOutOfRange { field: &'static str, value: u16 },

    #[error("status code range min {min} is greater than max {max}")]
    StatusCodeRangeInverted { min: u16, max: u16 },

    #[error("time range start {start} is later than end {end}")]
    TimeRangeInverted { start: String, end: String },

    #[error("response size {field} {value} must not be negative")]
    NegativeSize { field: &'static str, value: i64 },

    #[error("response size range min {min} is greater than max {max}")]
    SizeRangeInverted { min: i64, max: i64 },
}
