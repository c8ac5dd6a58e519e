// src/progress.rs
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag handed to long-running operations.
///
/// Clones observe the same flag, so a caller can keep one half and pass the
/// other into `parse` or `export`.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Incremental parse progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParseProgress {
    pub lines_read: usize,
    pub bytes_read: u64,
    /// Unknown when parsing from an arbitrary reader
    pub total_bytes: Option<u64>,
}

impl ParseProgress {
    pub fn percentage(&self) -> Option<f64> {
        match self.total_bytes {
            Some(0) => Some(100.0),
            Some(total) => Some((self.bytes_read as f64 / total as f64 * 100.0).min(100.0)),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_parse_percentage() {
        let progress = ParseProgress {
            lines_read: 10,
            bytes_read: 50,
            total_bytes: Some(200),
        };
        assert_eq!(progress.percentage(), Some(25.0));

        let unknown = ParseProgress {
            total_bytes: None,
            ..progress
        };
        assert_eq!(unknown.percentage(), None);
    }
}
