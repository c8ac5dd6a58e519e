// src/filter.rs
use std::borrow::Borrow;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::model::LogEntry;
use crate::search::{SearchCriteria, SearchMatcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCodeRange {
    pub min: u16,
    pub max: u16,
}

impl StatusCodeRange {
    pub const SUCCESS: StatusCodeRange = StatusCodeRange { min: 200, max: 299 };
    pub const REDIRECT: StatusCodeRange = StatusCodeRange { min: 300, max: 399 };
    pub const CLIENT_ERROR: StatusCodeRange = StatusCodeRange { min: 400, max: 499 };
    pub const SERVER_ERROR: StatusCodeRange = StatusCodeRange { min: 500, max: 599 };
    pub const ALL_ERRORS: StatusCodeRange = StatusCodeRange { min: 400, max: 599 };
}

/// Inclusive bounds compared by absolute instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<DateTime<FixedOffset>>,
    pub end: Option<DateTime<FixedOffset>>,
}

/// Inclusive byte bounds. Signed so that negative caller input can be
/// reported by [`FilterCriteria::validate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSizeRange {
    pub min: Option<i64>,
    pub max: Option<i64>,
}

/// Structured predicates, combined with AND. `None` and empty lists match
/// everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterCriteria {
    pub status_codes: Option<Vec<u16>>,
    pub status_code_range: Option<StatusCodeRange>,
    pub time_range: Option<TimeRange>,
    pub methods: Option<Vec<String>>,
    pub response_size_range: Option<ResponseSizeRange>,
}

impl FilterCriteria {
    pub fn is_empty(&self) -> bool {
        self.status_codes.as_ref().map_or(true, |c| c.is_empty())
            && self.status_code_range.is_none()
            && self.time_range.is_none()
            && self.methods.as_ref().map_or(true, |m| m.is_empty())
            && self.response_size_range.is_none()
    }

    /// Every structural problem, so a caller can show them all at once.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let Some(codes) = &self.status_codes {
            for &code in codes {
                if !(100..=599).contains(&code) {
                    errors.push(ValidationError::StatusCodeOutOfRange { field: "value", value: code });
                }
            }
        }

        if let Some(range) = &self.status_code_range {
            if !(100..=599).contains(&range.min) {
                errors.push(ValidationError::StatusCodeOutOfRange { field: "min", value: range.min });
            }
            if !(100..=599).contains(&range.max) {
                errors.push(ValidationError::StatusCodeOutOfRange { field: "max", value: range.max });
            }
            if range.min > range.max {
                errors.push(ValidationError::StatusCodeRangeInverted {
                    min: range.min,
                    max: range.max,
                });
            }
        }

        if let Some(TimeRange {
            start: Some(start),
            end: Some(end),
        }) = &self.time_range
        {
            if start > end {
                errors.push(ValidationError::TimeRangeInverted {
                    start: start.to_rfc3339(),
                    end: end.to_rfc3339(),
                });
            }
        }

        if let Some(range) = &self.response_size_range {
            if let Some(min) = range.min.filter(|v| *v < 0) {
                errors.push(ValidationError::NegativeSize { field: "min", value: min });
            }
            if let Some(max) = range.max.filter(|v| *v < 0) {
                errors.push(ValidationError::NegativeSize { field: "max", value: max });
            }
            if let (Some(min), Some(max)) = (range.min, range.max) {
                if min > max {
                    errors.push(ValidationError::SizeRangeInverted { min, max });
                }
            }
        }

        errors
    }
}

/// Before/after counts for a filtered or searched view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ViewStats {
    pub total: usize,
    pub filtered: usize,
    /// Two decimal places
    pub percentage: f64,
}

impl ViewStats {
    pub fn new(total: usize, filtered: usize) -> Self {
        let percentage = if total > 0 {
            (filtered as f64 / total as f64 * 100.0 * 100.0).round() / 100.0
        } else {
            0.0
        };
        ViewStats {
            total,
            filtered,
            percentage,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilterOutcome<'a> {
    pub matched: Vec<&'a LogEntry>,
    pub stats: ViewStats,
}

// Criteria lowered once per call so the per-entry test is a handful of
// comparisons.
struct CompiledFilter<'c> {
    // Indexed by status code; only allocated when a code set is given
    status_set: Option<Vec<bool>>,
    status_range: Option<(u16, u16)>,
    start: Option<DateTime<FixedOffset>>,
    end: Option<DateTime<FixedOffset>>,
    methods: Option<&'c [String]>,
    min_size: Option<i64>,
    max_size: Option<i64>,
}

impl<'c> CompiledFilter<'c> {
    fn new(criteria: &'c FilterCriteria) -> Self {
        let status_set = criteria
            .status_codes
            .as_ref()
            .filter(|codes| !codes.is_empty())
            .map(|codes| {
                let mut set = vec![false; 1000];
                for &code in codes {
                    if let Some(slot) = set.get_mut(code as usize) {
                        *slot = true;
                    }
                }
                set
            });

        let time = criteria.time_range.unwrap_or_default();
        let size = criteria.response_size_range.unwrap_or_default();

        CompiledFilter {
            status_set,
            status_range: criteria.status_code_range.map(|r| (r.min, r.max)),
            start: time.start,
            end: time.end,
            methods: criteria
                .methods
                .as_deref()
                .filter(|m| !m.is_empty()),
            min_size: size.min,
            max_size: size.max,
        }
    }

    fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(set) = &self.status_set {
            if !set.get(entry.status_code as usize).copied().unwrap_or(false) {
                return false;
            }
        }
        if let Some((min, max)) = self.status_range {
            if entry.status_code < min || entry.status_code > max {
                return false;
            }
        }
        if let Some(start) = self.start {
            if entry.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if entry.timestamp > end {
                return false;
            }
        }
        if let Some(methods) = self.methods {
            if !methods.iter().any(|m| m.eq_ignore_ascii_case(&entry.method)) {
                return false;
            }
        }
        let bytes = i64::try_from(entry.response_bytes).unwrap_or(i64::MAX);
        if let Some(min) = self.min_size {
            if bytes < min {
                return false;
            }
        }
        if let Some(max) = self.max_size {
            if bytes > max {
                return false;
            }
        }
        true
    }
}

/// Entries satisfying every populated criterion, in input order.
///
/// Inverted ranges are not rejected here; they simply match nothing. Run
/// [`FilterCriteria::validate`] first to report them.
pub fn filter<'a, E: Borrow<LogEntry>>(entries: &'a [E], criteria: &FilterCriteria) -> Vec<&'a LogEntry> {
    if criteria.is_empty() {
        return entries.iter().map(|e| e.borrow()).collect();
    }
    let compiled = CompiledFilter::new(criteria);
    entries
        .iter()
        .map(|e| e.borrow())
        .filter(|e| compiled.matches(e))
        .collect()
}

pub fn filter_with_stats<'a, E: Borrow<LogEntry>>(entries: &'a [E], criteria: &FilterCriteria) -> FilterOutcome<'a> {
    let matched = filter(entries, criteria);
    let stats = ViewStats::new(entries.len(), matched.len());
    tracing::debug!(total = stats.total, matched = stats.filtered, "filter applied");
    FilterOutcome { matched, stats }
}

/// Filter, then search within the filtered view.
pub fn filter_and_search<'a, E: Borrow<LogEntry>>(
    entries: &'a [E],
    filter_criteria: &FilterCriteria,
    search_criteria: &SearchCriteria,
) -> Vec<&'a LogEntry> {
    let matcher = SearchMatcher::new(search_criteria);
    let matched: Vec<&LogEntry> = filter(entries, filter_criteria)
        .into_iter()
        .filter(|entry| matcher.matches(entry))
        .collect();
    tracing::debug!(total = entries.len(), matched = matched.len(), "filter and search applied");
    matched
}
