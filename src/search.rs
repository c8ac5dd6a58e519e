// src/search.rs
use std::borrow::Borrow;
use std::ops::Range;

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

use crate::filter::ViewStats;
use crate::model::LogEntry;

/// Free-text criteria, combined with AND. Absent or blank values are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchCriteria {
    pub ip: Option<String>,
    pub url: Option<String>,
    pub user_agent: Option<String>,
    pub method: Option<String>,
    pub user: Option<String>,
    /// Matches if any searchable field contains it
    pub keyword: Option<String>,
    pub case_sensitive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchField {
    Ip,
    User,
    Method,
    Url,
    Protocol,
    Referer,
    UserAgent,
}

type Accessor = fn(&LogEntry) -> &str;

const FIELDS: &[(SearchField, Accessor)] = &[
    (SearchField::Ip, |e| e.ip.as_str()),
    (SearchField::User, |e| e.user.as_str()),
    (SearchField::Method, |e| e.method.as_str()),
    (SearchField::Url, |e| e.url.as_str()),
    (SearchField::Protocol, |e| e.protocol.as_str()),
    (SearchField::Referer, |e| e.referer.as_str()),
    (SearchField::UserAgent, |e| e.user_agent.as_str()),
];

impl SearchField {
    pub fn value<'e>(&self, entry: &'e LogEntry) -> &'e str {
        let accessor = FIELDS
            .iter()
            .find(|(field, _)| field == self)
            .map(|(_, accessor)| *accessor)
            .unwrap_or(|_| "");
        accessor(entry)
    }
}

impl SearchCriteria {
    pub fn is_empty(&self) -> bool {
        self.terms().next().is_none() && blank(&self.keyword).is_none()
    }

    fn terms(&self) -> impl Iterator<Item = (SearchField, &str)> {
        [
            (SearchField::Ip, &self.ip),
            (SearchField::Url, &self.url),
            (SearchField::UserAgent, &self.user_agent),
            (SearchField::Method, &self.method),
            (SearchField::User, &self.user),
        ]
        .into_iter()
        .filter_map(|(field, value)| blank(value).map(|v| (field, v)))
    }
}

fn blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

// A needle prepared once per search call.
struct Needle<'a> {
    text: &'a str,
    lowered: Option<String>,
}

impl<'a> Needle<'a> {
    fn new(text: &'a str, case_sensitive: bool) -> Self {
        let lowered = (!case_sensitive).then(|| text.to_lowercase());
        Needle { text, lowered }
    }

    fn found_in(&self, haystack: &str) -> bool {
        match &self.lowered {
            None => haystack.contains(self.text),
            Some(lowered) => contains_ignore_case(haystack, lowered),
        }
    }
}

// `needle` is already lowercased.
fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    if haystack.is_ascii() && needle.is_ascii() {
        let (h, n) = (haystack.as_bytes(), needle.as_bytes());
        if n.len() > h.len() {
            return false;
        }
        return h.windows(n.len()).any(|w| w.eq_ignore_ascii_case(n));
    }
    haystack.to_lowercase().contains(needle)
}

/// Search criteria prepared once and applied per entry.
pub struct SearchMatcher<'c> {
    terms: Vec<(SearchField, Needle<'c>)>,
    keyword: Option<Needle<'c>>,
}

impl<'c> SearchMatcher<'c> {
    pub fn new(criteria: &'c SearchCriteria) -> Self {
        let terms = criteria
            .terms()
            .map(|(field, text)| (field, Needle::new(text, criteria.case_sensitive)))
            .collect();
        let keyword = blank(&criteria.keyword).map(|k| Needle::new(k, criteria.case_sensitive));
        SearchMatcher { terms, keyword }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.keyword.is_none()
    }

    pub fn matches(&self, entry: &LogEntry) -> bool {
        self.terms
            .iter()
            .all(|(field, needle)| needle.found_in(field.value(entry)))
            && self.keyword.as_ref().map_or(true, |needle| {
                FIELDS.iter().any(|(_, accessor)| needle.found_in(accessor(entry)))
            })
    }
}

/// Entries satisfying every populated criterion, in input order.
pub fn search<'a, E: Borrow<LogEntry>>(entries: &'a [E], criteria: &SearchCriteria) -> Vec<&'a LogEntry> {
    let candidates = entries.iter().map(|e| e.borrow());
    let matcher = SearchMatcher::new(criteria);
    if matcher.is_empty() {
        return candidates.collect();
    }

    let matched: Vec<&LogEntry> = candidates.filter(|entry| matcher.matches(entry)).collect();

    tracing::debug!(total = entries.len(), matched = matched.len(), "search applied");
    matched
}

pub fn search_stats(total: usize, results: usize) -> ViewStats {
    ViewStats::new(total, results)
}

/// Byte ranges of every non-overlapping literal occurrence of `term`.
pub fn match_spans(text: &str, term: &str, case_sensitive: bool) -> Vec<Range<usize>> {
    if term.is_empty() {
        return Vec::new();
    }
    match RegexBuilder::new(&regex::escape(term))
        .case_insensitive(!case_sensitive)
        .build()
    {
        Ok(re) => re.find_iter(text).map(|m| m.range()).collect(),
        Err(_) => Vec::new(),
    }
}

/// Wrap every occurrence of `term` in `<mark>` tags. The term is literal
/// text, so regex metacharacters in it match themselves.
pub fn highlight_match(text: &str, term: &str, case_sensitive: bool) -> String {
    let spans = match_spans(text, term, case_sensitive);
    if spans.is_empty() {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len() + spans.len() * 13);
    let mut last = 0;
    for span in spans {
        out.push_str(&text[last..span.start]);
        out.push_str("<mark>");
        out.push_str(&text[span.clone()]);
        out.push_str("</mark>");
        last = span.end;
    }
    out.push_str(&text[last..]);
    out
}
