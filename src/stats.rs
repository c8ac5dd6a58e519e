// src/stats.rs
pub mod bots;
pub mod topk;

use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use crate::config::StatsConfig;
use crate::model::{serialize_rfc3339_opt, LogEntry, StatusClass};
pub use bots::{BotClassifier, BotSignature};
pub use topk::TopK;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IpStatistics {
    pub ip: String,
    pub request_count: u64,
    pub total_bytes: u64,
    pub unique_path_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathStatistics {
    pub path: String,
    pub request_count: u64,
    pub average_bytes: f64,
    /// Percentage of requests with status >= 400
    pub error_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCodeDistribution {
    pub success: u64,
    pub redirection: u64,
    pub client_error: u64,
    pub server_error: u64,
    /// Codes outside 200-599
    pub other: u64,
    pub details: BTreeMap<u16, u64>,
}

impl StatusCodeDistribution {
    fn record(&mut self, status_code: u16) {
        *self.details.entry(status_code).or_insert(0) += 1;
        match StatusClass::of(status_code) {
            StatusClass::Success => self.success += 1,
            StatusClass::Redirection => self.redirection += 1,
            StatusClass::ClientError => self.client_error += 1,
            StatusClass::ServerError => self.server_error += 1,
            StatusClass::Other => self.other += 1,
        }
    }

    pub fn class_count(&self, class: StatusClass) -> u64 {
        match class {
            StatusClass::Success => self.success,
            StatusClass::Redirection => self.redirection,
            StatusClass::ClientError => self.client_error,
            StatusClass::ServerError => self.server_error,
            StatusClass::Other => self.other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BotUserAgent {
    pub user_agent: String,
    pub count: u64,
    /// Share of bot requests
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BotStats {
    pub total_requests: u64,
    pub bot_requests: u64,
    pub human_requests: u64,
    pub bot_percentage: f64,
    pub top_bots: Vec<BotUserAgent>,
    pub bot_categories: BTreeMap<String, u64>,
}

/// Aggregate metrics for one entry snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_requests: u64,
    pub unique_ips: usize,
    pub unique_paths: usize,
    pub total_bytes: u64,
    pub average_response_size: f64,
    pub min_response_bytes: u64,
    pub max_response_bytes: u64,
    pub error_requests: u64,
    pub error_rate: f64,
    #[serde(serialize_with = "serialize_rfc3339_opt")]
    pub first_timestamp: Option<DateTime<FixedOffset>>,
    #[serde(serialize_with = "serialize_rfc3339_opt")]
    pub last_timestamp: Option<DateTime<FixedOffset>>,
    pub top_ips: Vec<IpStatistics>,
    pub top_paths: Vec<PathStatistics>,
    pub status_code_distribution: StatusCodeDistribution,
    pub method_distribution: BTreeMap<String, u64>,
    pub bot_stats: BotStats,
}

#[derive(Default)]
struct IpAccumulator<'a> {
    requests: u64,
    bytes: u64,
    paths: HashSet<&'a str>,
}

#[derive(Default)]
struct PathAccumulator {
    requests: u64,
    bytes: u64,
    errors: u64,
}

struct AgentAccumulator<'c> {
    category: Option<&'c str>,
    requests: u64,
}

/// Single-pass statistics over an entry sequence.
#[derive(Debug, Clone)]
pub struct Aggregator {
    top_k: usize,
    classifier: BotClassifier,
}

impl Default for Aggregator {
    fn default() -> Self {
        Aggregator {
            top_k: 10,
            classifier: BotClassifier::default(),
        }
    }
}

impl Aggregator {
    pub fn new(top_k: usize, classifier: BotClassifier) -> Self {
        Aggregator { top_k, classifier }
    }

    pub fn from_config(config: &StatsConfig) -> Self {
        Self::new(config.top_k, BotClassifier::from_config(config))
    }

    /// Works on owned entries and on filtered views of references alike.
    pub fn aggregate<E: Borrow<LogEntry>>(&self, entries: &[E]) -> Statistics {
        let mut stats = Statistics::default();
        if entries.is_empty() {
            return stats;
        }

        let mut ips: HashMap<&str, IpAccumulator> = HashMap::new();
        let mut paths: HashMap<&str, PathAccumulator> = HashMap::new();
        // Classified once per distinct user-agent
        let mut agents: HashMap<&str, AgentAccumulator> = HashMap::new();
        let mut methods: BTreeMap<String, u64> = BTreeMap::new();
        let mut min_bytes = u64::MAX;

        for entry in entries {
            let entry: &LogEntry = entry.borrow();
            stats.total_requests += 1;
            stats.total_bytes += entry.response_bytes;
            min_bytes = min_bytes.min(entry.response_bytes);
            stats.max_response_bytes = stats.max_response_bytes.max(entry.response_bytes);

            if entry.is_error() {
                stats.error_requests += 1;
            }

            if stats.first_timestamp.map_or(true, |first| entry.timestamp < first) {
                stats.first_timestamp = Some(entry.timestamp);
            }
            if stats.last_timestamp.map_or(true, |last| entry.timestamp > last) {
                stats.last_timestamp = Some(entry.timestamp);
            }

            let ip = ips.entry(entry.ip.as_str()).or_default();
            ip.requests += 1;
            ip.bytes += entry.response_bytes;
            ip.paths.insert(entry.url.as_str());

            let path = paths.entry(entry.url.as_str()).or_default();
            path.requests += 1;
            path.bytes += entry.response_bytes;
            if entry.is_error() {
                path.errors += 1;
            }

            stats.status_code_distribution.record(entry.status_code);

            match methods.get_mut(entry.method.as_str()) {
                Some(count) => *count += 1,
                None => {
                    methods.insert(entry.method.clone(), 1);
                }
            }

            let classifier = &self.classifier;
            let agent = agents
                .entry(entry.user_agent.as_str())
                .or_insert_with(|| AgentAccumulator {
                    category: classifier.classify(&entry.user_agent),
                    requests: 0,
                });
            agent.requests += 1;
        }

        stats.min_response_bytes = min_bytes;
        stats.unique_ips = ips.len();
        stats.unique_paths = paths.len();
        stats.average_response_size = stats.total_bytes as f64 / stats.total_requests as f64;
        stats.error_rate = percentage(stats.error_requests, stats.total_requests);
        stats.method_distribution = methods;

        let mut top_ips = TopK::new(self.top_k);
        for (ip, acc) in &ips {
            top_ips.offer(*ip, acc.requests);
        }
        stats.top_ips = top_ips
            .into_sorted()
            .into_iter()
            .map(|(ip, count)| {
                let acc = &ips[ip];
                IpStatistics {
                    ip: ip.to_string(),
                    request_count: count,
                    total_bytes: acc.bytes,
                    unique_path_count: acc.paths.len(),
                }
            })
            .collect();

        let mut top_paths = TopK::new(self.top_k);
        for (path, acc) in &paths {
            top_paths.offer(*path, acc.requests);
        }
        stats.top_paths = top_paths
            .into_sorted()
            .into_iter()
            .map(|(path, count)| {
                let acc = &paths[path];
                PathStatistics {
                    path: path.to_string(),
                    request_count: count,
                    average_bytes: acc.bytes as f64 / acc.requests as f64,
                    error_rate: percentage(acc.errors, acc.requests),
                }
            })
            .collect();

        stats.bot_stats = self.bot_stats(&agents, stats.total_requests);

        tracing::info!(
            total_requests = stats.total_requests,
            unique_ips = stats.unique_ips,
            unique_paths = stats.unique_paths,
            bot_requests = stats.bot_stats.bot_requests,
            "statistics computed"
        );

        stats
    }

    fn bot_stats(&self, agents: &HashMap<&str, AgentAccumulator>, total: u64) -> BotStats {
        let mut bot_stats = BotStats {
            total_requests: total,
            ..BotStats::default()
        };

        let mut top_bots = TopK::new(self.top_k);
        for (user_agent, acc) in agents {
            if let Some(category) = acc.category {
                bot_stats.bot_requests += acc.requests;
                *bot_stats.bot_categories.entry(category.to_string()).or_insert(0) += acc.requests;
                top_bots.offer(*user_agent, acc.requests);
            }
        }

        bot_stats.human_requests = total - bot_stats.bot_requests;
        bot_stats.bot_percentage = percentage(bot_stats.bot_requests, total);
        bot_stats.top_bots = top_bots
            .into_sorted()
            .into_iter()
            .map(|(user_agent, count)| BotUserAgent {
                user_agent: user_agent.to_string(),
                count,
                percentage: percentage(count, bot_stats.bot_requests),
            })
            .collect();

        bot_stats
    }
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Aggregate with the default top-10 and either the given classifier or the
/// built-in signature list.
pub fn aggregate<E: Borrow<LogEntry>>(entries: &[E], signatures: Option<&BotClassifier>) -> Statistics {
    let classifier = signatures.cloned().unwrap_or_default();
    Aggregator::new(10, classifier).aggregate(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::entry;

    #[test]
    fn test_empty_input() {
        let stats = aggregate::<LogEntry>(&[], None);
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.unique_ips, 0);
        assert_eq!(stats.average_response_size, 0.0);
        assert!(stats.top_ips.is_empty());
        assert!(stats.top_paths.is_empty());
        assert!(stats.bot_stats.top_bots.is_empty());
        assert_eq!(stats.first_timestamp, None);
    }

    #[test]
    fn test_totals() {
        let entries = vec![
            entry(1, "10.0.0.1", "GET", "/a", 200, 100, "Mozilla/5.0"),
            entry(2, "10.0.0.1", "GET", "/b", 404, 50, "Mozilla/5.0"),
            entry(3, "10.0.0.2", "POST", "/a", 500, 0, "curl/7.68.0"),
            entry(4, "10.0.0.3", "GET", "/a", 301, 250, "Googlebot/2.1"),
        ];
        let stats = aggregate(&entries, None);

        assert_eq!(stats.total_requests, 4);
        assert_eq!(stats.unique_ips, 3);
        assert_eq!(stats.unique_paths, 2);
        assert_eq!(stats.total_bytes, 400);
        assert_eq!(stats.average_response_size, 100.0);
        assert_eq!(stats.min_response_bytes, 0);
        assert_eq!(stats.max_response_bytes, 250);
        assert_eq!(stats.error_requests, 2);
        assert_eq!(stats.error_rate, 50.0);
        assert_eq!(stats.method_distribution.get("GET"), Some(&3));
        assert_eq!(stats.method_distribution.get("POST"), Some(&1));

        let dist = &stats.status_code_distribution;
        assert_eq!((dist.success, dist.redirection, dist.client_error, dist.server_error), (1, 1, 1, 1));
        assert_eq!(dist.details.get(&404), Some(&1));

        assert_eq!(stats.top_ips[0].ip, "10.0.0.1");
        assert_eq!(stats.top_ips[0].request_count, 2);
        assert_eq!(stats.top_ips[0].total_bytes, 150);
        assert_eq!(stats.top_ips[0].unique_path_count, 2);

        assert_eq!(stats.top_paths[0].path, "/a");
        assert_eq!(stats.top_paths[0].request_count, 3);
        assert!((stats.top_paths[0].error_rate - 100.0 / 3.0).abs() < 1e-9);
        assert!((stats.top_paths[0].average_bytes - 350.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_bot_stats() {
        let entries = vec![
            entry(1, "1.1.1.1", "GET", "/", 200, 1, "Mozilla/5.0"),
            entry(2, "1.1.1.2", "GET", "/", 200, 1, "Googlebot/2.1"),
            entry(3, "1.1.1.3", "GET", "/", 200, 1, "curl/7.68.0"),
            entry(4, "1.1.1.4", "GET", "/", 200, 1, "curl/7.68.0"),
        ];
        let stats = aggregate(&entries, None);
        let bots = &stats.bot_stats;

        assert_eq!(bots.total_requests, 4);
        assert_eq!(bots.bot_requests, 3);
        assert_eq!(bots.human_requests, 1);
        assert_eq!(bots.bot_percentage, 75.0);
        assert_eq!(bots.top_bots[0].user_agent, "curl/7.68.0");
        assert_eq!(bots.top_bots[0].count, 2);
        assert!((bots.top_bots[0].percentage - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(bots.bot_categories.get("crawler"), Some(&2));
        assert_eq!(bots.bot_categories.get("search_engine"), Some(&1));
    }

    #[test]
    fn test_custom_signatures() {
        let entries = vec![
            entry(1, "1.1.1.1", "GET", "/", 200, 1, "InternalProbe/1.0"),
            entry(2, "1.1.1.2", "GET", "/", 200, 1, "Googlebot/2.1"),
        ];
        let classifier = BotClassifier::new(vec![BotSignature::new("internalprobe", "monitoring")]);
        let stats = aggregate(&entries, Some(&classifier));
        assert_eq!(stats.bot_stats.bot_requests, 1);
        assert_eq!(stats.bot_stats.top_bots[0].user_agent, "InternalProbe/1.0");
    }

    #[test]
    fn test_top_k_bounded_and_ordered() {
        let mut entries = Vec::new();
        let mut line = 0;
        for i in 0..25u32 {
            // 10.0.0.i gets (i % 5) + 1 requests
            for _ in 0..(i % 5) + 1 {
                line += 1;
                entries.push(entry(line, &format!("10.0.0.{}", i), "GET", &format!("/p{}", i), 200, 10, "ua"));
            }
        }
        let stats = aggregate(&entries, None);

        assert_eq!(stats.total_requests, entries.len() as u64);
        assert_eq!(stats.top_ips.len(), 10);
        assert_eq!(stats.top_paths.len(), 10);
        for pair in stats.top_ips.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(a.request_count > b.request_count || (a.request_count == b.request_count && a.ip < b.ip));
        }
        // Five IPs have 5 requests: i = 4, 9, 14, 19, 24
        let first: Vec<&str> = stats.top_ips.iter().take(5).map(|s| s.ip.as_str()).collect();
        assert_eq!(first, vec!["10.0.0.14", "10.0.0.19", "10.0.0.24", "10.0.0.4", "10.0.0.9"]);
    }

    #[test]
    fn test_aggregate_over_references() {
        let entries = vec![
            entry(1, "1.1.1.1", "GET", "/", 200, 5, "ua"),
            entry(2, "1.1.1.2", "GET", "/", 404, 5, "ua"),
        ];
        let view: Vec<&LogEntry> = entries.iter().filter(|e| e.status_code == 404).collect();
        let stats = Aggregator::default().aggregate(&view);
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.top_ips[0].ip, "1.1.1.2");
    }
}
