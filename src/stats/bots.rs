// src/stats/bots.rs
use serde::{Deserialize, Serialize};

pub const SEARCH_ENGINE: &str = "search_engine";
pub const SOCIAL_MEDIA: &str = "social_media";
pub const MONITORING: &str = "monitoring";
pub const SEO: &str = "seo";
pub const SECURITY: &str = "security";
pub const CRAWLER: &str = "crawler";

// Specific names first; the generic tokens at the end would otherwise
// swallow them ("googlebot" contains "bot").
const DEFAULT_SIGNATURES: &[(&str, &[&str])] = &[
    (
        SEARCH_ENGINE,
        &[
            "googlebot", "bingbot", "slurp", "duckduckbot", "baiduspider", "yandexbot", "yandex",
            "sogou", "exabot",
        ],
    ),
    (
        SOCIAL_MEDIA,
        &[
            "facebookexternalhit", "twitterbot", "linkedinbot", "pinterest", "slackbot",
            "telegrambot", "whatsapp", "discordbot",
        ],
    ),
    (
        MONITORING,
        &[
            "pingdom", "uptimerobot", "statuscake", "monitor", "site24x7", "newrelic", "datadog",
            "nagios",
        ],
    ),
    (
        SEO,
        &["semrush", "ahrefs", "mj12bot", "majestic", "screaming frog", "seokicks", "seoscan"],
    ),
    (
        SECURITY,
        &[
            "nessus", "nikto", "nmap", "masscan", "acunetix", "qualys", "securityscanner",
            "vulnscanner",
        ],
    ),
    (
        CRAWLER,
        &[
            "bot", "crawler", "spider", "scraper", "scraping", "python-requests", "curl", "wget",
            "httpclient", "scrapy", "beautifulsoup", "mechanize", "pycurl", "libwww", "okhttp",
            "go-http-client",
        ],
    ),
];

fn default_category() -> String {
    CRAWLER.to_string()
}

/// A case-insensitive user-agent substring that marks automated traffic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotSignature {
    pub pattern: String,
    #[serde(default = "default_category")]
    pub category: String,
}

impl BotSignature {
    pub fn new(pattern: impl Into<String>, category: impl Into<String>) -> Self {
        BotSignature {
            pattern: pattern.into(),
            category: category.into(),
        }
    }
}

/// Ordered signature list; the first matching signature decides the category.
#[derive(Debug, Clone)]
pub struct BotClassifier {
    signatures: Vec<BotSignature>,
}

impl Default for BotClassifier {
    fn default() -> Self {
        Self::new(Self::default_signatures())
    }
}

impl BotClassifier {
    pub fn new(signatures: Vec<BotSignature>) -> Self {
        let signatures = signatures
            .into_iter()
            .filter(|s| !s.pattern.trim().is_empty())
            .map(|s| BotSignature {
                pattern: s.pattern.to_lowercase(),
                category: s.category,
            })
            .collect();
        BotClassifier { signatures }
    }

    pub fn default_signatures() -> Vec<BotSignature> {
        DEFAULT_SIGNATURES
            .iter()
            .flat_map(|(category, patterns)| patterns.iter().map(move |p| BotSignature::new(*p, *category)))
            .collect()
    }

    /// Default list with `extra` tried first.
    pub fn with_extra(extra: Vec<BotSignature>) -> Self {
        let mut signatures = extra;
        signatures.extend(Self::default_signatures());
        Self::new(signatures)
    }

    pub fn from_config(config: &crate::config::StatsConfig) -> Self {
        if config.replace_default_signatures {
            Self::new(config.bot_signatures.clone())
        } else {
            Self::with_extra(config.bot_signatures.clone())
        }
    }

    /// Append signatures after the existing ones.
    pub fn extend(&mut self, more: impl IntoIterator<Item = BotSignature>) {
        let more = Self::new(more.into_iter().collect());
        self.signatures.extend(more.signatures);
    }

    pub fn signatures(&self) -> &[BotSignature] {
        &self.signatures
    }

    /// Category of the first matching signature, `None` for human traffic.
    pub fn classify(&self, user_agent: &str) -> Option<&str> {
        if user_agent.is_empty() || user_agent == "-" {
            return None;
        }
        let lower = user_agent.to_lowercase();
        self.signatures
            .iter()
            .find(|s| lower.contains(s.pattern.as_str()))
            .map(|s| s.category.as_str())
    }

    pub fn is_bot(&self, user_agent: &str) -> bool {
        self.classify(user_agent).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_classification() {
        let classifier = BotClassifier::default();
        assert_eq!(
            classifier.classify("Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)"),
            Some(SEARCH_ENGINE)
        );
        assert_eq!(classifier.classify("curl/7.68.0"), Some(CRAWLER));
        assert_eq!(classifier.classify("python-requests/2.31"), Some(CRAWLER));
        assert_eq!(classifier.classify("Twitterbot/1.0"), Some(SOCIAL_MEDIA));
        assert_eq!(classifier.classify("Mozilla/5.0 (X11; Linux x86_64) Firefox/120.0"), None);
        assert_eq!(classifier.classify(""), None);
        assert_eq!(classifier.classify("-"), None);
    }

    #[test]
    fn test_case_insensitive() {
        let classifier = BotClassifier::default();
        assert!(classifier.is_bot("BINGBOT/2.0"));
        assert!(classifier.is_bot("Wget/1.21"));
    }

    #[test]
    fn test_custom_list_replaces_defaults() {
        let classifier = BotClassifier::new(vec![BotSignature::new("AcmeProbe", MONITORING)]);
        assert_eq!(classifier.classify("acmeprobe/1.0"), Some(MONITORING));
        assert!(!classifier.is_bot("Googlebot/2.1"));
    }

    #[test]
    fn test_extra_signatures_take_priority() {
        let classifier = BotClassifier::with_extra(vec![BotSignature::new("googlebot", "partner")]);
        assert_eq!(classifier.classify("Googlebot/2.1"), Some("partner"));
        assert!(classifier.is_bot("curl/8.0"));
    }

    #[test]
    fn test_extend_appends() {
        let mut classifier = BotClassifier::new(Vec::new());
        assert!(!classifier.is_bot("HeadlessChrome"));
        classifier.extend(vec![BotSignature::new("headless", CRAWLER), BotSignature::new("  ", CRAWLER)]);
        assert_eq!(classifier.signatures().len(), 1);
        assert!(classifier.is_bot("HeadlessChrome"));
    }
}
