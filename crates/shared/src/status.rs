use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::feed::FeedError;
use crate::models::FeedSource;

/// Outcome of the last poll of one feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Success,
    Empty,
    Timeout,
    HttpError,
    ConnectionError,
    UnknownError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStatus {
    pub status: StatusKind,
    pub last_attempt: NaiveDate,
    #[serde(default)]
    pub last_success: Option<NaiveDate>,
    #[serde(default)]
    pub error: Option<String>,
    pub journal: String,
    #[serde(default)]
    pub tier: String,
}

/// Poll outcomes keyed by feed URL, persisted between runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedStatusBook {
    feeds: BTreeMap<String, SourceStatus>,
}

/// Poll statistics for the feeds of one run
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    /// Percentage rounded to one decimal
    pub success_rate: f64,
    pub tier_stats: BTreeMap<String, usize>,
}

impl FeedStatusBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &str) -> Option<&SourceStatus> {
        self.feeds.get(url)
    }

    pub fn record_success(&mut self, source: &FeedSource, today: NaiveDate) {
        self.record(source, today, StatusKind::Success, None);
    }

    /// The feed answered but carried no entries
    pub fn record_empty(&mut self, source: &FeedSource, today: NaiveDate) {
        self.record(source, today, StatusKind::Empty, None);
    }

    pub fn record_failure(&mut self, source: &FeedSource, today: NaiveDate, error: &FeedError) {
        self.record(source, today, error.status_kind(), Some(error.to_string()));
    }

    fn record(
        &mut self,
        source: &FeedSource,
        today: NaiveDate,
        status: StatusKind,
        error: Option<String>,
    ) {
        // A reachable feed counts as a success date even when it was empty
        let reachable = matches!(status, StatusKind::Success | StatusKind::Empty);
        let last_success = if reachable {
            Some(today)
        } else {
            self.feeds.get(&source.url).and_then(|s| s.last_success)
        };

        self.feeds.insert(
            source.url.clone(),
            SourceStatus {
                status,
                last_attempt: today,
                last_success,
                error,
                journal: source.title.clone(),
                tier: source.tier.clone(),
            },
        );
    }

    /// Statistics over `sources` for polls made on `today`. Sources not
    /// polled today count as failed.
    pub fn summary(&self, sources: &[FeedSource], today: NaiveDate) -> StatusSummary {
        let mut success = 0;
        let mut tier_stats: BTreeMap<String, usize> = BTreeMap::new();

        for source in sources {
            let Some(status) = self.feeds.get(&source.url) else {
                continue;
            };
            if status.last_attempt == today && status.status == StatusKind::Success {
                success += 1;
                let tier = if status.tier.is_empty() {
                    "unranked".to_string()
                } else {
                    status.tier.clone()
                };
                *tier_stats.entry(tier).or_default() += 1;
            }
        }

        let total = sources.len();
        let success_rate = if total > 0 {
            (success as f64 / total as f64 * 1000.0).round() / 10.0
        } else {
            0.0
        };

        StatusSummary {
            total,
            success,
            failed: total - success,
            success_rate,
            tier_stats,
        }
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_failure_keeps_previous_success_date() {
        let source = FeedSource::new("https://example.org/rss", "Geology", "1区");
        let mut book = FeedStatusBook::new();
        book.record_success(&source, day(5));
        book.record_failure(&source, day(7), &FeedError::Timeout);

        let status = book.get(&source.url).unwrap();
        assert_eq!(status.status, StatusKind::Timeout);
        assert_eq!(status.last_attempt, day(7));
        assert_eq!(status.last_success, Some(day(5)));
        assert!(status.error.is_some());
    }

    #[test]
    fn test_empty_feed_is_reachable() {
        let source = FeedSource::new("https://example.org/rss", "Geology", "");
        let mut book = FeedStatusBook::new();
        book.record_empty(&source, day(7));

        let status = book.get(&source.url).unwrap();
        assert_eq!(status.status, StatusKind::Empty);
        assert_eq!(status.last_success, Some(day(7)));
    }

    #[test]
    fn test_summary_counts_today_successes() {
        let a = FeedSource::new("https://a.org/rss", "A", "1区");
        let b = FeedSource::new("https://b.org/rss", "B", "");
        let c = FeedSource::new("https://c.org/rss", "C", "2区");
        let mut book = FeedStatusBook::new();
        book.record_success(&a, day(7));
        book.record_success(&b, day(7));
        book.record_failure(&c, day(7), &FeedError::Http(503));

        let summary = book.summary(&[a, b, c], day(7));
        assert_eq!(summary.total, 3);
        assert_eq!(summary.success, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.success_rate, 66.7);
        assert_eq!(summary.tier_stats.get("1区"), Some(&1));
        assert_eq!(summary.tier_stats.get("unranked"), Some(&1));
    }

    #[test]
    fn test_summary_ignores_stale_successes() {
        let a = FeedSource::new("https://a.org/rss", "A", "");
        let mut book = FeedStatusBook::new();
        book.record_success(&a, day(1));

        let summary = book.summary(&[a], day(7));
        assert_eq!(summary.success, 0);
        assert_eq!(summary.success_rate, 0.0);
    }

    #[test]
    fn test_status_kind_serializes_snake_case() {
        let json = serde_json::to_string(&StatusKind::ConnectionError).unwrap();
        assert_eq!(json, "\"connection_error\"");
    }
}
