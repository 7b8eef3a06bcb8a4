use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Days checked when deciding whether an article was already pushed
pub const DEFAULT_LOOKBACK_DAYS: u32 = 7;
/// Days of push history kept on disk
pub const DEFAULT_RETENTION_DAYS: u32 = 60;

/// Fingerprints pushed per calendar day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PushHistory {
    days: BTreeMap<NaiveDate, BTreeSet<String>>,
}

impl PushHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when `fingerprint` was pushed on any of the `lookback_days`
    /// days ending with `today` (inclusive).
    pub fn is_duplicate(&self, fingerprint: &str, today: NaiveDate, lookback_days: u32) -> bool {
        (0..lookback_days).any(|i| {
            self.days
                .get(&(today - Duration::days(i as i64)))
                .is_some_and(|pushed| pushed.contains(fingerprint))
        })
    }

    /// Drop every day strictly older than `today - retention_days`.
    /// Returns how many days were removed.
    pub fn prune_older_than(&mut self, today: NaiveDate, retention_days: u32) -> usize {
        let Some(cutoff) = today.checked_sub_signed(Duration::days(retention_days as i64)) else {
            return 0;
        };
        let before = self.days.len();
        self.days.retain(|date, _| *date >= cutoff);
        before - self.days.len()
    }

    pub fn record<I, S>(&mut self, day: NaiveDate, fingerprints: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.days
            .entry(day)
            .or_default()
            .extend(fingerprints.into_iter().map(Into::into));
    }

    /// Every fingerprint still held, regardless of day
    pub fn all_fingerprints(&self) -> HashSet<&str> {
        self.days
            .values()
            .flat_map(|set| set.iter().map(String::as_str))
            .collect()
    }

    pub fn pushed_on(&self, day: NaiveDate) -> usize {
        self.days.get(&day).map_or(0, BTreeSet::len)
    }

    pub fn contains_day(&self, day: NaiveDate) -> bool {
        self.days.contains_key(&day)
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_duplicate_within_lookback_window() {
        let today = day(2024, 1, 7);
        for offset in 0..7 {
            let mut history = PushHistory::new();
            history.record(today - Duration::days(offset), ["abc"]);
            assert!(
                history.is_duplicate("abc", today, DEFAULT_LOOKBACK_DAYS),
                "offset {offset} should be inside the window"
            );
        }
    }

    #[test]
    fn test_not_duplicate_outside_lookback_window() {
        let today = day(2024, 1, 7);
        let mut history = PushHistory::new();
        history.record(today - Duration::days(7), ["abc"]);
        history.record(today - Duration::days(30), ["def"]);

        assert!(!history.is_duplicate("abc", today, DEFAULT_LOOKBACK_DAYS));
        assert!(!history.is_duplicate("def", today, DEFAULT_LOOKBACK_DAYS));
    }

    #[test]
    fn test_future_days_do_not_count() {
        let today = day(2024, 1, 7);
        let mut history = PushHistory::new();
        history.record(day(2024, 1, 8), ["abc"]);
        assert!(!history.is_duplicate("abc", today, DEFAULT_LOOKBACK_DAYS));
    }

    #[test]
    fn test_prune_removes_days_past_retention() {
        let today = day(2024, 3, 1);
        let mut history = PushHistory::new();
        history.record(today - Duration::days(61), ["old"]);
        history.record(today - Duration::days(60), ["edge"]);
        history.record(today, ["fresh"]);

        let removed = history.prune_older_than(today, DEFAULT_RETENTION_DAYS);

        assert_eq!(removed, 1);
        assert!(!history.contains_day(today - Duration::days(61)));
        assert!(history.contains_day(today - Duration::days(60)));
        assert!(history.contains_day(today));
    }

    #[test]
    fn test_prune_with_huge_retention_keeps_everything() {
        let today = day(2024, 3, 1);
        let mut history = PushHistory::new();
        history.record(today, ["fresh"]);

        assert_eq!(history.prune_older_than(today, u32::MAX), 0);
        assert!(history.contains_day(today));
    }

    #[test]
    fn test_record_accumulates_same_day() {
        let today = day(2024, 1, 7);
        let mut history = PushHistory::new();
        history.record(today, ["a", "b"]);
        history.record(today, vec!["b".to_string(), "c".to_string()]);
        assert_eq!(history.pushed_on(today), 3);
    }

    #[test]
    fn test_all_fingerprints_spans_days() {
        let mut history = PushHistory::new();
        history.record(day(2024, 1, 1), ["a"]);
        history.record(day(2024, 1, 2), ["b"]);
        let all = history.all_fingerprints();
        assert!(all.contains("a"));
        assert!(all.contains("b"));
    }

    #[test]
    fn test_json_uses_date_keys() {
        let mut history = PushHistory::new();
        history.record(day(2024, 1, 7), ["abc"]);

        let json = serde_json::to_string(&history).unwrap();
        assert_eq!(json, r#"{"2024-01-07":["abc"]}"#);

        let back: PushHistory = serde_json::from_str(&json).unwrap();
        assert_eq!(back, history);
    }
}
