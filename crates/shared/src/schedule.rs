use std::collections::{BTreeMap, HashSet};

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::history::PushHistory;
use crate::models::Article;

/// Maximum number of articles in one delivered message
pub const DEFAULT_BATCH_SIZE: usize = 6;

/// Per-day ordered queue of admitted articles.
///
/// Today's entry is the live queue; earlier days are backlog that
/// [`PushQueue::backfill`] reads from without modifying.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PushQueue {
    days: BTreeMap<NaiveDate, Vec<Article>>,
}

/// What one run delivers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryPlan {
    /// Today's top articles, topped up from backlog when short
    pub primary: Vec<Article>,
    /// How many of `primary` came from backlog
    pub backfilled: usize,
    /// Follow-up batch taken from what was left of today's queue
    pub secondary: Vec<Article>,
}

impl DeliveryPlan {
    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.secondary.is_empty()
    }

    pub fn fingerprints(&self) -> impl Iterator<Item = &str> {
        self.primary
            .iter()
            .chain(self.secondary.iter())
            .map(|a| a.fingerprint.as_str())
    }
}

impl PushQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn day(&self, day: NaiveDate) -> &[Article] {
        self.days.get(&day).map_or(&[], Vec::as_slice)
    }

    /// Add candidates to `today`, skipping fingerprints already queued there,
    /// then stable-sort the day by score (highest first). Returns the number
    /// of articles added.
    pub fn admit<I>(&mut self, today: NaiveDate, articles: I) -> usize
    where
        I: IntoIterator<Item = Article>,
    {
        let queue = self.days.entry(today).or_default();
        let mut seen: HashSet<String> = queue.iter().map(|a| a.fingerprint.clone()).collect();

        let mut added = 0;
        for article in articles {
            if seen.insert(article.fingerprint.clone()) {
                queue.push(article);
                added += 1;
            }
        }

        // sort_by is stable: equal scores keep insertion order
        queue.sort_by(|a, b| b.score.cmp(&a.score));
        added
    }

    /// Split today's queue into the first `batch_size` articles and the rest.
    pub fn take_batch(&self, today: NaiveDate, batch_size: usize) -> (Vec<Article>, Vec<Article>) {
        let queue = self.day(today);
        let cut = batch_size.min(queue.len());
        (queue[..cut].to_vec(), queue[cut..].to_vec())
    }

    /// Best backlog articles not yet pushed and not queued or selected today.
    ///
    /// Backlog days are read oldest first; among equal scores the older
    /// article wins.
    pub fn backfill(
        &self,
        today: NaiveDate,
        history: &PushHistory,
        selected: &[Article],
        needed: usize,
    ) -> Vec<Article> {
        if needed == 0 {
            return Vec::new();
        }

        let pushed = history.all_fingerprints();
        let mut excluded: HashSet<&str> = self
            .day(today)
            .iter()
            .chain(selected.iter())
            .map(|a| a.fingerprint.as_str())
            .collect();

        let mut candidates: Vec<&Article> = Vec::new();
        for (_, articles) in self.days.range(..today) {
            for article in articles {
                let fp = article.fingerprint.as_str();
                if pushed.contains(fp) || !excluded.insert(fp) {
                    continue;
                }
                candidates.push(article);
            }
        }

        candidates.sort_by(|a, b| b.score.cmp(&a.score));
        candidates.into_iter().take(needed).cloned().collect()
    }

    /// Pick this run's batches and shrink today's queue to what is left.
    pub fn plan_delivery(
        &mut self,
        today: NaiveDate,
        batch_size: usize,
        history: &PushHistory,
    ) -> DeliveryPlan {
        let (mut primary, remainder) = self.take_batch(today, batch_size);

        let mut backfilled = 0;
        if primary.len() < batch_size {
            let extra = self.backfill(today, history, &primary, batch_size - primary.len());
            backfilled = extra.len();
            primary.extend(extra);
        }

        let mut remainder = remainder.into_iter();
        let secondary: Vec<Article> = remainder.by_ref().take(batch_size).collect();
        self.days.insert(today, remainder.collect());

        DeliveryPlan {
            primary,
            backfilled,
            secondary,
        }
    }

    /// Drop backlog days strictly older than `today - retention_days`.
    pub fn prune_older_than(&mut self, today: NaiveDate, retention_days: u32) -> usize {
        let Some(cutoff) = today.checked_sub_signed(Duration::days(retention_days as i64)) else {
            return 0;
        };
        let before = self.days.len();
        self.days.retain(|date, _| *date >= cutoff);
        before - self.days.len()
    }

    /// Number of articles queued on days before `today`
    pub fn backlog_len(&self, today: NaiveDate) -> usize {
        self.days.range(..today).map(|(_, a)| a.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeedEntry, FeedSource};
    use crate::scorer::Score;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn article(title: &str, score: u32) -> Article {
        let entry = FeedEntry {
            title: title.to_string(),
            link: format!("https://example.org/{}", title.replace(' ', "-")),
            ..Default::default()
        };
        let source = FeedSource::new("https://example.org/rss", "Sedimentology", "");
        Article::new(
            &entry,
            &source,
            Score {
                total: score,
                core_hits: 1,
                aux_hits: 0,
                tier_weight: 15,
            },
            None,
            None,
        )
    }

    fn titles(articles: &[Article]) -> Vec<&str> {
        articles.iter().map(|a| a.title.as_str()).collect()
    }

    // ==================== Admission Tests ====================

    #[test]
    fn test_admit_sorts_by_score_descending() {
        let today = day(2024, 1, 7);
        let mut queue = PushQueue::new();
        queue.admit(today, vec![article("low", 20), article("high", 80), article("mid", 50)]);

        assert_eq!(titles(queue.day(today)), vec!["high", "mid", "low"]);
    }

    #[test]
    fn test_admit_same_article_twice_keeps_one() {
        let today = day(2024, 1, 7);
        let mut queue = PushQueue::new();
        let added = queue.admit(today, vec![article("dolomite", 30), article("dolomite", 30)]);

        assert_eq!(added, 1);
        assert_eq!(queue.day(today).len(), 1);

        let added_again = queue.admit(today, vec![article("dolomite", 30)]);
        assert_eq!(added_again, 0);
        assert_eq!(queue.day(today).len(), 1);
    }

    #[test]
    fn test_admit_ties_keep_insertion_order() {
        let today = day(2024, 1, 7);
        let mut queue = PushQueue::new();
        queue.admit(today, vec![article("first", 40), article("second", 40)]);
        queue.admit(today, vec![article("third", 40), article("top", 90)]);

        assert_eq!(titles(queue.day(today)), vec!["top", "first", "second", "third"]);
    }

    // ==================== Batching Tests ====================

    #[test]
    fn test_take_batch_splits_queue() {
        let today = day(2024, 1, 7);
        let mut queue = PushQueue::new();
        queue.admit(today, (0..8).map(|i| article(&format!("a{i}"), 100 - i)));

        let (batch, remainder) = queue.take_batch(today, 6);
        assert_eq!(batch.len(), 6);
        assert_eq!(remainder.len(), 2);
        assert_eq!(batch[0].title, "a0");
        assert_eq!(remainder[0].title, "a6");
    }

    #[test]
    fn test_take_batch_on_empty_day() {
        let queue = PushQueue::new();
        let (batch, remainder) = queue.take_batch(day(2024, 1, 7), 6);
        assert!(batch.is_empty());
        assert!(remainder.is_empty());
    }

    #[test]
    fn test_backfill_fills_short_batch() {
        let today = day(2024, 1, 7);
        let yesterday = day(2024, 1, 6);
        let mut queue = PushQueue::new();
        queue.admit(
            yesterday,
            vec![
                article("old1", 30),
                article("old2", 60),
                article("old3", 40),
                article("old4", 20),
                article("old5", 10),
            ],
        );
        queue.admit(today, vec![article("fresh1", 70), article("fresh2", 25)]);

        let plan = queue.plan_delivery(today, 6, &PushHistory::new());

        assert_eq!(plan.primary.len(), 6);
        assert_eq!(plan.backfilled, 4);
        assert_eq!(
            titles(&plan.primary),
            vec!["fresh1", "fresh2", "old2", "old3", "old1", "old4"]
        );
        assert!(plan.secondary.is_empty());
    }

    #[test]
    fn test_backfill_skips_pushed_and_today_articles() {
        let today = day(2024, 1, 7);
        let mut queue = PushQueue::new();
        queue.admit(day(2024, 1, 5), vec![article("pushed", 90), article("again", 80)]);
        queue.admit(day(2024, 1, 6), vec![article("again", 80), article("kept", 10)]);
        queue.admit(today, vec![article("again", 80)]);

        let mut history = PushHistory::new();
        history.record(day(2024, 1, 5), [article("pushed", 90).fingerprint]);

        let extra = queue.backfill(today, &history, &[], 6);
        assert_eq!(titles(&extra), vec!["kept"]);
    }

    #[test]
    fn test_backfill_deduplicates_across_backlog_days() {
        let today = day(2024, 1, 7);
        let mut queue = PushQueue::new();
        queue.admit(day(2024, 1, 4), vec![article("repeat", 50)]);
        queue.admit(day(2024, 1, 5), vec![article("repeat", 50)]);

        let extra = queue.backfill(today, &PushHistory::new(), &[], 6);
        assert_eq!(extra.len(), 1);
    }

    #[test]
    fn test_backfill_leaves_backlog_untouched() {
        let today = day(2024, 1, 7);
        let yesterday = day(2024, 1, 6);
        let mut queue = PushQueue::new();
        queue.admit(yesterday, vec![article("old", 30)]);

        let plan = queue.plan_delivery(today, 6, &PushHistory::new());
        assert_eq!(plan.backfilled, 1);
        assert_eq!(queue.day(yesterday).len(), 1);
    }

    #[test]
    fn test_second_batch_drains_remainder() {
        let today = day(2024, 1, 7);
        let mut queue = PushQueue::new();
        queue.admit(today, (0..15).map(|i| article(&format!("a{i:02}"), 100 - i)));

        let plan = queue.plan_delivery(today, 6, &PushHistory::new());

        assert_eq!(plan.primary.len(), 6);
        assert_eq!(plan.backfilled, 0);
        assert_eq!(plan.secondary.len(), 6);
        assert_eq!(plan.secondary[0].title, "a06");
        assert_eq!(titles(queue.day(today)), vec!["a12", "a13", "a14"]);
    }

    #[test]
    fn test_plan_clears_today_when_everything_fits() {
        let today = day(2024, 1, 7);
        let mut queue = PushQueue::new();
        queue.admit(today, vec![article("only", 40)]);

        let plan = queue.plan_delivery(today, 6, &PushHistory::new());
        assert_eq!(plan.primary.len(), 1);
        assert!(queue.day(today).is_empty());
        assert!(!plan.is_empty());
    }

    #[test]
    fn test_plan_is_empty_without_articles() {
        let mut queue = PushQueue::new();
        let plan = queue.plan_delivery(day(2024, 1, 7), 6, &PushHistory::new());
        assert!(plan.is_empty());
        assert_eq!(plan.fingerprints().count(), 0);
    }

    #[test]
    fn test_prune_and_backlog_len() {
        let today = day(2024, 3, 1);
        let mut queue = PushQueue::new();
        queue.admit(today - Duration::days(61), vec![article("ancient", 10)]);
        queue.admit(today - Duration::days(1), vec![article("recent", 10)]);
        queue.admit(today, vec![article("now", 10)]);

        assert_eq!(queue.backlog_len(today), 2);
        assert_eq!(queue.prune_older_than(today, 60), 1);
        assert_eq!(queue.backlog_len(today), 1);
    }
}
