//! One push run: poll feeds, keep new keyword matches, queue them and
//! deliver today's batches.

use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime};
use rand::Rng;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::RunSettings;
use crate::digest::{DigestGenerator, DigestStats};
use crate::feed::{parse_publication_date, FeedClient, FeedError};
use crate::fingerprint::fingerprint;
use crate::history::PushHistory;
use crate::models::{Article, FeedEntry, FeedSource};
use crate::notify::Notifier;
use crate::phrases::{extract_phrases, top_phrases};
use crate::schedule::PushQueue;
use crate::scorer::Scorer;
use crate::status::{FeedStatusBook, StatusSummary};
use crate::store::Repository;
use crate::translate::Translator;

const HOT_PHRASES: usize = 5;
const PAUSE_EVERY: usize = 5;
const STATUS_SAVE_EVERY: usize = 20;

/// Keyword matches from one feed
#[derive(Debug, Default)]
pub struct Collected {
    pub articles: Vec<Article>,
    /// Phrases from every non-duplicate entry, matching or not
    pub phrases: Vec<String>,
    pub duplicates: usize,
    /// Entries without a core keyword
    pub rejected: usize,
}

/// Score the entries of one feed, dropping recently pushed ones and those
/// without a core keyword.
pub fn collect_articles(
    entries: &[FeedEntry],
    source: &FeedSource,
    history: &PushHistory,
    scorer: &Scorer,
    today: NaiveDate,
    lookback_days: u32,
) -> Collected {
    let mut collected = Collected::default();

    for entry in entries {
        let fp = fingerprint(&entry.title, &entry.link);
        if history.is_duplicate(&fp, today, lookback_days) {
            collected.duplicates += 1;
            continue;
        }

        let text = entry.match_text();
        collected.phrases.extend(extract_phrases(&text));

        match scorer.evaluate(&text, &source.tier) {
            Some(score) => {
                let published = entry.raw_date.as_deref().and_then(parse_publication_date);
                collected
                    .articles
                    .push(Article::new(entry, source, score, None, published));
            }
            None => collected.rejected += 1,
        }
    }

    collected
}

/// Everything the polling stage produced
#[derive(Debug, Default)]
pub struct PollOutcome {
    pub articles: Vec<Article>,
    pub phrases: Vec<String>,
    pub polled: usize,
    pub duplicates: usize,
    /// Polling hit the deadline before every feed was read
    pub stopped_early: bool,
}

/// What a run did, for the binary's closing summary
#[derive(Debug, Clone)]
pub struct RunReport {
    pub new_matches: usize,
    pub admitted: usize,
    pub primary: usize,
    pub backfilled: usize,
    pub secondary: usize,
    pub queue_remaining: usize,
    pub pushed_today: usize,
    pub failed_parts: usize,
    /// Polling deadline hit before every feed was read
    pub stopped_early: bool,
    pub feeds: StatusSummary,
}

/// Collaborators and state of one push run
pub struct PushRun<'a> {
    pub settings: &'a RunSettings,
    pub scorer: &'a Scorer,
    pub feeds: &'a FeedClient,
    /// `None` keeps original titles
    pub translator: Option<&'a Translator>,
    pub notifier: &'a dyn Notifier,
    pub history: &'a dyn Repository<PushHistory>,
    pub queue: &'a dyn Repository<PushQueue>,
    pub status: &'a dyn Repository<FeedStatusBook>,
    /// Wait between polls and before the second batch
    pub pacing: bool,
}

impl PushRun<'_> {
    pub async fn run(&self, sources: &[FeedSource], now: NaiveDateTime) -> Result<RunReport> {
        let today = now.date();
        let settings = self.settings;
        settings.validate()?;

        let mut history = self.history.load();
        let pruned = history.prune_older_than(today, settings.retention_days);
        if pruned > 0 {
            info!(days = pruned, "pruned old push history");
        }

        let mut queue = self.queue.load();
        let pruned = queue.prune_older_than(today, settings.retention_days);
        if pruned > 0 {
            info!(days = pruned, "pruned old queue days");
        }

        let mut status = self.status.load();
        let poll = self.poll(sources, &history, &mut status, today).await;
        if let Err(e) = self.status.save(&status) {
            warn!(error = %e, "failed to save feed status");
        }

        let mut articles = poll.articles;
        if let Some(translator) = self.translator {
            translate_titles(translator, &mut articles).await;
        }

        let new_matches = articles.len();
        let admitted = queue.admit(today, articles);
        info!(new_matches, admitted, queued = queue.day(today).len(), "queued today's matches");

        let feeds = status.summary(sources, today);
        let hot_phrases = top_phrases(&poll.phrases, HOT_PHRASES);
        let plan = queue.plan_delivery(today, settings.batch_size, &history);
        let queue_remaining = queue.day(today).len();

        let mut stats = DigestStats {
            today,
            pushed_at: now,
            batch_size: settings.batch_size,
            new_matches,
            feeds: &feeds,
            hot_phrases: &hot_phrases,
            phrase_count: poll.phrases.len(),
        };

        let mut failed_parts = 0;
        if plan.primary.is_empty() {
            info!("no articles to deliver today");
            failed_parts += self.notifier.push(&DigestGenerator::empty_message(&stats)).await;
            self.queue.save(&queue)?;
            self.history.save(&history)?;
        } else {
            if plan.backfilled > 0 {
                info!(count = plan.backfilled, "backfilled from backlog");
            }
            let message =
                DigestGenerator::primary_message(&plan.primary, !plan.secondary.is_empty(), &stats);
            failed_parts += self.notifier.push(&message).await;

            history.record(today, plan.primary.iter().map(|a| a.fingerprint.clone()));
            self.history.save(&history)?;
            self.queue.save(&queue)?;

            if !plan.secondary.is_empty() {
                let pause = self.pause_before_secondary();
                tokio::time::sleep(pause).await;
                stats.pushed_at = now
                    + chrono::Duration::from_std(pause).unwrap_or_else(|_| chrono::Duration::zero());

                let message =
                    DigestGenerator::secondary_message(&plan.secondary, queue_remaining, &stats);
                failed_parts += self.notifier.push(&message).await;

                history.record(today, plan.secondary.iter().map(|a| a.fingerprint.clone()));
                self.history.save(&history)?;
            }
        }

        Ok(RunReport {
            new_matches,
            admitted,
            primary: plan.primary.len(),
            backfilled: plan.backfilled,
            secondary: plan.secondary.len(),
            queue_remaining,
            pushed_today: history.pushed_on(today),
            failed_parts,
            stopped_early: poll.stopped_early,
            feeds,
        })
    }

    /// Poll `sources` one after another until done or out of time
    pub async fn poll(
        &self,
        sources: &[FeedSource],
        history: &PushHistory,
        status: &mut FeedStatusBook,
        today: NaiveDate,
    ) -> PollOutcome {
        let deadline = Instant::now() + self.settings.polling_deadline;
        let mut outcome = PollOutcome::default();

        for (i, source) in sources.iter().enumerate() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(polled = outcome.polled, total = sources.len(), "polling deadline reached");
                outcome.stopped_early = true;
                break;
            }

            info!(feed = %source.title, tier = %source.tier, "[{}/{}] reading feed", i + 1, sources.len());
            let fetched = match tokio::time::timeout(remaining, self.feeds.fetch(source)).await {
                Ok(fetched) => fetched,
                Err(_) => {
                    status.record_failure(source, today, &FeedError::Timeout);
                    warn!(polled = outcome.polled, total = sources.len(), "polling deadline reached");
                    outcome.stopped_early = true;
                    break;
                }
            };
            outcome.polled += 1;

            match fetched {
                Ok(entries) if entries.is_empty() => {
                    warn!(feed = %source.title, "feed returned no entries");
                    status.record_empty(source, today);
                }
                Ok(entries) => {
                    status.record_success(source, today);
                    let collected = collect_articles(
                        &entries,
                        source,
                        history,
                        self.scorer,
                        today,
                        self.settings.lookback_days,
                    );
                    info!(
                        feed = %source.title,
                        entries = entries.len(),
                        matches = collected.articles.len(),
                        duplicates = collected.duplicates,
                        "feed processed"
                    );
                    outcome.duplicates += collected.duplicates;
                    outcome.articles.extend(collected.articles);
                    outcome.phrases.extend(collected.phrases);
                }
                Err(e) => {
                    warn!(feed = %source.title, error = %e, "feed failed");
                    status.record_failure(source, today, &e);
                }
            }

            let n = i + 1;
            if n % STATUS_SAVE_EVERY == 0 {
                if let Err(e) = self.status.save(status) {
                    warn!(error = %e, "failed to save feed status");
                }
            }
            if self.pacing && n % PAUSE_EVERY == 0 && n < sources.len() {
                let secs = rand::thread_rng().gen_range(1.0..2.5);
                debug!(secs, "pausing between feeds");
                tokio::time::sleep(Duration::from_secs_f64(secs)).await;
            }
        }

        outcome
    }

    fn pause_before_secondary(&self) -> Duration {
        if self.pacing {
            Duration::from_secs(5)
        } else {
            Duration::ZERO
        }
    }
}

async fn translate_titles(translator: &Translator, articles: &mut [Article]) {
    for article in articles.iter_mut() {
        if let Some(translated) = translator.translate(&article.title).await {
            article.translated_title = translated;
        }
    }
}
