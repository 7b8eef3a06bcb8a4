use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate};
use clap::Parser;
use shared::discovery::{discovery_due, DiscoveryTrigger, DISCOVERY_BUDGET};
use shared::history::{DEFAULT_LOOKBACK_DAYS, DEFAULT_RETENTION_DAYS};
use shared::schedule::DEFAULT_BATCH_SIZE;
use shared::sources::{
    additional_feeds, load_feed_sources, load_journals, FEED_LIST_FILE, JOURNAL_LIST_FILE,
};
use shared::store::{HISTORY_FILE, QUEUE_FILE, STATUS_FILE};
use shared::{
    Config, DigestGenerator, FeedClient, FeedFinder, FeedStatusBook, JsonFileRepository,
    Notifier, PushHistory, PushQueue, PushRun, RetryPolicy, RunSettings, Scorer, StdoutNotifier,
    Translator, WebhookNotifier,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Parser, Debug)]
#[command(name = "push-articles")]
#[command(about = "Poll journal feeds for geoscience keyword matches and push the daily digest")]
struct Args {
    /// Articles per message
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Days an already pushed article stays a duplicate
    #[arg(long, default_value_t = DEFAULT_LOOKBACK_DAYS)]
    lookback_days: u32,

    /// Days of push history and queue backlog to keep
    #[arg(long, default_value_t = DEFAULT_RETENTION_DAYS)]
    retention_days: u32,

    /// Journal list used for feed discovery (default: <data dir>/journals_1-260.csv)
    #[arg(long)]
    journals: Option<PathBuf>,

    /// Feed list to poll (default: <data dir>/journals_with_rss.csv)
    #[arg(long)]
    feeds: Option<PathBuf>,

    /// Keep original titles instead of adding Chinese translations
    #[arg(long)]
    no_translate: bool,

    /// Print messages instead of sending them
    #[arg(long)]
    dry_run: bool,

    /// Rebuild the feed list before polling
    #[arg(long)]
    force_discovery: bool,

    /// Never rebuild the feed list
    #[arg(long, conflicts_with = "force_discovery")]
    skip_discovery: bool,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // RUST_LOG wins over -v
    let default_level = match args.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    debug!(?args, "CLI arguments parsed");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("✗ {:#}", e);
            // The webhook may be set even though the data dir is unusable
            let webhook_url = Config::webhook_from_env();
            report_failure(&args, webhook_url.as_deref(), &e).await;
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&args, &config).await {
        eprintln!("\n✗ Push run failed: {:#}", e);
        report_failure(&args, config.webhook_url.as_deref(), &e).await;
        std::process::exit(1);
    }
}

async fn run(args: &Args, config: &Config) -> Result<()> {
    let now = Local::now().naive_local();
    let today = now.date();

    let settings = RunSettings {
        batch_size: args.batch_size,
        lookback_days: args.lookback_days,
        retention_days: args.retention_days,
        translate: !args.no_translate,
        ..RunSettings::default()
    };
    settings.validate()?;

    let notifier: Box<dyn Notifier> = if args.dry_run {
        Box::new(StdoutNotifier)
    } else {
        Box::new(WebhookNotifier::new(config.require_webhook()?)?)
    };

    println!("🏔️ Journal sniffer run for {} at {}", today, now.format("%H:%M:%S"));
    println!("  Batch size: {}", settings.batch_size);

    let feed_list = args
        .feeds
        .clone()
        .unwrap_or_else(|| config.data_file(FEED_LIST_FILE));
    let journal_list = args
        .journals
        .clone()
        .unwrap_or_else(|| config.data_file(JOURNAL_LIST_FILE));

    // Step 1: refresh the feed list when due
    if !args.skip_discovery {
        let forced = args.force_discovery || config.force_discovery;
        match discovery_due(today, modified_date(&feed_list), forced) {
            Some(trigger) => refresh_feed_list(trigger, &journal_list, &feed_list).await?,
            None => println!("\n✓ Feed list is current, skipping discovery"),
        }
    }

    // Step 2: load feeds
    println!("\n📚 Loading feeds...");
    let mut sources = load_feed_sources(&feed_list)?;
    sources.extend(additional_feeds());

    let mut tiers: BTreeMap<&str, usize> = BTreeMap::new();
    for source in &sources {
        let tier = if source.tier.is_empty() {
            "unranked"
        } else {
            source.tier.as_str()
        };
        *tiers.entry(tier).or_default() += 1;
    }
    println!("✓ Loaded {} feeds", sources.len());
    let breakdown: Vec<String> = tiers.iter().map(|(t, n)| format!("{}({})", t, n)).collect();
    println!("  Tiers: {}", breakdown.join(", "));

    // Step 3: poll, queue and deliver
    println!("\n🔍 Polling feeds...");
    let feeds = FeedClient::new(RetryPolicy::for_feeds())?;
    let translator = if settings.translate {
        Some(Translator::new(&config.translate_api_url)?)
    } else {
        None
    };
    let scorer = Scorer::default();
    let history = JsonFileRepository::<PushHistory>::new(config.data_file(HISTORY_FILE));
    let queue = JsonFileRepository::<PushQueue>::new(config.data_file(QUEUE_FILE));
    let status = JsonFileRepository::<FeedStatusBook>::new(config.data_file(STATUS_FILE));

    let push_run = PushRun {
        settings: &settings,
        scorer: &scorer,
        feeds: &feeds,
        translator: translator.as_ref(),
        notifier: notifier.as_ref(),
        history: &history,
        queue: &queue,
        status: &status,
        pacing: true,
    };
    let report = push_run.run(&sources, now).await?;

    println!(
        "✓ Feeds: {}/{} succeeded ({:.1}%)",
        report.feeds.success, report.feeds.total, report.feeds.success_rate
    );
    if report.stopped_early {
        println!("⚠ Polling deadline reached, remaining feeds skipped");
    }
    println!("✓ Found {} new matches, {} queued", report.new_matches, report.admitted);

    if report.primary == 0 {
        println!("\n✓ No matching articles today, status message sent");
    } else {
        println!("\n✓ First batch: {} articles", report.primary);
        if report.backfilled > 0 {
            println!("  ({} backfilled from earlier days)", report.backfilled);
        }
        if report.secondary > 0 {
            println!("✓ Second batch: {} articles", report.secondary);
        }
        println!("  Still queued for today: {}", report.queue_remaining);
    }
    if report.failed_parts > 0 {
        println!("\n⚠ {} message parts could not be delivered", report.failed_parts);
    }

    println!("\n✅ Done. Pushed today: {}", report.pushed_today);
    Ok(())
}

async fn refresh_feed_list(
    trigger: DiscoveryTrigger,
    journal_list: &Path,
    feed_list: &Path,
) -> Result<()> {
    let reason = match trigger {
        DiscoveryTrigger::Forced => "forced",
        DiscoveryTrigger::Missing => "no feed list yet",
        DiscoveryTrigger::Weekly => "weekly refresh",
    };
    println!("\n🌐 Discovering journal feeds ({})...", reason);

    if !journal_list.exists() {
        warn!(path = %journal_list.display(), "journal list not found, skipping discovery");
        println!("⚠ Journal list not found: {}", journal_list.display());
        return Ok(());
    }

    let journals = load_journals(journal_list)?;
    let finder = FeedFinder::new()?;
    let report = finder
        .update_feed_list(&journals, feed_list, DISCOVERY_BUDGET)
        .await
        .context("Failed to update feed list")?;

    println!("✓ Found feeds for {}/{} journals", report.found, report.total);
    if report.timed_out {
        println!(
            "⚠ Discovery ran out of time after {} journals, partial list saved",
            report.processed
        );
    }
    Ok(())
}

/// Local date a file was last written, `None` when it is missing
fn modified_date(path: &Path) -> Option<NaiveDate> {
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    Some(DateTime::<Local>::from(modified).date_naive())
}

async fn report_failure(args: &Args, webhook_url: Option<&str>, error: &anyhow::Error) {
    let message = DigestGenerator::error_message(error, Local::now().naive_local());

    if args.dry_run {
        StdoutNotifier.push(&message).await;
        return;
    }
    match webhook_url.map(WebhookNotifier::new) {
        Some(Ok(notifier)) => {
            notifier.push(&message).await;
        }
        Some(Err(e)) => warn!(error = %e, "could not build notifier for error report"),
        None => warn!("PUSH_WEBHOOK_URL not set, error report not sent"),
    }
}
