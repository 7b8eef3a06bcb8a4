use anyhow::{Context, Result};
use clap::Parser;
use shared::discovery::DISCOVERY_BUDGET;
use shared::sources::{load_journals, FEED_LIST_FILE, JOURNAL_LIST_FILE};
use shared::{Config, FeedFinder};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "discover-feeds")]
#[command(about = "Find RSS/Atom feeds for a list of journals and write the feed list")]
struct Args {
    /// Journal list CSV with index,title,issn,zone columns
    #[arg(short, long)]
    journals: Option<PathBuf>,

    /// Where to write the feed list
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Overall time budget in minutes
    #[arg(long, default_value_t = DISCOVERY_BUDGET.as_secs() / 60)]
    budget_minutes: u64,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = match args.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    debug!(?args, "CLI arguments parsed");

    let config = Config::from_env()?;
    let journal_list = args
        .journals
        .unwrap_or_else(|| config.data_file(JOURNAL_LIST_FILE));
    let output = args
        .output
        .unwrap_or_else(|| config.data_file(FEED_LIST_FILE));

    println!("📚 Reading journal list from {}", journal_list.display());
    let journals = load_journals(&journal_list)
        .with_context(|| format!("Failed to load journal list: {}", journal_list.display()))?;

    if journals.is_empty() {
        println!("No journals found in {}.", journal_list.display());
        return Ok(());
    }
    println!("✓ Found {} journals", journals.len());

    println!("\n🌐 Discovering feeds...");
    println!("  (This can take a while; progress is checkpointed every 20 journals)");
    let finder = FeedFinder::new()?;
    let report = finder
        .update_feed_list(
            &journals,
            &output,
            Duration::from_secs(args.budget_minutes * 60),
        )
        .await
        .context("Failed to update feed list")?;

    println!(
        "\n✓ Found feeds for {}/{} journals",
        report.found, report.total
    );
    if report.timed_out {
        println!(
            "⚠ Time budget ran out after {} of {} journals",
            report.processed, report.total
        );
    }

    println!("\n✅ Feed list saved to: {}", output.display());

    Ok(())
}
