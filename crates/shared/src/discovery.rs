//! Finds RSS/Atom feeds for journals listed by title and ISSN.
//!
//! Each journal is tried against known publisher URL patterns first, then
//! the homepages OpenAlex knows for its ISSN, then a web search. Every
//! candidate URL is fetched and checked before it is accepted.

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, Weekday};
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

use crate::csv::CsvTable;
use crate::feed::{FeedError, FEED_ACCEPT};
use crate::retry::RetryPolicy;
use crate::sources::{Journal, FEED_LIST_COLUMNS};

pub const OPENALEX_URL: &str = "https://api.openalex.org";
pub const SEARCH_URL: &str = "https://www.bing.com/search";

/// Time allowed for a single journal
pub const JOURNAL_BUDGET: Duration = Duration::from_secs(60);
/// Time allowed for a whole discovery pass
pub const DISCOVERY_BUDGET: Duration = Duration::from_secs(30 * 60);

const CHECKPOINT_EVERY: usize = 20;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.0 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36 Edg/121.0.0.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) Gecko/20100101 Firefox/120.0",
];

/// Paths commonly serving a site's feed
const COMMON_SUFFIXES: &[&str] = &[
    "rss",
    "feed",
    "rss.xml",
    "atom.xml",
    "feeds",
    "index.xml",
    "feed/rss",
    "rss/feed",
    "rss/all",
    "feeds/posts/default",
    "feed.xml",
    "atom",
    "syndication",
    "rss/index",
    "news/feed",
    "current.rss",
    "current.xml",
    "current-issue",
    "current-issue/feed",
    "current-issue/rss",
    "latest/rss",
    "latest.xml",
];

const FEED_HINTS: &[&str] = &["rss", "feed", "atom", "xml", "syndication"];
const SEARCH_HINTS: &[&str] = &["rss", "feed", "atom", ".xml"];

const FEED_CONTENT_TYPES: &[&str] = &[
    "application/rss+xml",
    "application/atom+xml",
    "application/xml",
    "text/xml",
];

/// How much of a response body is inspected for feed markers
const SNIFF_BYTES: usize = 8192;

#[allow(clippy::expect_used)]
static ALTERNATE_LINKS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("link[rel][href]").expect("valid selector"));

#[allow(clippy::expect_used)]
static ANCHORS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

#[allow(clippy::expect_used)]
static META_DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("meta[name][content]").expect("valid selector"));

#[allow(clippy::expect_used)]
static BARE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("valid regex"));

#[allow(clippy::expect_used)]
static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]").expect("valid regex"));

/// How a feed URL was found, or why none was
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMethod {
    PublisherSpecific,
    Official,
    Search,
    Timeout,
    Error,
}

impl DiscoveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PublisherSpecific => "publisher_specific",
            Self::Official => "official",
            Self::Search => "search",
            Self::Timeout => "timeout",
            Self::Error => "error",
        }
    }
}

/// Why a discovery pass runs before polling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryTrigger {
    Forced,
    /// No feed list exists yet
    Missing,
    /// Weekly refresh on Sunday
    Weekly,
}

/// Decide whether the feed list should be rebuilt today.
///
/// `feed_list_modified` is the local date the feed list was last written,
/// `None` when it does not exist.
pub fn discovery_due(
    today: NaiveDate,
    feed_list_modified: Option<NaiveDate>,
    forced: bool,
) -> Option<DiscoveryTrigger> {
    if forced {
        return Some(DiscoveryTrigger::Forced);
    }
    match feed_list_modified {
        None => Some(DiscoveryTrigger::Missing),
        Some(modified) if today.weekday() == Weekday::Sun && modified != today => {
            Some(DiscoveryTrigger::Weekly)
        }
        Some(_) => None,
    }
}

/// Result of looking up one journal
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Discovery {
    pub url: Option<String>,
    pub method: Option<DiscoveryMethod>,
}

impl Discovery {
    fn found(url: String, method: DiscoveryMethod) -> Self {
        Self {
            url: Some(url),
            method: Some(method),
        }
    }

    fn failed(method: DiscoveryMethod) -> Self {
        Self {
            url: None,
            method: Some(method),
        }
    }
}

/// Outcome of a discovery pass over a journal list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedListReport {
    pub total: usize,
    pub processed: usize,
    pub found: usize,
    pub timed_out: bool,
}

#[derive(Deserialize)]
struct OpenAlexSource {
    #[serde(default)]
    homepage_url: Option<String>,
    #[serde(default)]
    alternate_urls: Vec<String>,
}

pub struct FeedFinder {
    client: Client,
    retry: RetryPolicy,
    openalex_url: String,
    search_url: String,
    journal_budget: Duration,
    pauses: bool,
}

impl FeedFinder {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            retry: RetryPolicy::for_probes(),
            openalex_url: OPENALEX_URL.to_string(),
            search_url: SEARCH_URL.to_string(),
            journal_budget: JOURNAL_BUDGET,
            pauses: true,
        })
    }

    /// Point the OpenAlex and search lookups somewhere else
    pub fn with_endpoints(mut self, openalex_url: impl Into<String>, search_url: impl Into<String>) -> Self {
        self.openalex_url = openalex_url.into();
        self.search_url = search_url.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Skip the politeness pauses between journals
    pub fn without_pauses(mut self) -> Self {
        self.pauses = false;
        self
    }

    pub async fn find_for_journal(&self, title: &str, issn: &str) -> Discovery {
        let (title, issn) = (title.trim(), issn.trim());
        if title.is_empty() && issn.is_empty() {
            warn!("journal has neither title nor ISSN");
            return Discovery::failed(DiscoveryMethod::Error);
        }

        debug!(title, issn, "finding feed");
        let deadline = Instant::now() + self.journal_budget;

        for candidate in publisher_candidates(title, issn) {
            if Instant::now() >= deadline {
                warn!(title, "journal lookup timed out");
                return Discovery::failed(DiscoveryMethod::Timeout);
            }
            if self.is_feed(&candidate).await {
                return Discovery::found(candidate, DiscoveryMethod::PublisherSpecific);
            }
        }

        for home in self.homepages(issn).await {
            if Instant::now() >= deadline {
                warn!(title, "journal lookup timed out");
                return Discovery::failed(DiscoveryMethod::Timeout);
            }
            if let Some(url) = self.official_feed(&home, deadline).await {
                return Discovery::found(url, DiscoveryMethod::Official);
            }
        }

        if Instant::now() >= deadline {
            warn!(title, "journal lookup timed out");
            return Discovery::failed(DiscoveryMethod::Timeout);
        }
        if !title.is_empty() {
            if let Some(url) = self.search_feed(title, deadline).await {
                return Discovery::found(url, DiscoveryMethod::Search);
            }
        }

        Discovery::default()
    }

    /// Homepages OpenAlex lists for `issn`, or guessed publisher pages
    pub async fn homepages(&self, issn: &str) -> Vec<String> {
        if issn.is_empty() {
            return Vec::new();
        }

        let url = format!(
            "{}/sources/ISSN:{}",
            self.openalex_url.trim_end_matches('/'),
            urlencoding::encode(issn)
        );
        let mut homes = Vec::new();
        match self.fetch_json::<OpenAlexSource>(&url).await {
            Ok(source) => {
                homes.extend(source.homepage_url.as_deref().and_then(normalize_url));
                homes.extend(source.alternate_urls.iter().filter_map(|u| normalize_url(u)));
            }
            Err(e) => debug!(issn, error = %e, "OpenAlex lookup failed"),
        }

        if homes.is_empty() {
            let bare = issn.replace('-', "");
            homes.extend([
                format!("https://www.doi.org/{}", issn),
                format!("https://www.doi.org/{}", bare),
                format!("https://www.sciencedirect.com/journal/{}", issn),
                format!("https://onlinelibrary.wiley.com/journal/{}", issn),
                format!("https://www.tandfonline.com/journals/{}", issn),
                format!("https://journals.sagepub.com/{}", issn),
            ]);
        }

        dedup_in_order(homes)
    }

    /// First working feed advertised on or guessed for a homepage
    pub async fn official_feed(&self, home: &str, deadline: Instant) -> Option<String> {
        let home = normalize_url(home)?;
        debug!(home = %home, "checking homepage");

        if let Ok((_, html)) = self.fetch(&home).await {
            for candidate in extract_feed_links(&home, &html) {
                if Instant::now() >= deadline {
                    return None;
                }
                if self.is_feed(&candidate).await {
                    return Some(candidate);
                }
            }
        }

        let mut bases = vec![home.trim_end_matches('/').to_string()];
        if let Ok(parsed) = Url::parse(&home) {
            let origin = parsed.origin().ascii_serialization();
            if origin != bases[0] {
                bases.push(origin);
            }
        }

        for base in &bases {
            for suffix in COMMON_SUFFIXES {
                if Instant::now() >= deadline {
                    return None;
                }
                let candidate = format!("{}/{}", base, suffix);
                if self.is_feed(&candidate).await {
                    return Some(candidate);
                }
            }
        }

        None
    }

    async fn search_feed(&self, title: &str, deadline: Instant) -> Option<String> {
        let query = format!("{} journal rss feed", title);
        let url = Url::parse_with_params(&self.search_url, &[("q", query.as_str())]).ok()?;

        let (_, html) = match self.fetch(url.as_str()).await {
            Ok(page) => page,
            Err(e) => {
                debug!(title, error = %e, "search request failed");
                return None;
            }
        };

        let candidates: Vec<String> = {
            let document = Html::parse_document(&html);
            document
                .select(&ANCHORS)
                .filter_map(|a| a.value().attr("href"))
                .filter(|href| {
                    let href = href.to_lowercase();
                    SEARCH_HINTS.iter().any(|hint| href.contains(hint))
                })
                .filter_map(|href| url.join(href).ok())
                .map(|u| u.to_string())
                .collect()
        };

        for candidate in dedup_in_order(candidates) {
            if Instant::now() >= deadline {
                return None;
            }
            if self.is_feed(&candidate).await {
                return Some(candidate);
            }
        }
        None
    }

    /// Look up every journal and write the results to `out_path`.
    ///
    /// A `.temp` checkpoint is written every 20 journals. When `budget` runs
    /// out, the journals processed so far are written and the rest skipped.
    pub async fn update_feed_list(
        &self,
        journals: &[Journal],
        out_path: &Path,
        budget: Duration,
    ) -> Result<FeedListReport> {
        let started = Instant::now();
        let total = journals.len();
        let mut table = CsvTable::new(FEED_LIST_COLUMNS);
        let mut found = 0;
        let mut timed_out = false;

        for (i, journal) in journals.iter().enumerate() {
            let n = i + 1;
            let remaining = match budget.checked_sub(started.elapsed()) {
                Some(remaining) if !remaining.is_zero() => remaining,
                _ => {
                    timed_out = true;
                    break;
                }
            };

            println!("  [{}/{}] {}", n, total, truncate(&journal.title, 50));
            let discovery = match tokio::time::timeout(
                remaining,
                self.find_for_journal(&journal.title, &journal.issn),
            )
            .await
            {
                Ok(discovery) => discovery,
                Err(_) => {
                    timed_out = true;
                    break;
                }
            };

            match &discovery.url {
                Some(url) => {
                    found += 1;
                    info!(journal = %journal.title, url = %url, "feed found");
                }
                None => info!(journal = %journal.title, "no feed found"),
            }
            table.push_row([
                journal.index.clone(),
                journal.title.clone(),
                journal.issn.clone(),
                journal.tier.clone(),
                discovery.url.unwrap_or_default(),
                discovery.method.map(|m| m.as_str().to_string()).unwrap_or_default(),
            ]);

            self.pause_after(n).await;

            if n % CHECKPOINT_EVERY == 0 {
                let checkpoint = checkpoint_path(out_path);
                match table.write(&checkpoint) {
                    Ok(()) => info!(path = %checkpoint.display(), "checkpoint saved"),
                    Err(e) => warn!(error = %e, "failed to save checkpoint"),
                }
            }
        }

        if timed_out {
            warn!(processed = table.len(), total, "discovery budget exhausted, keeping partial results");
        }

        table.write(out_path)?;

        Ok(FeedListReport {
            total,
            processed: table.len(),
            found,
            timed_out,
        })
    }

    async fn pause_after(&self, n: usize) {
        if !self.pauses {
            return;
        }
        let secs = {
            let mut rng = rand::thread_rng();
            if n % 10 == 0 {
                rng.gen_range(5.0..10.0)
            } else if n % 3 == 0 {
                rng.gen_range(2.0..5.0)
            } else {
                return;
            }
        };
        debug!(secs, "pausing between journals");
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    }

    async fn is_feed(&self, url: &str) -> bool {
        match self.fetch(url).await {
            Ok((content_type, body)) => {
                let ok = looks_like_feed(&content_type, &body);
                if ok {
                    debug!(url, "valid feed");
                }
                ok
            }
            Err(_) => false,
        }
    }

    async fn fetch(&self, url: &str) -> Result<(String, String), FeedError> {
        self.retry.run(url, || self.fetch_once(url)).await
    }

    async fn fetch_once(&self, url: &str) -> Result<(String, String), FeedError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, random_user_agent())
            .header(reqwest::header::ACCEPT, FEED_ACCEPT)
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9,zh-CN;q=0.8")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Http(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.text().await?;
        Ok((content_type, body))
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let (_, body) = self.fetch(url).await?;
        serde_json::from_str(&body).with_context(|| format!("Failed to parse JSON from {}", url))
    }
}

fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// XML content type and a feed element near the start of the body
pub fn looks_like_feed(content_type: &str, body: &str) -> bool {
    let content_type = content_type.to_lowercase();
    if !FEED_CONTENT_TYPES.iter().any(|t| content_type.contains(t)) {
        return false;
    }

    let head = truncate_bytes(body, SNIFF_BYTES).to_lowercase();
    ["<rss", "<feed", "<channel", "<item>", "<entry>"]
        .iter()
        .any(|marker| head.contains(marker))
}

/// Absolute `https` form of a possibly scheme-less URL
pub fn normalize_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Some(rest) = raw.strip_prefix("//") {
        return Some(format!("https://{}", rest));
    }
    if raw.contains("://") {
        return Some(raw.to_string());
    }
    Some(format!("https://{}", raw))
}

/// Lowercased title with punctuation removed and words joined by `-`
pub fn title_slug(title: &str) -> String {
    let cleaned = NON_WORD.replace_all(&title.to_lowercase(), "").to_string();
    cleaned.split_whitespace().collect::<Vec<_>>().join("-")
}

/// Feed URLs the big publishers use for a journal, most likely first
pub fn publisher_candidates(title: &str, issn: &str) -> Vec<String> {
    let slug = title_slug(title);
    let mut urls = Vec::new();

    if !issn.is_empty() {
        for value in [issn.to_string(), issn.replace('-', "")] {
            urls.push(format!("https://rss.sciencedirect.com/publication/science/{}", value));
            urls.push(format!(
                "https://www.sciencedirect.com/journal/{}/latest-articles/rss",
                value
            ));
        }
        urls.push(format!("https://onlinelibrary.wiley.com/feed/{}/most-recent", issn));
        urls.push(format!(
            "https://onlinelibrary.wiley.com/action/showFeed?type=etoc&feed=rss&jc={}",
            issn
        ));
    }
    if !slug.is_empty() {
        urls.push(format!("https://www.nature.com/{}.rss", slug));
        urls.push(format!("https://www.mdpi.com/rss/journal/{}", slug));
    }
    if !issn.is_empty() {
        urls.push(format!("https://link.springer.com/journal/{}.rss", issn));
    }
    if !slug.is_empty() {
        urls.push(format!("https://www.tandfonline.com/feed/rss/{}", slug));
        urls.push(format!(
            "https://journals.sagepub.com/action/showFeed?ui=0&mi=ehikzz&ai=2b4&jc={}&type=etoc&feed=rss",
            slug
        ));
    }

    dedup_in_order(urls)
}

/// Feed URLs advertised by an HTML page, resolved against `base`
pub fn extract_feed_links(base: &str, html: &str) -> Vec<String> {
    let Ok(base_url) = Url::parse(base) else {
        return Vec::new();
    };
    let document = Html::parse_document(html);
    let mut links = Vec::new();

    for link in document.select(&ALTERNATE_LINKS) {
        let el = link.value();
        let rel = el.attr("rel").unwrap_or_default().to_lowercase();
        let kind = el.attr("type").unwrap_or_default().to_lowercase();
        if rel.contains("alternate") && (kind.contains("xml") || kind.contains("rss")) {
            if let Some(href) = el.attr("href") {
                links.extend(base_url.join(href).ok().map(|u| u.to_string()));
            }
        }
    }

    for anchor in document.select(&ANCHORS) {
        let href = anchor.value().attr("href").unwrap_or_default();
        let text = anchor.text().collect::<String>().to_lowercase();
        let href_lower = href.to_lowercase();
        if FEED_HINTS
            .iter()
            .any(|hint| href_lower.contains(hint) || text.contains(hint))
        {
            links.extend(base_url.join(href).ok().map(|u| u.to_string()));
        }
    }

    for meta in document.select(&META_DESCRIPTION) {
        let el = meta.value();
        if !el.attr("name").unwrap_or_default().eq_ignore_ascii_case("description") {
            continue;
        }
        let content = el.attr("content").unwrap_or_default();
        if !content.to_lowercase().contains("rss") {
            continue;
        }
        for m in BARE_URL.find_iter(content) {
            let url = m.as_str().to_lowercase();
            if ["rss", "feed", "atom", "xml"].iter().any(|hint| url.contains(hint)) {
                links.push(m.as_str().to_string());
            }
        }
    }

    dedup_in_order(links)
}

fn checkpoint_path(out_path: &Path) -> PathBuf {
    let mut path = out_path.as_os_str().to_owned();
    path.push(".temp");
    PathBuf::from(path)
}

fn dedup_in_order(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items.into_iter().filter(|i| seen.insert(i.clone())).collect()
}

fn truncate_bytes(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RSS: &str = "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>T</title></channel></rss>";

    // ==================== Helper Tests ====================

    #[test]
    fn test_looks_like_feed() {
        assert!(looks_like_feed("application/rss+xml; charset=utf-8", RSS));
        assert!(looks_like_feed("text/xml", "<?xml version=\"1.0\"?><feed xmlns=\"http://www.w3.org/2005/Atom\">"));
        assert!(!looks_like_feed("text/html", RSS));
        assert!(!looks_like_feed("application/xml", "<html><body>nope</body></html>"));
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("//example.org/j"), Some("https://example.org/j".to_string()));
        assert_eq!(normalize_url("example.org"), Some("https://example.org".to_string()));
        assert_eq!(normalize_url("http://example.org"), Some("http://example.org".to_string()));
        assert_eq!(normalize_url("  "), None);
    }

    #[test]
    fn test_title_slug() {
        assert_eq!(title_slug("Earth & Planetary Science Letters"), "earth-planetary-science-letters");
        assert_eq!(title_slug("Geology"), "geology");
    }

    #[test]
    fn test_publisher_candidates() {
        let urls = publisher_candidates("Nature Geoscience", "1752-0894");
        assert_eq!(urls[0], "https://rss.sciencedirect.com/publication/science/1752-0894");
        assert!(urls.contains(&"https://rss.sciencedirect.com/publication/science/17520894".to_string()));
        assert!(urls.contains(&"https://www.nature.com/nature-geoscience.rss".to_string()));
        assert!(urls.contains(&"https://link.springer.com/journal/1752-0894.rss".to_string()));

        let no_issn = publisher_candidates("Geology", "");
        assert!(no_issn.iter().all(|u| !u.contains("sciencedirect")));
        assert_eq!(no_issn.len(), 4);
    }

    #[test]
    fn test_extract_feed_links() {
        let html = r#"<html><head>
            <link rel="alternate" type="application/rss+xml" href="/rss/current.xml">
            <link rel="stylesheet" type="text/css" href="/style.css">
            <meta name="description" content="Latest issues, RSS at https://feeds.example.org/geo.atom now">
            </head><body>
            <a href="/about">About</a>
            <a href="/subscribe">RSS Feed</a>
            <a href="https://other.org/feed">Elsewhere</a>
            </body></html>"#;

        let links = extract_feed_links("https://journal.example.org/home/", html);
        assert_eq!(
            links,
            vec![
                "https://journal.example.org/rss/current.xml".to_string(),
                "https://journal.example.org/subscribe".to_string(),
                "https://other.org/feed".to_string(),
                "https://feeds.example.org/geo.atom".to_string(),
            ]
        );
    }

    #[test]
    fn test_checkpoint_path() {
        assert_eq!(
            checkpoint_path(Path::new("/data/journals_with_rss.csv")),
            PathBuf::from("/data/journals_with_rss.csv.temp")
        );
    }

    #[test]
    fn test_discovery_due() {
        let sunday = NaiveDate::from_ymd_opt(2025, 3, 2).unwrap();
        let monday = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let last_week = NaiveDate::from_ymd_opt(2025, 2, 23).unwrap();

        assert_eq!(discovery_due(monday, Some(last_week), true), Some(DiscoveryTrigger::Forced));
        assert_eq!(discovery_due(monday, None, false), Some(DiscoveryTrigger::Missing));
        assert_eq!(discovery_due(monday, Some(last_week), false), None);
        assert_eq!(discovery_due(sunday, Some(last_week), false), Some(DiscoveryTrigger::Weekly));
        assert_eq!(discovery_due(sunday, Some(sunday), false), None);
    }

    #[test]
    fn test_discovery_method_labels() {
        assert_eq!(DiscoveryMethod::PublisherSpecific.as_str(), "publisher_specific");
        assert_eq!(DiscoveryMethod::Official.as_str(), "official");
        assert_eq!(DiscoveryMethod::Search.as_str(), "search");
    }

    // ==================== Network Lookup Tests ====================

    fn finder(server: &MockServer) -> FeedFinder {
        FeedFinder::new()
            .unwrap()
            .with_endpoints(server.uri(), format!("{}/search", server.uri()))
            .with_retry(RetryPolicy::none())
            .without_pauses()
    }

    #[tokio::test]
    async fn test_homepages_from_openalex() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sources/ISSN:0091-7613"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "homepage_url": "http://geology.example.org",
                "alternate_urls": ["//geology.example.org", "geology.example.org/alt"]
            })))
            .mount(&server)
            .await;

        let homes = finder(&server).homepages("0091-7613").await;
        assert_eq!(
            homes,
            vec![
                "http://geology.example.org".to_string(),
                "https://geology.example.org".to_string(),
                "https://geology.example.org/alt".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_homepages_fall_back_to_guesses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let homes = finder(&server).homepages("0091-7613").await;
        assert_eq!(homes.len(), 6);
        assert_eq!(homes[0], "https://www.doi.org/0091-7613");
        assert_eq!(homes[1], "https://www.doi.org/00917613");
    }

    #[tokio::test]
    async fn test_official_feed_from_homepage_link() {
        let server = MockServer::start().await;
        let home_html = r#"<html><head><link rel="alternate" type="application/atom+xml" href="/issues.atom"></head></html>"#;
        Mock::given(method("GET"))
            .and(path("/journal"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(home_html, "text/html"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/issues.atom"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "<?xml version=\"1.0\"?><feed xmlns=\"http://www.w3.org/2005/Atom\"></feed>",
                "application/atom+xml",
            ))
            .mount(&server)
            .await;

        let finder = finder(&server);
        let home = format!("{}/journal", server.uri());
        let found = finder
            .official_feed(&home, Instant::now() + Duration::from_secs(30))
            .await;
        assert_eq!(found, Some(format!("{}/issues.atom", server.uri())));
    }

    #[tokio::test]
    async fn test_official_feed_from_common_suffix() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/journal/rss.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(RSS, "application/rss+xml"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let finder = finder(&server);
        let found = finder
            .official_feed(
                &format!("{}/journal/", server.uri()),
                Instant::now() + Duration::from_secs(30),
            )
            .await;
        assert_eq!(found, Some(format!("{}/journal/rss.xml", server.uri())));
    }

    #[tokio::test]
    async fn test_journal_without_title_or_issn() {
        let server = MockServer::start().await;
        let discovery = finder(&server).find_for_journal("  ", "").await;
        assert_eq!(discovery.url, None);
        assert_eq!(discovery.method, Some(DiscoveryMethod::Error));
    }

    #[tokio::test]
    async fn test_update_feed_list_writes_rows() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("journals_with_rss.csv");
        let journals = vec![Journal {
            index: "7".to_string(),
            title: String::new(),
            issn: String::new(),
            tier: "2区".to_string(),
        }];

        let report = finder(&server)
            .update_feed_list(&journals, &out, Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(report.total, 1);
        assert_eq!(report.processed, 1);
        assert_eq!(report.found, 0);
        assert!(!report.timed_out);

        let written = std::fs::read_to_string(&out).unwrap();
        assert_eq!(written, "index,title,issn,zone,rss_url,rss_source\n7,,,2区,,error\n");
    }

    #[tokio::test]
    async fn test_update_feed_list_with_spent_budget() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("journals_with_rss.csv");
        let journals = vec![Journal {
            index: "1".to_string(),
            title: "Geology".to_string(),
            issn: "0091-7613".to_string(),
            tier: "1区".to_string(),
        }];

        let report = finder(&server)
            .update_feed_list(&journals, &out, Duration::ZERO)
            .await
            .unwrap();

        assert!(report.timed_out);
        assert_eq!(report.processed, 0);
        assert_eq!(
            std::fs::read_to_string(&out).unwrap(),
            "index,title,issn,zone,rss_url,rss_source\n"
        );
    }
}
