use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use quick_xml::encoding::Decoder;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use regex::Regex;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use crate::models::{FeedEntry, FeedSource};
use crate::retry::{RetryPolicy, Retryable};
use crate::status::StatusKind;

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub const FEED_ACCEPT: &str = "application/rss+xml, application/atom+xml, application/xml, text/xml, */*";

#[allow(clippy::expect_used)]
static LOOSE_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4})[-/](\d{1,2})[-/](\d{1,2})").expect("date regex is valid")
});

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP error: {0}")]
    Http(u16),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("failed to parse feed: {0}")]
    Parse(String),

    #[error("request failed: {0}")]
    Other(String),
}

impl FeedError {
    pub fn status_kind(&self) -> StatusKind {
        match self {
            FeedError::Timeout => StatusKind::Timeout,
            FeedError::Http(_) => StatusKind::HttpError,
            FeedError::Connection(_) => StatusKind::ConnectionError,
            FeedError::Parse(_) | FeedError::Other(_) => StatusKind::UnknownError,
        }
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FeedError::Timeout
        } else if let Some(status) = e.status() {
            FeedError::Http(status.as_u16())
        } else if e.is_connect() {
            FeedError::Connection(e.to_string())
        } else {
            FeedError::Other(e.to_string())
        }
    }
}

impl Retryable for FeedError {
    fn is_retryable(&self) -> bool {
        match self {
            FeedError::Timeout | FeedError::Connection(_) | FeedError::Other(_) => true,
            FeedError::Http(status) => *status == 429 || *status >= 500,
            FeedError::Parse(_) => false,
        }
    }
}

/// Fetches and parses RSS/Atom feeds
pub struct FeedClient {
    client: Client,
    retry: RetryPolicy,
}

impl FeedClient {
    pub fn new(retry: RetryPolicy) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(BROWSER_USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self::with_client(client, retry))
    }

    pub fn with_client(client: Client, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    pub async fn fetch(&self, source: &FeedSource) -> Result<Vec<FeedEntry>, FeedError> {
        debug!(url = %source.url, "fetching feed");

        let bytes = self
            .retry
            .run(&source.url, || self.fetch_once(&source.url))
            .await?;

        let entries = parse_feed(&bytes)?;
        debug!(url = %source.url, count = entries.len(), "parsed feed");
        Ok(entries)
    }

    async fn fetch_once(&self, url: &str) -> Result<Vec<u8>, FeedError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, FEED_ACCEPT)
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9,zh-CN;q=0.8")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Http(status.as_u16()));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Summary(SummaryField),
    Date(DateField),
}

/// Summary elements in order of preference
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum SummaryField {
    Description,
    Content,
}

/// Date elements in order of preference
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum DateField {
    Published,
    Updated,
    PubDate,
    DcDate,
}

#[derive(Default)]
struct EntryBuilder {
    title: String,
    link: Option<String>,
    alternate_link: Option<String>,
    summary: Option<(SummaryField, String)>,
    dates: Vec<(DateField, String)>,
}

impl EntryBuilder {
    fn take_link_attributes(&mut self, e: &BytesStart, decoder: Decoder) {
        let mut href = None;
        let mut rel = None;
        for attr in e.attributes().flatten() {
            let value = decode_text(decoder, &attr.value, true);
            match attr.key.local_name().as_ref() {
                b"href" => href = Some(value),
                b"rel" => rel = Some(value),
                _ => {}
            }
        }

        if let Some(href) = href {
            let is_alternate = rel.as_deref().map_or(true, |r| r == "alternate");
            if is_alternate && self.alternate_link.is_none() {
                self.alternate_link = Some(href);
            } else if self.link.is_none() {
                self.link = Some(href);
            }
        }
    }

    fn set(&mut self, field: Field, text: String) {
        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }
        match field {
            Field::Title => {
                if self.title.is_empty() {
                    self.title = text;
                }
            }
            Field::Link => {
                if self.alternate_link.is_none() {
                    self.alternate_link = Some(text);
                }
            }
            Field::Summary(kind) => {
                // description/summary win over content; first of a kind stays
                if self.summary.as_ref().map_or(true, |(seen, _)| kind < *seen) {
                    self.summary = Some((kind, text));
                }
            }
            Field::Date(kind) => self.dates.push((kind, text)),
        }
    }

    fn build(mut self) -> FeedEntry {
        self.dates.sort_by_key(|(kind, _)| *kind);
        let raw_date = self
            .dates
            .iter()
            .find(|(_, raw)| parse_publication_date(raw).is_some())
            .or_else(|| self.dates.first())
            .map(|(_, raw)| raw.clone());

        FeedEntry {
            title: self.title,
            link: self.alternate_link.or(self.link).unwrap_or_default(),
            summary: self.summary.map(|(_, text)| text).unwrap_or_default(),
            raw_date,
        }
    }
}

fn entry_field(local_name: &[u8], qualified: &[u8]) -> Option<Field> {
    match local_name {
        b"title" => Some(Field::Title),
        b"link" => Some(Field::Link),
        b"description" | b"summary" => Some(Field::Summary(SummaryField::Description)),
        b"content" | b"encoded" => Some(Field::Summary(SummaryField::Content)),
        b"published" => Some(Field::Date(DateField::Published)),
        b"updated" => Some(Field::Date(DateField::Updated)),
        b"pubDate" => Some(Field::Date(DateField::PubDate)),
        b"date" if qualified.starts_with(b"dc:") || qualified == b"date" => {
            Some(Field::Date(DateField::DcDate))
        }
        _ => None,
    }
}

/// Parse the `<item>` (RSS) and `<entry>` (Atom) elements of a feed document.
///
/// Text is decoded with the encoding named by the BOM or XML declaration,
/// so GB2312/GBK feeds come out as proper Chinese.
pub fn parse_feed(xml: &[u8]) -> Result<Vec<FeedEntry>, FeedError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut buf = Vec::new();

    let mut depth = 0usize;
    let mut current: Option<(EntryBuilder, usize)> = None;
    let mut capture: Option<(Field, usize, String)> = None;
    let mut saw_feed_root = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                depth += 1;
                let local = e.local_name();
                let local = local.as_ref();

                if matches!(local, b"rss" | b"feed" | b"RDF" | b"channel") {
                    saw_feed_root = true;
                }

                if matches!(local, b"item" | b"entry") && current.is_none() {
                    current = Some((EntryBuilder::default(), depth));
                } else if let Some((builder, entry_depth)) = current.as_mut() {
                    if capture.is_none() && depth == *entry_depth + 1 {
                        if local == b"link" {
                            builder.take_link_attributes(&e, reader.decoder());
                        }
                        if let Some(field) = entry_field(local, e.name().as_ref()) {
                            capture = Some((field, depth, String::new()));
                        }
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some((builder, entry_depth)) = current.as_mut() {
                    if depth == *entry_depth && e.local_name().as_ref() == b"link" {
                        builder.take_link_attributes(&e, reader.decoder());
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if let Some((_, _, text)) = capture.as_mut() {
                    push_text(text, &decode_text(reader.decoder(), &e, true));
                }
            }
            Ok(Event::CData(e)) => {
                if let Some((_, _, text)) = capture.as_mut() {
                    push_text(text, &decode_text(reader.decoder(), &e, false));
                }
            }
            Ok(Event::End(e)) => {
                if let Some((field, capture_depth, _)) = capture.as_ref() {
                    if *capture_depth == depth {
                        let field = *field;
                        if let (Some((_, _, text)), Some((builder, _))) =
                            (capture.take(), current.as_mut())
                        {
                            builder.set(field, text);
                        }
                    }
                }

                let closes_entry = matches!(e.local_name().as_ref(), b"item" | b"entry")
                    && current.as_ref().is_some_and(|(_, d)| *d == depth);
                if closes_entry {
                    if let Some((builder, _)) = current.take() {
                        entries.push(builder.build());
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(FeedError::Parse(format!("XML parse error: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    if !saw_feed_root {
        return Err(FeedError::Parse("document is not an RSS or Atom feed".to_string()));
    }

    Ok(entries)
}

fn decode_text(decoder: Decoder, raw: &[u8], escaped: bool) -> String {
    let decoded = match decoder.decode(raw) {
        Ok(text) => text,
        Err(_) => String::from_utf8_lossy(raw),
    };
    if !escaped {
        return decoded.into_owned();
    }
    match unescape(&decoded) {
        Ok(text) => text.into_owned(),
        Err(_) => decoded.into_owned(),
    }
}

fn push_text(buffer: &mut String, chunk: &str) {
    if !buffer.is_empty() && !chunk.is_empty() {
        buffer.push(' ');
    }
    buffer.push_str(chunk);
}

/// Best-effort publication date; `None` when nothing recognisable is found.
pub fn parse_publication_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.date_naive());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%SZ", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.date());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }

    let caps = LOOSE_DATE.captures(raw)?;
    let year = caps[1].parse().ok()?;
    let month = caps[2].parse().ok()?;
    let day = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}
