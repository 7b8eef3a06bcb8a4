use anyhow::Result;
use std::path::Path;
use tracing::warn;

use crate::csv::CsvTable;
use crate::models::FeedSource;

pub const JOURNAL_LIST_FILE: &str = "journals_1-260.csv";
pub const FEED_LIST_FILE: &str = "journals_with_rss.csv";

/// Columns of the discovered feed list
pub const FEED_LIST_COLUMNS: &[&str] = &["index", "title", "issn", "zone", "rss_url", "rss_source"];

/// A journal to discover feeds for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Journal {
    pub index: String,
    pub title: String,
    pub issn: String,
    pub tier: String,
}

/// Read the discovered feed list; rows without a feed URL are skipped.
/// A missing file gives an empty list.
pub fn load_feed_sources(path: &Path) -> Result<Vec<FeedSource>> {
    if !path.exists() {
        warn!(path = %path.display(), "feed list not found");
        return Ok(Vec::new());
    }

    let table = CsvTable::read(path)?;
    let feeds = table
        .rows()
        .filter(|row| !row.get("rss_url").is_empty())
        .map(|row| {
            FeedSource::new(row.get("rss_url"), row.get("title"), row.get("zone"))
                .with_origin(row.get("rss_source"))
                .with_issn(row.get("issn"))
        })
        .collect();

    Ok(feeds)
}

/// Read the journal list (`index,title,issn,zone`).
pub fn load_journals(path: &Path) -> Result<Vec<Journal>> {
    let table = CsvTable::read(path)?;
    let journals = table
        .rows()
        .enumerate()
        .map(|(i, row)| {
            let index = match row.get("index") {
                "" => (i + 1).to_string(),
                index => index.to_string(),
            };
            Journal {
                index,
                title: row.get("title").to_string(),
                issn: row.get("issn").to_string(),
                tier: row.get("zone").to_string(),
            }
        })
        .collect();

    Ok(journals)
}

/// Earth-science news feeds polled alongside the journals
pub fn additional_feeds() -> Vec<FeedSource> {
    [
        ("https://eos.org/feed", "Eos"),
        (
            "https://www.sciencedaily.com/rss/earth_climate/geology.xml",
            "Science Daily Geology",
        ),
        ("https://news.agu.org/feed/", "AGU News"),
        ("https://phys.org/rss-feed/earth-news/", "Phys.org Earth News"),
        ("https://export.arxiv.org/rss/physics.geo-ph", "arXiv Geophysics"),
        ("http://news.sciencenet.cn/rss/Earth.xml", "科学网地球科学"),
    ]
    .into_iter()
    .map(|(url, title)| FeedSource::new(url, title, "").with_origin("additional"))
    .collect()
}
