use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::fingerprint::fingerprint;
use crate::scorer::Score;

/// Label shown for articles whose feed carried no usable date.
pub const UNKNOWN_DATE: &str = "unknown";

/// A feed to poll, with the journal it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    pub url: String,
    pub title: String,
    /// Journal tier label such as `1区`, empty when unranked
    #[serde(default)]
    pub tier: String,
    /// How the feed was found (`publisher_specific`, `official`, `search`, `additional`)
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub issn: String,
}

impl FeedSource {
    pub fn new(url: impl Into<String>, title: impl Into<String>, tier: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            tier: tier.into(),
            origin: String::new(),
            issn: String::new(),
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn with_issn(mut self, issn: impl Into<String>) -> Self {
        self.issn = issn.into();
        self
    }
}

/// One item parsed out of an RSS or Atom document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub summary: String,
    pub raw_date: Option<String>,
}

impl FeedEntry {
    /// Text the keyword matching runs over
    pub fn match_text(&self) -> String {
        format!("{} {}", self.title, self.summary)
    }
}

/// A scored candidate notification, persisted inside the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub translated_title: String,
    pub link: String,
    pub fingerprint: String,
    #[serde(default)]
    pub published: Option<NaiveDate>,
    pub source: String,
    #[serde(default)]
    pub tier: String,
    pub score: u32,
    pub core_hits: u32,
    pub aux_hits: u32,
    pub tier_weight: u32,
}

impl Article {
    pub fn new(
        entry: &FeedEntry,
        source: &FeedSource,
        score: Score,
        translated_title: Option<String>,
        published: Option<NaiveDate>,
    ) -> Self {
        Self {
            title: entry.title.clone(),
            translated_title: translated_title.unwrap_or_else(|| entry.title.clone()),
            link: entry.link.clone(),
            fingerprint: fingerprint(&entry.title, &entry.link),
            published,
            source: source.title.clone(),
            tier: source.tier.clone(),
            score: score.total,
            core_hits: score.core_hits,
            aux_hits: score.aux_hits,
            tier_weight: score.tier_weight,
        }
    }

    pub fn is_translated(&self) -> bool {
        self.translated_title != self.title
    }

    pub fn published_label(&self) -> String {
        self.published
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| UNKNOWN_DATE.to_string())
    }
}
