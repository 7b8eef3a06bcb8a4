//! Recurring phrases across the day's entries, shown as "hot phrases".

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Phrases mentioning these are the sniffer's own topic and not news
pub const EXCLUDED_KEYWORDS: &[&str] = &[
    "carbonate",
    "limestone",
    "dolomite",
    "microbial",
    "hydrogen",
    "oxidation",
    "ocean",
    "碳酸盐",
    "灰岩",
    "白云岩",
    "微生物",
    "氢",
    "氧化",
    "海洋",
    "矿化",
];

const STOP_PREFIXES: &[&str] = &["in the", "of the", "and the", "for the", "this is", "there are"];

#[allow(clippy::expect_used)]
static PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s\x{4e00}-\x{9fff}-]").expect("valid regex"));

#[allow(clippy::expect_used)]
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

#[allow(clippy::expect_used)]
static ENGLISH_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z][\w-]*(?:\s+[A-Za-z][\w-]*){1,3}\b").expect("valid regex")
});

#[allow(clippy::expect_used)]
static CJK_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x{4e00}-\x{9fff}]{2,8}").expect("valid regex"));

/// Candidate phrases in `text`, lowercased for English.
pub fn extract_phrases(text: &str) -> Vec<String> {
    let cleaned = PUNCTUATION.replace_all(text, " ");
    let cleaned = WHITESPACE.replace_all(&cleaned, " ");
    let cleaned = cleaned.trim();

    let mut phrases = Vec::new();

    for m in ENGLISH_PHRASE.find_iter(cleaned) {
        let phrase = m.as_str().trim().to_lowercase();
        let words: Vec<&str> = phrase.split_whitespace().collect();
        let chars = phrase.chars().count();

        if !(2..=4).contains(&words.len()) || !(6..=40).contains(&chars) {
            continue;
        }
        if words.iter().all(|w| w.chars().all(|c| c.is_ascii_digit())) {
            continue;
        }
        if words.iter().all(|w| w.chars().count() <= 2) {
            continue;
        }
        if STOP_PREFIXES.iter().any(|stop| phrase.starts_with(stop)) {
            continue;
        }
        if is_excluded(&phrase) {
            continue;
        }
        phrases.push(phrase);
    }

    for m in CJK_RUN.find_iter(cleaned) {
        if !is_excluded(m.as_str()) {
            phrases.push(m.as_str().to_string());
        }
    }

    phrases
}

fn is_excluded(phrase: &str) -> bool {
    EXCLUDED_KEYWORDS.iter().any(|ex| phrase.contains(ex))
}

/// The `n` most frequent phrases of at least 4 characters. Ties keep the
/// order in which phrases were first seen.
pub fn top_phrases(phrases: &[String], n: usize) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();

    for phrase in phrases {
        let phrase = phrase.trim();
        if phrase.chars().count() < 4 {
            continue;
        }
        let count = counts.entry(phrase).or_insert(0);
        if *count == 0 {
            order.push(phrase);
        }
        *count += 1;
    }

    let mut ranked: Vec<(String, usize)> = order
        .into_iter()
        .map(|p| (p.to_string(), counts[p]))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(n);
    ranked
}
