use chrono::{NaiveDate, NaiveDateTime};

use crate::models::Article;
use crate::status::StatusSummary;

const HEADER: &str = "【🏔️ 折叠地层推送】";
const TOP_PHRASES: &str = "🔥 今日热点短语TOP5：";
const NO_PHRASES: &str = "🔥 今日热点短语：\n🚫 暂无明显热点短语";

/// Figures shown under the article list
#[derive(Debug, Clone)]
pub struct DigestStats<'a> {
    pub today: NaiveDate,
    pub pushed_at: NaiveDateTime,
    pub batch_size: usize,
    /// New matches found by this run's polling
    pub new_matches: usize,
    pub feeds: &'a StatusSummary,
    pub hot_phrases: &'a [(String, usize)],
    /// Total phrases extracted across all entries
    pub phrase_count: usize,
}

pub struct DigestGenerator;

impl DigestGenerator {
    pub fn format_article(article: &Article, index: usize) -> String {
        let mut block = format!("📄 {}. {}", index, article.translated_title);
        if article.is_translated() {
            block.push_str(&format!("\n🔤 原标题: {}", article.title));
        }

        let tier = if article.tier.is_empty() {
            String::new()
        } else {
            format!(" [{}]", article.tier)
        };
        block.push_str(&format!(
            "\n🏛️ 来源: {}{}\n📅 日期: {}\n🔗 链接: {}",
            article.source,
            tier,
            article.published_label(),
            article.link
        ));
        block
    }

    fn format_articles(articles: &[Article]) -> String {
        articles
            .iter()
            .enumerate()
            .map(|(i, a)| Self::format_article(a, i + 1))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn format_phrases(phrases: &[(String, usize)]) -> String {
        if phrases.is_empty() {
            return NO_PHRASES.to_string();
        }

        let mut section = TOP_PHRASES.to_string();
        for (i, (phrase, count)) in phrases.iter().enumerate() {
            section.push_str(&format!("\n🏆 {}. {}: {}次", i + 1, phrase, count));
        }
        section
    }

    fn push_time(at: NaiveDateTime) -> String {
        format!("⏰ 推送时间: {}", at.format("%H:%M:%S"))
    }

    /// First message of the run; `has_secondary` selects `(1/2)` over `(1/1)`.
    pub fn primary_message(articles: &[Article], has_secondary: bool, stats: &DigestStats) -> String {
        let parts = if has_secondary { 2 } else { 1 };
        let feeds = stats.feeds;

        format!(
            "{}{} (1/{})\n\n{}\n\n📊 推送统计:\n🎯 第一批次: {}/{} 篇\n🔍 今日发现: {} 篇新文章\n🌐 RSS成功率: {:.1}% ({}/{})\n\n{}\n\n{}",
            HEADER,
            stats.today,
            parts,
            Self::format_articles(articles),
            articles.len(),
            stats.batch_size,
            stats.new_matches,
            feeds.success_rate,
            feeds.success,
            feeds.total,
            Self::format_phrases(stats.hot_phrases),
            Self::push_time(stats.pushed_at)
        )
    }

    pub fn secondary_message(articles: &[Article], queue_remaining: usize, stats: &DigestStats) -> String {
        format!(
            "{}{} (2/2)\n\n{}\n\n📊 推送统计:\n🎯 第二批次: {}/{} 篇\n📋 队列剩余: {} 篇\n🔍 总计发现: {} 篇新文章\n\n{}",
            HEADER,
            stats.today,
            Self::format_articles(articles),
            articles.len(),
            stats.batch_size,
            queue_remaining,
            stats.new_matches,
            Self::push_time(stats.pushed_at)
        )
    }

    /// Sent when neither today's queue nor the backlog had anything to deliver
    pub fn empty_message(stats: &DigestStats) -> String {
        let feeds = stats.feeds;
        format!(
            "{}{}\n\n📝 今日无新的核心关键词匹配文章\n🔍 已检索 {} 个RSS源\n✅ 成功获取 {} 个源\n❌ 失败 {} 个源 (成功率: {:.1}%)\n💭 全域短语提取: {} 个\n\n{}\n\n{}",
            HEADER,
            stats.today,
            feeds.total,
            feeds.success,
            feeds.failed,
            feeds.success_rate,
            stats.phrase_count,
            Self::format_phrases(stats.hot_phrases),
            Self::push_time(stats.pushed_at)
        )
    }

    pub fn error_message(error: &anyhow::Error, at: NaiveDateTime) -> String {
        format!(
            "【🚨 折叠地层推送系统错误】\n❌ 系统运行出错: {:#}\n⏰ 错误时间: {}\n🔧 请检查系统状态",
            error,
            at.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeedEntry, FeedSource};
    use crate::scorer::Score;
    use std::collections::BTreeMap;

    fn article(title: &str, translated: Option<&str>, tier: &str) -> Article {
        let entry = FeedEntry {
            title: title.to_string(),
            link: format!("https://example.org/{}", title.len()),
            ..Default::default()
        };
        let source = FeedSource::new("https://example.org/rss", "Geology", tier);
        let score = Score {
            total: 60,
            core_hits: 1,
            aux_hits: 0,
            tier_weight: 50,
        };
        Article::new(
            &entry,
            &source,
            score,
            translated.map(str::to_string),
            NaiveDate::from_ymd_opt(2025, 3, 1),
        )
    }

    fn summary() -> StatusSummary {
        StatusSummary {
            total: 10,
            success: 8,
            failed: 2,
            success_rate: 80.0,
            tier_stats: BTreeMap::new(),
        }
    }

    fn stats<'a>(feeds: &'a StatusSummary, phrases: &'a [(String, usize)]) -> DigestStats<'a> {
        DigestStats {
            today: NaiveDate::from_ymd_opt(2025, 3, 2).unwrap(),
            pushed_at: NaiveDate::from_ymd_opt(2025, 3, 2)
                .unwrap()
                .and_hms_opt(8, 30, 0)
                .unwrap(),
            batch_size: 6,
            new_matches: 3,
            feeds,
            hot_phrases: phrases,
            phrase_count: 12,
        }
    }

    #[test]
    fn test_format_translated_article() {
        let block = DigestGenerator::format_article(
            &article("Dolomite at depth", Some("深部白云岩"), "1区"),
            1,
        );
        assert_eq!(
            block,
            "📄 1. 深部白云岩\n🔤 原标题: Dolomite at depth\n🏛️ 来源: Geology [1区]\n📅 日期: 2025-03-01\n🔗 链接: https://example.org/17"
        );
    }

    #[test]
    fn test_format_untranslated_unranked_article() {
        let block = DigestGenerator::format_article(&article("Dolomite", None, ""), 2);
        assert!(block.starts_with("📄 2. Dolomite\n🏛️ 来源: Geology\n"));
        assert!(!block.contains("原标题"));
    }

    #[test]
    fn test_primary_message_header_and_stats() {
        let feeds = summary();
        let phrases = vec![("deep time".to_string(), 3)];
        let articles = vec![article("Dolomite", None, "1区")];

        let single = DigestGenerator::primary_message(&articles, false, &stats(&feeds, &phrases));
        assert!(single.starts_with("【🏔️ 折叠地层推送】2025-03-02 (1/1)\n\n📄 1. Dolomite"));
        assert!(single.contains("🎯 第一批次: 1/6 篇"));
        assert!(single.contains("🌐 RSS成功率: 80.0% (8/10)"));
        assert!(single.contains("🏆 1. deep time: 3次"));
        assert!(single.ends_with("⏰ 推送时间: 08:30:00"));

        let split = DigestGenerator::primary_message(&articles, true, &stats(&feeds, &phrases));
        assert!(split.contains("(1/2)"));
    }

    #[test]
    fn test_secondary_message() {
        let feeds = summary();
        let articles = vec![article("Stromatolite", None, "2区")];
        let text = DigestGenerator::secondary_message(&articles, 4, &stats(&feeds, &[]));
        assert!(text.starts_with("【🏔️ 折叠地层推送】2025-03-02 (2/2)"));
        assert!(text.contains("📋 队列剩余: 4 篇"));
        assert!(text.contains("🔍 总计发现: 3 篇新文章"));
    }

    #[test]
    fn test_empty_message_without_phrases() {
        let feeds = summary();
        let text = DigestGenerator::empty_message(&stats(&feeds, &[]));
        assert!(text.contains("📝 今日无新的核心关键词匹配文章"));
        assert!(text.contains("❌ 失败 2 个源 (成功率: 80.0%)"));
        assert!(text.contains("💭 全域短语提取: 12 个"));
        assert!(text.contains("🚫 暂无明显热点短语"));
    }

    #[test]
    fn test_error_message() {
        let at = NaiveDate::from_ymd_opt(2025, 3, 2)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let err = anyhow::anyhow!("disk full").context("Failed to write push queue");
        let text = DigestGenerator::error_message(&err, at);
        assert!(text.contains("Failed to write push queue: disk full"));
        assert!(text.contains("⏰ 错误时间: 2025-03-02 09:00:00"));
    }
}
