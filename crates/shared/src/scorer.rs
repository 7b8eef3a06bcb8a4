use std::collections::BTreeMap;

/// Weight of each matched core keyword
pub const CORE_KEYWORD_WEIGHT: u32 = 10;
/// Weight of each matched auxiliary keyword
pub const AUX_KEYWORD_WEIGHT: u32 = 1;

const CORE_KEYWORDS: &[&str] = &[
    "碳酸盐岩", "carbonate", "carbonate rock", "limestone", "灰岩", "白云岩", "dolomite",
    "dolomitic", "微生物矿化", "microbialite", "microbial mineralization", "biomineralization",
    "microbial carbonate", "天然氢", "natural hydrogen", "白氢", "white hydrogen",
    "native hydrogen", "geological hydrogen", "大洋氧化", "ocean oxidation", "ocean redox",
    "oceanic oxidation", "marine oxidation", "redox evolution",
];

const AUXILIARY_KEYWORDS: &[&str] = &[
    "反应网络", "reaction network", "reacnetgenerator", "分子动力学", "molecular dynamics",
    "MD simulation", "机器学习", "machine learning", "AI", "artificial intelligence",
    "生成式AI", "generative AI", "数据挖掘", "data mining", "深度学习", "deep learning",
    "神经网络", "neural network", "地球化学", "geochemistry", "矿化", "mineralization", "沉积",
    "sedimentary", "古环境", "paleoenvironment", "成岩", "diagenesis", "黄铁矿", "pyrite",
    "氧化", "oxidation", "氧", "oxygen", "海洋", "marine", "deep sea", "simulation",
    "modeling", "computational", "numerical", "fold", "folding", "构造", "structure",
    "tectonics", "地层", "stratigraphy", "deformation",
];

const TIER_WEIGHTS: &[(&str, u32)] = &[("1区", 50), ("2区", 30), ("3区", 20), ("4区", 10)];

const DEFAULT_TIER_WEIGHT: u32 = 15;

/// Keyword lists and tier table used for ranking.
///
/// Keywords are stored lowercased; matching is case-insensitive substring
/// search, each configured keyword counted at most once.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    core_keywords: Vec<String>,
    auxiliary_keywords: Vec<String>,
    tier_weights: BTreeMap<String, u32>,
    default_tier_weight: u32,
}

impl ScoringConfig {
    pub fn new<C, A, T>(core: C, auxiliary: A, tiers: T, default_tier_weight: u32) -> Self
    where
        C: IntoIterator,
        C::Item: AsRef<str>,
        A: IntoIterator,
        A::Item: AsRef<str>,
        T: IntoIterator<Item = (String, u32)>,
    {
        Self {
            core_keywords: core.into_iter().map(|k| k.as_ref().to_lowercase()).collect(),
            auxiliary_keywords: auxiliary
                .into_iter()
                .map(|k| k.as_ref().to_lowercase())
                .collect(),
            tier_weights: tiers.into_iter().collect(),
            default_tier_weight,
        }
    }

    pub fn core_keywords(&self) -> &[String] {
        &self.core_keywords
    }

    pub fn auxiliary_keywords(&self) -> &[String] {
        &self.auxiliary_keywords
    }

    /// Weight for a tier label; unknown and empty labels get the default
    pub fn tier_weight(&self, tier: &str) -> u32 {
        self.tier_weights
            .get(tier.trim())
            .copied()
            .unwrap_or(self.default_tier_weight)
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self::new(
            CORE_KEYWORDS.iter(),
            AUXILIARY_KEYWORDS.iter(),
            TIER_WEIGHTS.iter().map(|(t, w)| (t.to_string(), *w)),
            DEFAULT_TIER_WEIGHT,
        )
    }
}

/// Priority score and the parts it was built from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Score {
    pub total: u32,
    pub core_hits: u32,
    pub aux_hits: u32,
    pub tier_weight: u32,
}

pub struct Scorer {
    config: ScoringConfig,
}

impl Scorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Admission gate: at least one core keyword must appear.
    pub fn admits(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.config
            .core_keywords
            .iter()
            .any(|k| text.contains(k.as_str()))
    }

    pub fn score(&self, text: &str, tier: &str) -> Score {
        let text = text.to_lowercase();
        let core_hits = count_hits(&self.config.core_keywords, &text);
        let aux_hits = count_hits(&self.config.auxiliary_keywords, &text);
        let tier_weight = self.config.tier_weight(tier);

        Score {
            total: core_hits * CORE_KEYWORD_WEIGHT + aux_hits * AUX_KEYWORD_WEIGHT + tier_weight,
            core_hits,
            aux_hits,
            tier_weight,
        }
    }

    /// Gate then score; `None` for texts without a core keyword
    pub fn evaluate(&self, text: &str, tier: &str) -> Option<Score> {
        if !self.admits(text) {
            return None;
        }
        Some(self.score(text, tier))
    }
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}

fn count_hits(keywords: &[String], lowered: &str) -> u32 {
    keywords.iter().filter(|k| lowered.contains(k.as_str())).count() as u32
}
